//! Kafka plumbing: one consumer over the analytics and service topics, with
//! failed messages forwarded to a dead-letter topic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Header, Headers, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{ClientConfig, Message};
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, error, warn};

use crate::config::KafkaConfig;
use crate::envelope::{AnalyticsEvent, ServiceEvent};
use crate::handler::{Disposition, IngestHandler};
use crate::health::{ComponentStatus, HealthHandle};
use crate::metrics::IngestMetrics;

const POLL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("failed to encode DLQ record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to produce to {topic}: {source}")]
    Dlq {
        topic: String,
        #[source]
        source: KafkaError,
    },
    #[error("DLQ produce to {0} was canceled")]
    DlqCanceled(String),
}

/// Which envelope a topic carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Analytics,
    Service,
}

impl Source {
    pub fn consumer_name(self) -> &'static str {
        match self {
            Self::Analytics => "periscope-ingest-analytics",
            Self::Service => "periscope-ingest-service",
        }
    }
}

/// Why a message could not be committed as-is.
#[derive(Debug)]
struct Failure {
    error_type: &'static str,
    error: String,
}

/// What lands on the dead-letter topic.
#[derive(Debug, Serialize)]
pub struct DlqRecord<'a> {
    pub consumer: &'a str,
    pub original_topic: &'a str,
    pub partition: i32,
    pub offset: i64,
    pub error: &'a str,
    pub error_type: &'a str,
    #[serde(with = "time::serde::rfc3339")]
    pub failed_at: OffsetDateTime,
    pub payload_base64: String,
}

pub struct IngestConsumer {
    consumer: StreamConsumer,
    producer: FutureProducer,
    handler: Arc<IngestHandler>,
    metrics: IngestMetrics,
    liveness: HealthHandle,
    analytics_topic: String,
    service_topic: String,
    dlq_topic: String,
}

impl IngestConsumer {
    pub fn new(
        config: &KafkaConfig,
        handler: Arc<IngestHandler>,
        metrics: IngestMetrics,
        liveness: HealthHandle,
    ) -> Result<Self, KafkaError> {
        let mut consumer_config = client_config(config);
        consumer_config
            .set("group.id", &config.kafka_consumer_group)
            .set("auto.offset.reset", &config.kafka_consumer_offset_reset)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false");

        let consumer: StreamConsumer = consumer_config.create()?;
        consumer.subscribe(&[
            config.kafka_analytics_topic.as_str(),
            config.kafka_service_topic.as_str(),
        ])?;

        let mut producer_config = client_config(config);
        producer_config
            .set("linger.ms", config.kafka_producer_linger_ms.to_string())
            .set(
                "message.timeout.ms",
                config.kafka_message_timeout_ms.to_string(),
            );
        let producer: FutureProducer = producer_config.create()?;

        Ok(Self {
            consumer,
            producer,
            handler,
            metrics,
            liveness,
            analytics_topic: config.kafka_analytics_topic.clone(),
            service_topic: config.kafka_service_topic.clone(),
            dlq_topic: config.kafka_dlq_topic.clone(),
        })
    }

    /// Consumes until a message can neither be handled nor dead-lettered.
    /// Returning then leaves its offset unstored, so a restart redelivers it.
    pub async fn run(self) -> Result<(), ConsumerError> {
        self.liveness.report_healthy().await;
        loop {
            let message = match tokio::time::timeout(POLL_TIMEOUT, self.consumer.recv()).await {
                Err(_) => {
                    self.liveness.report_healthy().await;
                    continue;
                }
                Ok(Err(err)) => {
                    error!(error = %err, "Kafka receive failed");
                    continue;
                }
                Ok(Ok(message)) => message,
            };

            if let Err(err) = self.process(&message).await {
                self.liveness.report_status(ComponentStatus::Unhealthy).await;
                return Err(err);
            }
            self.liveness.report_healthy().await;
        }
    }

    async fn process(&self, message: &BorrowedMessage<'_>) -> Result<(), ConsumerError> {
        let topic = message.topic();
        let source = if topic == self.analytics_topic {
            Source::Analytics
        } else if topic == self.service_topic {
            Source::Service
        } else {
            warn!(topic, "Message from unexpected topic, skipping");
            self.consumer.store_offset_from_message(message)?;
            return Ok(());
        };

        let payload = message.payload().unwrap_or_default();
        let headers = header_map(message);

        match self.dispatch(source, topic, payload, &headers).await {
            Ok(disposition) => {
                debug!(
                    topic,
                    partition = message.partition(),
                    offset = message.offset(),
                    ?disposition,
                    "Handled message"
                );
            }
            Err(failure) => {
                self.send_to_dlq(message, source, &headers, &failure).await?;
                self.metrics.dlq(topic, failure.error_type);
                warn!(
                    topic,
                    partition = message.partition(),
                    offset = message.offset(),
                    dlq_topic = %self.dlq_topic,
                    error = %failure.error,
                    "Message sent to DLQ after handler error"
                );
            }
        }

        self.consumer.store_offset_from_message(message)?;
        Ok(())
    }

    async fn dispatch(
        &self,
        source: Source,
        topic: &str,
        payload: &[u8],
        headers: &HashMap<String, String>,
    ) -> Result<Disposition, Failure> {
        let handled = match source {
            Source::Analytics => {
                let event: AnalyticsEvent = self.decode(topic, payload)?;
                self.handler.handle_analytics_event(&event).await
            }
            Source::Service => {
                let mut event: ServiceEvent = self.decode(topic, payload)?;
                fill_service_routing(&mut event, headers);
                self.handler.handle_service_event(&event).await
            }
        };
        handled.map_err(|err| Failure {
            error_type: err.kind(),
            error: err.to_string(),
        })
    }

    fn decode<T: serde::de::DeserializeOwned>(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> Result<T, Failure> {
        serde_json::from_slice(payload).map_err(|err| {
            self.metrics.kafka_message(topic, "decode_error");
            error!(topic, error = %err, "Failed to decode message");
            Failure {
                error_type: "decode",
                error: err.to_string(),
            }
        })
    }

    async fn send_to_dlq(
        &self,
        message: &BorrowedMessage<'_>,
        source: Source,
        headers: &HashMap<String, String>,
        failure: &Failure,
    ) -> Result<(), ConsumerError> {
        let record = DlqRecord {
            consumer: source.consumer_name(),
            original_topic: message.topic(),
            partition: message.partition(),
            offset: message.offset(),
            error: &failure.error,
            error_type: failure.error_type,
            failed_at: OffsetDateTime::now_utc(),
            payload_base64: STANDARD.encode(message.payload().unwrap_or_default()),
        };
        let payload = serde_json::to_string(&record)?;
        let key = dlq_key(
            message.key(),
            message.topic(),
            message.partition(),
            message.offset(),
        );

        let future = self
            .producer
            .send_result(FutureRecord {
                topic: &self.dlq_topic,
                partition: None,
                payload: Some(payload.as_str()),
                key: Some(key.as_slice()),
                timestamp: None,
                headers: Some(dlq_headers(source, message.topic(), headers)),
            })
            .map_err(|(err, _)| ConsumerError::Dlq {
                topic: self.dlq_topic.clone(),
                source: err,
            })?;

        match future.await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err((err, _))) => {
                error!(
                    topic = message.topic(),
                    partition = message.partition(),
                    offset = message.offset(),
                    error = %err,
                    "Failed to publish message to DLQ"
                );
                Err(ConsumerError::Dlq {
                    topic: self.dlq_topic.clone(),
                    source: err,
                })
            }
            Err(_) => Err(ConsumerError::DlqCanceled(self.dlq_topic.clone())),
        }
    }
}

fn client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.kafka_hosts)
        .set("statistics.interval.ms", "10000");

    if config.kafka_tls {
        client_config
            .set("security.protocol", "ssl")
            .set("enable.ssl.certificate.verification", "false");
    };
    client_config
}

fn header_map(message: &BorrowedMessage<'_>) -> HashMap<String, String> {
    let Some(headers) = message.headers() else {
        return HashMap::new();
    };
    headers
        .iter()
        .filter_map(|header| {
            let value = std::str::from_utf8(header.value?).ok()?;
            Some((header.key.to_string(), value.to_string()))
        })
        .collect()
}

/// Producers may put routing fields in headers only; the body wins when set.
pub fn fill_service_routing(event: &mut ServiceEvent, headers: &HashMap<String, String>) {
    let fields = [
        ("source", &mut event.source),
        ("tenant_id", &mut event.tenant_id),
        ("event_type", &mut event.event_type),
    ];
    for (key, field) in fields {
        if field.is_empty() {
            if let Some(value) = headers.get(key) {
                field.clone_from(value);
            }
        }
    }
}

pub fn dlq_key(key: Option<&[u8]>, topic: &str, partition: i32, offset: i64) -> Vec<u8> {
    match key {
        Some(key) if !key.is_empty() => key.to_vec(),
        _ => format!("{topic}:{partition}:{offset}").into_bytes(),
    }
}

fn dlq_headers(
    source: Source,
    original_topic: &str,
    headers: &HashMap<String, String>,
) -> OwnedHeaders {
    let mut owned = OwnedHeaders::new()
        .insert(Header {
            key: "source",
            value: Some(source.consumer_name()),
        })
        .insert(Header {
            key: "original_topic",
            value: Some(original_topic),
        });
    for key in ["tenant_id", "event_type"] {
        if let Some(value) = headers.get(key) {
            owned = owned.insert(Header {
                key,
                value: Some(value.as_str()),
            });
        }
    }
    owned
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn service_event(value: serde_json::Value) -> ServiceEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn headers_fill_only_empty_routing_fields() {
        let mut event = service_event(json!({
            "event_type": "tenant_updated",
            "timestamp": "2024-01-01T00:00:00Z",
            "data": {}
        }));
        let headers = HashMap::from([
            ("event_type".to_string(), "ignored".to_string()),
            (
                "tenant_id".to_string(),
                "5a1d5c6e-4b8f-4a44-9a2d-1c1b0b7f8e11".to_string(),
            ),
            ("source".to_string(), "commodore".to_string()),
        ]);

        fill_service_routing(&mut event, &headers);

        assert_eq!(event.event_type, "tenant_updated");
        assert_eq!(event.tenant_id, "5a1d5c6e-4b8f-4a44-9a2d-1c1b0b7f8e11");
        assert_eq!(event.source, "commodore");
    }

    #[test]
    fn dlq_key_falls_back_to_coordinates() {
        assert_eq!(
            dlq_key(Some(b"abc".as_slice()), "analytics_events", 2, 17),
            b"abc"
        );
        assert_eq!(
            dlq_key(None, "analytics_events", 2, 17),
            b"analytics_events:2:17"
        );
        assert_eq!(
            dlq_key(Some(b"".as_slice()), "service_events", 0, 5),
            b"service_events:0:5"
        );
    }

    #[test]
    fn dlq_record_carries_payload_as_base64() {
        let record = DlqRecord {
            consumer: Source::Service.consumer_name(),
            original_topic: "service_events",
            partition: 1,
            offset: 42,
            error: "invalid service event: missing aggregates",
            error_type: "invalid_service_event",
            failed_at: OffsetDateTime::UNIX_EPOCH,
            payload_base64: STANDARD.encode(b"{}"),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["consumer"], "periscope-ingest-service");
        assert_eq!(value["payload_base64"], "e30=");
        assert_eq!(value["offset"], 42);
        assert_eq!(value["failed_at"], "1970-01-01T00:00:00Z");
    }
}
