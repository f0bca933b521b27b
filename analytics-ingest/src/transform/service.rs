//! Control-plane events from platform services. Their data maps are plain
//! snake_case JSON, not trigger payloads, so fields are read leniently.

use std::time::Instant;

use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::{error, warn};
use uuid::Uuid;

use crate::envelope::ServiceEvent;
use crate::error::IngestError;
use crate::handler::{Disposition, IngestHandler};
use crate::identity;
use crate::store::rows::{ApiEventRow, TenantAcquisitionRow};
use crate::trigger::ApiRequestAggregate;

use super::api_usage::{aggregate_timestamp, request_row};
use super::{event_data, non_empty};

const MESSAGE_KEYS: [&str; 4] = ["conversation_id", "message_id", "sender", "timestamp"];
const CONVERSATION_KEYS: [&str; 4] = ["conversation_id", "status", "subject", "timestamp"];

impl IngestHandler {
    pub async fn handle_service_event(
        &self,
        event: &ServiceEvent,
    ) -> Result<Disposition, IngestError> {
        let start = Instant::now();
        let event_type = event.event_type.as_str();
        self.metrics.event(event_type, "received");

        // Usage batches carry a tenant per aggregate instead.
        if event_type != "api_request_batch" && !identity::is_valid_identity(&event.tenant_id) {
            self.metrics.event(event_type, "tenant_missing");
            warn!(
                event_type,
                event_id = %event.event_id,
                tenant_id = %event.tenant_id,
                "Dropping service event with missing or invalid tenant_id"
            );
            self.errors
                .record(event, "", "missing_or_invalid_tenant_id_service_event", None)
                .await;
            self.metrics.event(event_type, "dropped");
            return Ok(Disposition::Dropped);
        }

        let result = match event_type {
            "api_request_batch" => self.process_service_api_batch(event).await,
            "tenant_created" => match self.process_tenant_created(event).await {
                Ok(()) => self.audit_service_event(event).await,
                Err(err) => Err(err),
            },
            _ => self.audit_service_event(event).await,
        };

        match result {
            Ok(Disposition::Processed) => {
                self.metrics.event(event_type, "processed");
                self.metrics
                    .processing_duration(&event.source, start.elapsed());
                Ok(Disposition::Processed)
            }
            Ok(other) => Ok(other),
            Err(err) => {
                self.errors
                    .record(event, "", "handler_error", Some(&err))
                    .await;
                error!(
                    event_type,
                    event_id = %event.event_id,
                    error = %err,
                    "Failed to process service event"
                );
                self.metrics.event(event_type, "error");
                Err(err)
            }
        }
    }

    async fn process_service_api_batch(
        &self,
        event: &ServiceEvent,
    ) -> Result<Disposition, IngestError> {
        let source_node = get_str(&event.data, "source_node");
        let batch_ts = get_i64(&event.data, "timestamp").unwrap_or_default();
        let aggregates = match event.data.get("aggregates") {
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(IngestError::InvalidServiceEvent(String::from(
                    "aggregates is not an array",
                )))
            }
            None => {
                return Err(IngestError::InvalidServiceEvent(String::from(
                    "missing aggregates",
                )))
            }
        };

        let valid: Vec<(Uuid, OffsetDateTime, ApiRequestAggregate)> = aggregates
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|raw| {
                let agg = lenient_aggregate(raw);
                let tenant_id = identity::parse_identity(&agg.tenant_id)?;
                let timestamp = aggregate_timestamp(agg.timestamp, batch_ts, event.timestamp);
                Some((tenant_id, timestamp, agg))
            })
            .collect();

        let rows = valid
            .iter()
            .map(|(tenant_id, ts, agg)| request_row(agg, *tenant_id, source_node, *ts))
            .collect();
        let disposition = self.write_api_requests(rows, source_node).await?;

        if disposition == Disposition::Processed {
            let audits: Vec<ApiEventRow> = valid
                .iter()
                .map(|(tenant_id, ts, agg)| ApiEventRow {
                    details: event_data(&usage_details(source_node, agg)),
                    ..api_event(event, *tenant_id, *ts)
                })
                .collect();
            if let Err(err) = self.projector.write(audits).await {
                warn!(
                    event_id = %event.event_id,
                    error = %err,
                    "Failed to write API usage audit rows"
                );
            }
        }

        Ok(disposition)
    }

    /// Signup attribution. Only tenants that arrived through a known channel
    /// get an acquisition row.
    async fn process_tenant_created(&self, event: &ServiceEvent) -> Result<(), IngestError> {
        let Some(attribution) = event.data.get("attribution").and_then(Value::as_object) else {
            return Ok(());
        };
        let signup_channel = get_str(attribution, "signup_channel");
        if signup_channel.is_empty() {
            return Ok(());
        }

        let optional = |key: &str| non_empty(get_str(attribution, key));
        let row = TenantAcquisitionRow {
            timestamp: event.timestamp,
            tenant_id: identity::uuid_or_nil(&event.tenant_id),
            user_id: event.user_id.as_deref().and_then(identity::parse_identity),
            signup_channel: signup_channel.to_string(),
            signup_method: get_str(attribution, "signup_method").to_string(),
            utm_source: optional("utm_source"),
            utm_medium: optional("utm_medium"),
            utm_campaign: optional("utm_campaign"),
            utm_content: optional("utm_content"),
            utm_term: optional("utm_term"),
            http_referer: optional("http_referer"),
            landing_page: optional("landing_page"),
            referral_code: optional("referral_code"),
            is_agent: u8::from(
                attribution
                    .get("is_agent")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            ),
            event_data: serde_json::to_string(&event.data)?,
        };

        self.projector.write(row).await
    }

    async fn audit_service_event(&self, event: &ServiceEvent) -> Result<Disposition, IngestError> {
        let tenant_id = identity::uuid_or_nil(&event.tenant_id);
        let details =
            serde_json::to_string(&sanitize_service_data(&event.event_type, &event.data))?;
        let row = ApiEventRow {
            details,
            ..api_event(event, tenant_id, event.timestamp)
        };
        self.projector.write(row).await?;
        Ok(Disposition::Processed)
    }
}

fn api_event(event: &ServiceEvent, tenant_id: Uuid, timestamp: OffsetDateTime) -> ApiEventRow {
    ApiEventRow {
        tenant_id,
        event_type: event.event_type.clone(),
        source: event.source.clone(),
        user_id: event.user_id.as_deref().and_then(identity::parse_identity),
        resource_type: event.resource_type.as_deref().and_then(non_empty),
        resource_id: event.resource_id.as_deref().and_then(non_empty),
        details: String::from("{}"),
        timestamp,
    }
}

/// Messaging payloads can carry message bodies; only routing keys are kept.
pub(crate) fn sanitize_service_data(event_type: &str, data: &Map<String, Value>) -> Map<String, Value> {
    let keys: &[&str] = match event_type {
        "message_received" | "message_updated" => &MESSAGE_KEYS,
        "conversation_created" | "conversation_updated" => &CONVERSATION_KEYS,
        _ => return data.clone(),
    };
    keys.iter()
        .filter_map(|key| data.get(*key).map(|v| (key.to_string(), v.clone())))
        .collect()
}

fn usage_details(source_node: &str, agg: &ApiRequestAggregate) -> Value {
    serde_json::json!({
        "source_node": source_node,
        "auth_type": agg.auth_type,
        "operation_name": agg.operation_name,
        "operation_type": agg.operation_type,
        "request_count": agg.request_count,
        "error_count": agg.error_count,
        "total_duration_ms": agg.total_duration_ms,
        "total_complexity": agg.total_complexity,
        "user_hashes": agg.user_hashes,
        "token_hashes": agg.token_hashes,
    })
}

/// Reads one snake_case aggregate. Missing or mistyped fields become zero
/// values; the tenant check happens afterwards.
fn lenient_aggregate(raw: &Map<String, Value>) -> ApiRequestAggregate {
    let count = |key: &str| u32::try_from(get_u64(raw, key)).unwrap_or(u32::MAX);
    ApiRequestAggregate {
        tenant_id: get_str(raw, "tenant_id").to_string(),
        auth_type: get_str(raw, "auth_type").to_string(),
        operation_name: get_str(raw, "operation_name").to_string(),
        operation_type: get_str(raw, "operation_type").to_string(),
        request_count: count("request_count"),
        error_count: count("error_count"),
        total_duration_ms: get_u64(raw, "total_duration_ms"),
        total_complexity: count("total_complexity"),
        user_hashes: get_u64_list(raw, "user_hashes"),
        token_hashes: get_u64_list(raw, "token_hashes"),
        timestamp: get_i64(raw, "timestamp").unwrap_or_default(),
    }
}

fn get_str<'a>(data: &'a Map<String, Value>, key: &str) -> &'a str {
    data.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn get_i64(data: &Map<String, Value>, key: &str) -> Option<i64> {
    let value = data.get(key)?;
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}

/// Non-negative integer; negatives and non-numbers read as zero.
fn get_u64(data: &Map<String, Value>, key: &str) -> u64 {
    data.get(key).map_or(0, number_as_u64)
}

fn get_u64_list(data: &Map<String, Value>, key: &str) -> Vec<u64> {
    match data.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter(|v| v.as_f64().is_some_and(|f| f >= 0.0))
            .map(number_as_u64)
            .collect(),
        _ => Vec::new(),
    }
}

fn number_as_u64(value: &Value) -> u64 {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn message_events_are_allowlisted() {
        let data = map(json!({
            "conversation_id": "c-1",
            "message_id": "m-1",
            "body": "secret",
            "sender": "agent"
        }));
        let sanitized = sanitize_service_data("message_received", &data);
        assert_eq!(
            Value::Object(sanitized),
            json!({ "conversation_id": "c-1", "message_id": "m-1", "sender": "agent" })
        );
    }

    #[test]
    fn other_events_pass_through() {
        let data = map(json!({ "plan": "pro", "seats": 3 }));
        assert_eq!(sanitize_service_data("tenant_updated", &data), data);
    }

    #[test]
    fn lenient_aggregate_reads_mixed_numbers() {
        let raw = map(json!({
            "tenant_id": "5a1d5c6e-4b8f-4a44-9a2d-1c1b0b7f8e11",
            "request_count": 12.0,
            "error_count": -1,
            "total_duration_ms": 450,
            "user_hashes": [1, -2, 3.0, "x"],
            "timestamp": 1_704_067_200
        }));
        let agg = lenient_aggregate(&raw);
        assert_eq!(agg.request_count, 12);
        assert_eq!(agg.error_count, 0);
        assert_eq!(agg.total_duration_ms, 450);
        assert_eq!(agg.user_hashes, vec![1, 3]);
        assert!(agg.token_hashes.is_empty());
        assert_eq!(agg.timestamp, 1_704_067_200);
        assert_eq!(agg.operation_name, "");
    }
}
