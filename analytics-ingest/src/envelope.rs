//! Inbound envelopes as they arrive on the analytics and service topics.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Telemetry event produced by the edge trigger relay.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalyticsEvent {
    #[serde(default)]
    pub event_id: String,
    pub event_type: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_name: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Control-plane event emitted by platform services (tenants, API usage, messaging).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceEvent {
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub event_type: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// The parts of an envelope the ingest error sink needs.
pub trait Envelope {
    fn event_id(&self) -> &str;
    fn event_type(&self) -> &str;
    fn source(&self) -> &str;
    fn tenant_id(&self) -> &str;
    fn timestamp(&self) -> OffsetDateTime;
    fn data(&self) -> &Map<String, Value>;
}

macro_rules! impl_envelope {
    ($ty:ty) => {
        impl Envelope for $ty {
            fn event_id(&self) -> &str {
                &self.event_id
            }
            fn event_type(&self) -> &str {
                &self.event_type
            }
            fn source(&self) -> &str {
                &self.source
            }
            fn tenant_id(&self) -> &str {
                &self.tenant_id
            }
            fn timestamp(&self) -> OffsetDateTime {
                self.timestamp
            }
            fn data(&self) -> &Map<String, Value> {
                &self.data
            }
        }
    };
}

impl_envelope!(AnalyticsEvent);
impl_envelope!(ServiceEvent);

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_minimal_analytics_event() {
        let event: AnalyticsEvent = serde_json::from_value(json!({
            "event_id": "6d3c1c52-7f55-4f0d-9d35-0c5f7f1f1a01",
            "event_type": "viewer_connect",
            "timestamp": "2024-01-01T00:00:00Z",
            "data": { "nodeId": "edge-1" }
        }))
        .unwrap();

        assert_eq!(event.event_type, "viewer_connect");
        assert_eq!(event.tenant_id, "");
        assert_eq!(event.timestamp.unix_timestamp(), 1_704_067_200);
        assert_eq!(event.data.get("nodeId"), Some(&json!("edge-1")));
    }

    #[test]
    fn service_event_tolerates_missing_routing_fields() {
        let event: ServiceEvent = serde_json::from_value(json!({
            "timestamp": "2024-01-01T00:00:00.250Z",
            "data": {}
        }))
        .unwrap();
        assert!(event.event_type.is_empty());
        assert!(event.resource_type.is_none());
    }
}
