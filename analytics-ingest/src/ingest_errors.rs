//! Audit trail for events that were dropped or failed.

use std::fmt::Display;

use serde::Serialize;
use tracing::warn;

use crate::envelope::Envelope;
use crate::projector::Projector;
use crate::store::rows::IngestErrorRow;

#[derive(Clone)]
pub struct IngestErrorSink {
    projector: Projector,
}

impl IngestErrorSink {
    pub fn new(projector: Projector) -> Self {
        Self { projector }
    }

    /// Writes one audit row. Never fails: a broken sink is logged and ignored
    /// so it cannot turn a drop into a redelivery loop.
    pub async fn record<E: Envelope + ?Sized>(
        &self,
        event: &E,
        stream_id: &str,
        reason: &str,
        cause: Option<&dyn Display>,
    ) {
        let row = build_row(event, event.data(), stream_id, reason, cause);
        if let Err(err) = self.projector.write(row).await {
            warn!(
                event_id = event.event_id(),
                event_type = event.event_type(),
                reason,
                error = %err,
                "Failed to write ingest error"
            );
        }
    }
}

pub(crate) fn build_row<E, P>(
    event: &E,
    payload: &P,
    stream_id: &str,
    reason: &str,
    cause: Option<&dyn Display>,
) -> IngestErrorRow
where
    E: Envelope + ?Sized,
    P: Serialize + ?Sized,
{
    let mut reason = reason.to_string();
    let payload_json = match serde_json::to_string(payload) {
        Ok(json) => json,
        Err(err) => {
            reason.push_str(&format!(" (payload_marshal_error: {err})"));
            String::from("{}")
        }
    };

    let error = match cause {
        Some(cause) => format!("{reason}: {cause}"),
        None => reason,
    };

    IngestErrorRow {
        received_at: event.timestamp(),
        event_id: event.event_id().to_string(),
        event_type: event.event_type().to_string(),
        source: event.source().to_string(),
        tenant_id: event.tenant_id().to_string(),
        stream_id: stream_id.to_string(),
        error,
        payload_json,
    }
}

#[cfg(test)]
mod tests {
    use serde::Serializer;
    use serde_json::{json, Map};
    use time::macros::datetime;

    use super::*;
    use crate::envelope::AnalyticsEvent;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("cannot encode function value"))
        }
    }

    fn event() -> AnalyticsEvent {
        let mut data = Map::new();
        data.insert("nodeId".to_string(), json!("edge-1"));
        AnalyticsEvent {
            event_id: "6d3c1c52-7f55-4f0d-9d35-0c5f7f1f1a01".to_string(),
            event_type: "viewer_connect".to_string(),
            timestamp: datetime!(2024-01-01 00:00 UTC),
            tenant_id: "not-a-tenant".to_string(),
            source: "decklog".to_string(),
            user_id: None,
            internal_name: None,
            data,
        }
    }

    #[test]
    fn keeps_payload_and_joins_cause() {
        let event = event();
        let cause = "boom";
        let row = build_row(&event, event.data(), "s-1", "handler_error", Some(&cause));

        assert_eq!(row.error, "handler_error: boom");
        assert_eq!(row.payload_json, r#"{"nodeId":"edge-1"}"#);
        assert_eq!(row.stream_id, "s-1");
        assert_eq!(row.tenant_id, "not-a-tenant");
        assert_eq!(row.received_at, datetime!(2024-01-01 00:00 UTC));
    }

    #[test]
    fn marshal_failure_uses_placeholder() {
        let event = event();
        let row = build_row(&event, &Unserializable, "", "handler_error", None);

        assert_eq!(row.payload_json, "{}");
        assert!(row.error.starts_with("handler_error (payload_marshal_error:"));
        assert!(row.error.contains("cannot encode function value"));
    }
}
