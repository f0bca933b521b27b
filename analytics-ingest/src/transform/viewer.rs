use tracing::warn;

use crate::decode::decode_trigger;
use crate::error::IngestError;
use crate::handler::{Disposition, IngestHandler, Scope};
use crate::identity::normalize_internal_name;
use crate::store::rows::ViewerConnectionRow;
use crate::store::Table;
use crate::trigger::{GeoBucket, TriggerPayload};

use super::{non_empty, UNKNOWN_COUNTRY};

impl IngestHandler {
    pub(crate) async fn process_viewer_connection(
        &self,
        scope: &Scope<'_>,
        is_connect: bool,
    ) -> Result<Disposition, IngestError> {
        let mut trigger = decode_trigger(&scope.event.data)?;
        let Some(stream_id) = self.require_stream_id(scope, &trigger).await else {
            return Ok(Disposition::Dropped);
        };
        if self
            .dedup
            .seen(
                Table::ViewerConnectionEvents,
                scope.event_id,
                &scope.event.event_type,
            )
            .await
        {
            return Ok(Disposition::Duplicate);
        }

        let expected = if is_connect {
            "viewer_connect"
        } else {
            "viewer_disconnect"
        };

        let mut cluster_id = trigger.cluster_id.clone();
        let mut origin_cluster_id = trigger.origin_cluster_id.clone();
        if cluster_id.is_empty() {
            cluster_id.clone_from(&origin_cluster_id);
        }
        if origin_cluster_id.is_empty() {
            origin_cluster_id.clone_from(&cluster_id);
        }

        let mut row = ViewerConnectionRow {
            event_id: scope.event_id,
            timestamp: scope.event.timestamp,
            tenant_id: scope.tenant_id,
            stream_id,
            internal_name: String::new(),
            session_id: String::new(),
            connection_addr: String::new(),
            connector: String::new(),
            node_id: String::new(),
            cluster_id,
            origin_cluster_id,
            request_url: None,
            country_code: UNKNOWN_COUNTRY.to_string(),
            city: String::new(),
            latitude: 0.0,
            longitude: 0.0,
            client_bucket_h3: None,
            client_bucket_res: None,
            node_bucket_h3: None,
            node_bucket_res: None,
            event_type: String::new(),
            session_duration: 0,
            bytes_transferred: 0,
        };

        let actual = match trigger.payload.take() {
            Some(TriggerPayload::ViewerConnect(vc)) => {
                row.internal_name = normalize_internal_name(&vc.stream_name).to_string();
                row.session_id = vc.session_id;
                row.connector = vc.connector;
                row.connection_addr = vc.host;
                row.request_url = non_empty(&vc.request_url);
                row.node_id = trigger.node_id.clone();
                if !vc.client_country.is_empty() {
                    row.country_code = vc.client_country;
                }
                row.city = vc.client_city;
                row.latitude = vc.client_latitude;
                row.longitude = vc.client_longitude;
                (row.client_bucket_h3, row.client_bucket_res) =
                    GeoBucket::cell(vc.client_bucket.as_ref());
                (row.node_bucket_h3, row.node_bucket_res) =
                    GeoBucket::cell(vc.node_bucket.as_ref());
                row.event_type = String::from("connect");
                "viewer_connect"
            }
            Some(TriggerPayload::ViewerDisconnect(vd)) => {
                row.internal_name = normalize_internal_name(&vd.stream_name).to_string();
                row.session_id = vd.session_id;
                row.connector = vd.connector;
                row.connection_addr = vd.host;
                row.node_id = vd.node_id;
                if !vd.country_code.is_empty() {
                    row.country_code = vd.country_code;
                }
                row.city = vd.city;
                row.latitude = vd.latitude;
                row.longitude = vd.longitude;
                (row.client_bucket_h3, row.client_bucket_res) =
                    GeoBucket::cell(vd.client_bucket.as_ref());
                (row.node_bucket_h3, row.node_bucket_res) =
                    GeoBucket::cell(vd.node_bucket.as_ref());
                row.event_type = String::from("disconnect");
                row.session_duration = session_duration(vd.duration, vd.seconds_connected);
                row.bytes_transferred = bytes_transferred(vd.up_bytes, vd.down_bytes);
                "viewer_disconnect"
            }
            other => {
                return Err(IngestError::UnexpectedPayload {
                    expected,
                    found: other.as_ref().map_or("none", TriggerPayload::kind),
                })
            }
        };

        if actual != expected {
            return Err(IngestError::DirectionMismatch { expected, actual });
        }

        let tenant_id = row.tenant_id;
        let internal_name = row.internal_name.clone();
        let session_duration = row.session_duration;
        let bytes = row.bytes_transferred;

        self.projector.write(row).await?;

        let rollup = if is_connect {
            self.rollups.record_connect(tenant_id, &internal_name).await
        } else {
            self.rollups
                .record_disconnect(tenant_id, &internal_name, session_duration, bytes)
                .await
        };
        match rollup {
            Ok(()) => self.metrics.rollup("success"),
            Err(err) => {
                self.metrics.rollup("error");
                warn!(
                    %tenant_id,
                    internal_name = %internal_name,
                    error = %err,
                    "Failed to update viewer rollups"
                );
            }
        }

        Ok(Disposition::Processed)
    }
}

/// Prefers the reported duration; falls back to seconds connected.
fn session_duration(duration: i64, seconds_connected: Option<u64>) -> u32 {
    if duration > 0 {
        u32::try_from(duration).unwrap_or(u32::MAX)
    } else {
        seconds_connected
            .map(|s| u32::try_from(s).unwrap_or(u32::MAX))
            .unwrap_or(0)
    }
}

/// Negative counters from the producer count as zero.
fn bytes_transferred(up_bytes: i64, down_bytes: i64) -> u64 {
    let up = u64::try_from(up_bytes.max(0)).unwrap_or(0);
    let down = u64::try_from(down_bytes.max(0)).unwrap_or(0);
    up.saturating_add(down)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_prefers_reported_value() {
        assert_eq!(session_duration(42, Some(7)), 42);
        assert_eq!(session_duration(0, Some(7)), 7);
        assert_eq!(session_duration(-3, None), 0);
    }

    #[test]
    fn bytes_ignore_negative_counters() {
        assert_eq!(bytes_transferred(100, 50), 150);
        assert_eq!(bytes_transferred(-100, 50), 50);
        assert_eq!(bytes_transferred(-1, -1), 0);
    }
}
