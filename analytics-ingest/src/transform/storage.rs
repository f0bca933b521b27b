use time::OffsetDateTime;
use tracing::warn;

use crate::decode::decode_trigger;
use crate::error::IngestError;
use crate::handler::{Disposition, IngestHandler, Scope};
use crate::identity::{self, normalize_internal_name};
use crate::store::rows::{StorageEventRow, StorageSnapshotRow};

use super::{expect_payload, non_empty, non_empty_opt, non_zero, stage_name};

const DEFAULT_STORAGE_SCOPE: &str = "hot";

impl IngestHandler {
    /// Cache and sync activity for stored assets. Assets outlive their stream,
    /// so a missing stream id is logged and stored as nil.
    pub(crate) async fn process_storage_lifecycle(
        &self,
        scope: &Scope<'_>,
    ) -> Result<Disposition, IngestError> {
        let mut trigger = decode_trigger(&scope.event.data)?;
        let storage = expect_payload!(trigger, StorageLifecycleData, "storage_lifecycle");

        let stream_id = match identity::parse_identity(trigger.stream_id()) {
            Some(stream_id) => stream_id,
            None => {
                warn!(
                    event_id = %scope.event.event_id,
                    tenant_id = %scope.tenant_id,
                    stream_id = trigger.stream_id(),
                    asset_hash = %storage.asset_hash,
                    "Storage lifecycle event missing or invalid stream_id"
                );
                uuid::Uuid::nil()
            }
        };

        let row = StorageEventRow {
            timestamp: scope.event.timestamp,
            tenant_id: identity::resolve_tenant(scope.tenant_id, storage.tenant_id.as_deref()),
            stream_id,
            internal_name: storage
                .internal_name
                .as_deref()
                .map(normalize_internal_name)
                .unwrap_or_default()
                .to_string(),
            asset_hash: storage.asset_hash,
            action: stage_name(storage.action.wire_name(), "ACTION_"),
            asset_type: storage.asset_type,
            size_bytes: storage.size_bytes,
            s3_url: non_empty_opt(storage.s3_url.as_deref()),
            local_path: non_empty_opt(storage.local_path.as_deref()),
            node_id: trigger.node_id,
            duration_ms: storage.duration_ms.and_then(non_zero),
            warm_duration_ms: storage.warm_duration_ms.and_then(non_zero),
            error: non_empty_opt(storage.error.as_deref()),
        };

        self.projector.write(row).await?;
        Ok(Disposition::Processed)
    }

    /// One row per tenant in the snapshot. Entries with an invalid tenant are
    /// skipped; the envelope tenant is not used here.
    pub(crate) async fn process_storage_snapshot(
        &self,
        scope: &Scope<'_>,
    ) -> Result<Disposition, IngestError> {
        let mut trigger = decode_trigger(&scope.event.data)?;
        let snapshot = expect_payload!(trigger, StorageSnapshot, "storage_snapshot");

        let timestamp = snapshot_timestamp(snapshot.timestamp, scope.event.timestamp);
        let storage_scope =
            non_empty(&snapshot.storage_scope).unwrap_or_else(|| DEFAULT_STORAGE_SCOPE.to_string());

        let mut rows = Vec::with_capacity(snapshot.usage.len());
        for usage in &snapshot.usage {
            let Some(tenant_id) = identity::parse_identity(&usage.tenant_id) else {
                warn!(
                    event_id = %scope.event.event_id,
                    tenant_id = %usage.tenant_id,
                    node_id = %snapshot.node_id,
                    "Skipping storage snapshot row with missing or invalid tenant_id"
                );
                continue;
            };
            rows.push(StorageSnapshotRow {
                timestamp,
                node_id: snapshot.node_id.clone(),
                tenant_id,
                storage_scope: storage_scope.clone(),
                total_bytes: usage.total_bytes,
                file_count: usage.file_count,
                dvr_bytes: usage.dvr_bytes,
                clip_bytes: usage.clip_bytes,
                vod_bytes: usage.vod_bytes,
                frozen_dvr_bytes: usage.frozen_dvr_bytes,
                frozen_clip_bytes: usage.frozen_clip_bytes,
                frozen_vod_bytes: usage.frozen_vod_bytes,
            });
        }

        if rows.is_empty() {
            return Ok(self.skip(scope.event, "no_valid_storage_usage"));
        }

        self.projector.write(rows).await?;
        Ok(Disposition::Processed)
    }
}

/// The snapshot's own time when it reported one.
fn snapshot_timestamp(reported: i64, fallback: OffsetDateTime) -> OffsetDateTime {
    if reported > 0 {
        OffsetDateTime::from_unix_timestamp(reported).unwrap_or(fallback)
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn snapshot_time_falls_back_to_envelope() {
        let envelope = datetime!(2024-01-01 00:00 UTC);
        assert_eq!(snapshot_timestamp(0, envelope), envelope);
        assert_eq!(snapshot_timestamp(-5, envelope), envelope);
        assert_eq!(
            snapshot_timestamp(1_704_153_600, envelope),
            datetime!(2024-01-02 00:00 UTC)
        );
    }
}
