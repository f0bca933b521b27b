use crate::decode::decode_trigger;
use crate::error::IngestError;
use crate::handler::{Disposition, IngestHandler, Scope};
use crate::identity::{self, normalize_internal_name};
use crate::store::rows::FederationEventRow;

use super::{expect_payload, non_empty_opt, stage_name};

impl IngestHandler {
    /// Cross-cluster peering and replication events. The numeric fields are
    /// measurements where zero is meaningful, so they pass through untouched.
    pub(crate) async fn process_federation_event(
        &self,
        scope: &Scope<'_>,
    ) -> Result<Disposition, IngestError> {
        let mut trigger = decode_trigger(&scope.event.data)?;
        let fed = expect_payload!(trigger, FederationEventData, "federation_event");

        let stream_id = fed
            .stream_id
            .as_deref()
            .and_then(identity::parse_identity)
            .or_else(|| identity::parse_identity(trigger.stream_id()));

        let row = FederationEventRow {
            timestamp: scope.event.timestamp,
            event_id: scope.event_id,
            tenant_id: identity::resolve_tenant(scope.tenant_id, fed.tenant_id.as_deref()),
            event_type: stage_name(fed.event_type.wire_name(), "FEDERATION_EVENT_TYPE_"),
            local_cluster: fed.local_cluster,
            remote_cluster: fed.remote_cluster,
            peer_cluster: non_empty_opt(fed.peer_cluster.as_deref()),
            stream_id,
            internal_name: fed
                .stream_name
                .as_deref()
                .map(normalize_internal_name)
                .and_then(|name| non_empty_opt(Some(name))),
            role: non_empty_opt(fed.role.as_deref()),
            latency_ms: fed.latency_ms,
            time_to_live_ms: fed.time_to_live_ms,
            queried_clusters: fed.queried_clusters,
            responding_clusters: fed.responding_clusters,
            total_candidates: fed.total_candidates,
            best_remote_score: fed.best_remote_score,
            blocked_cluster: non_empty_opt(fed.blocked_cluster.as_deref()),
            existing_replication_cluster: non_empty_opt(
                fed.existing_replication_cluster.as_deref(),
            ),
            local_lat: fed.local_lat,
            local_lon: fed.local_lon,
            remote_lat: fed.remote_lat,
            remote_lon: fed.remote_lon,
        };

        self.projector.write(row).await?;
        Ok(Disposition::Processed)
    }
}
