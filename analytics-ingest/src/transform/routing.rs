use crate::decode::decode_trigger;
use crate::error::IngestError;
use crate::handler::{Disposition, IngestHandler, Scope};
use crate::identity::{self, normalize_internal_name};
use crate::store::rows::RoutingDecisionRow;
use crate::trigger::GeoBucket;

use super::{expect_payload, non_empty, non_empty_opt, UNKNOWN_COUNTRY};

impl IngestHandler {
    /// Records one load-balancer decision. The row belongs to the envelope
    /// tenant; the stream owner, when different, goes in `stream_tenant_id`.
    pub(crate) async fn process_load_balancing(
        &self,
        scope: &Scope<'_>,
    ) -> Result<Disposition, IngestError> {
        let mut trigger = decode_trigger(&scope.event.data)?;
        let Some(stream_id) = self.require_stream_id(scope, &trigger).await else {
            return Ok(Disposition::Dropped);
        };
        let lb = expect_payload!(trigger, LoadBalancingData, "load_balancing");

        let (client_bucket_h3, client_bucket_res) = GeoBucket::cell(lb.client_bucket.as_ref());
        let (node_bucket_h3, node_bucket_res) = GeoBucket::cell(lb.node_bucket.as_ref());
        let client_country = if lb.client_country.is_empty() {
            UNKNOWN_COUNTRY.to_string()
        } else {
            lb.client_country
        };

        let row = RoutingDecisionRow {
            timestamp: scope.event.timestamp,
            tenant_id: scope.tenant_id,
            stream_id,
            internal_name: normalize_internal_name(&lb.internal_name).to_string(),
            selected_node: lb.selected_node,
            status: lb.status,
            details: lb.details,
            score: lb.score,
            client_ip: lb.client_ip,
            client_country,
            client_latitude: lb.latitude,
            client_longitude: lb.longitude,
            client_bucket_h3,
            client_bucket_res,
            node_latitude: lb.node_latitude,
            node_longitude: lb.node_longitude,
            node_name: lb.node_name,
            node_bucket_h3,
            node_bucket_res,
            selected_node_id: non_empty_opt(lb.selected_node_id.as_deref()),
            routing_distance_km: lb.routing_distance_km.filter(|km| *km != 0.0),
            stream_tenant_id: lb
                .stream_tenant_id
                .as_deref()
                .and_then(identity::parse_identity),
            cluster_id: lb.cluster_id,
            latency_ms: lb.latency_ms,
            candidates_count: lb.candidates_count.filter(|n| *n > 0),
            event_type: non_empty(&lb.event_type),
            source: non_empty(&lb.source),
        };

        self.projector.write(row).await?;
        Ok(Disposition::Processed)
    }
}
