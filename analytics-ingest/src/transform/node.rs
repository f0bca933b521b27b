use serde_json::{Map, Value};

use crate::decode::decode_trigger;
use crate::error::IngestError;
use crate::handler::{Disposition, IngestHandler, Scope};
use crate::store::rows::{NodeMetricsSampleRow, NodeStateRow};
use crate::trigger::NodeLifecycleUpdate;

use super::expect_payload;

impl IngestHandler {
    /// Writes `node_state_current`, then a `node_metrics_samples` row.
    pub(crate) async fn process_node_lifecycle(
        &self,
        scope: &Scope<'_>,
    ) -> Result<Disposition, IngestError> {
        let mut trigger = decode_trigger(&scope.event.data)?;
        let update = expect_payload!(trigger, NodeLifecycleUpdate, "node_lifecycle_update");

        let node_id = if update.node_id.is_empty() {
            trigger.node_id.clone()
        } else {
            update.node_id.clone()
        };
        let cpu = cpu_percent(update.cpu_tenths);
        let is_healthy = u8::from(update.is_healthy);
        let metadata = node_metadata(&update);

        let state = NodeStateRow {
            tenant_id: scope.tenant_id,
            cluster_id: trigger.cluster_id.clone(),
            node_id: node_id.clone(),
            cpu_percent: cpu,
            ram_used_bytes: update.ram_current,
            ram_total_bytes: update.ram_max,
            disk_used_bytes: update.disk_used_bytes,
            disk_total_bytes: update.disk_total_bytes,
            up_speed: update.up_speed,
            down_speed: update.down_speed,
            active_streams: update.active_streams,
            is_healthy,
            latitude: update.latitude,
            longitude: update.longitude,
            location: update.location.clone(),
            metadata: metadata.clone(),
            updated_at: scope.event.timestamp,
        };

        let sample = NodeMetricsSampleRow {
            timestamp: scope.event.timestamp,
            tenant_id: scope.tenant_id,
            cluster_id: trigger.cluster_id,
            node_id,
            cpu_usage: cpu,
            ram_max: update.ram_max,
            ram_current: update.ram_current,
            shm_total_bytes: update.shm_total_bytes,
            shm_used_bytes: update.shm_used_bytes,
            disk_total: update.disk_total_bytes,
            disk_used: update.disk_used_bytes,
            bandwidth_in: update.bandwidth_in_total,
            bandwidth_out: update.bandwidth_out_total,
            up_speed: update.up_speed,
            down_speed: update.down_speed,
            connections_current: update.connections_current,
            stream_count: update.active_streams,
            is_healthy,
            latitude: update.latitude,
            longitude: update.longitude,
            metadata,
        };

        self.projector
            .write_all(vec![state.into(), sample.into()])
            .await?;
        Ok(Disposition::Processed)
    }
}

/// Nodes report CPU in tenths of a percent.
fn cpu_percent(cpu_tenths: u32) -> f32 {
    cpu_tenths as f32 / 10.0
}

fn node_metadata(update: &NodeLifecycleUpdate) -> String {
    let mut metadata = Map::new();
    if let Some(capabilities) = &update.capabilities {
        metadata.insert("capabilities".to_string(), capabilities.clone());
    }
    if let Some(limits) = &update.limits {
        metadata.insert("limits".to_string(), limits.clone());
    }
    if update.bw_limit > 0 {
        metadata.insert("bw_limit".to_string(), Value::from(update.bw_limit));
    }
    if !update.base_url.is_empty() {
        metadata.insert("base_url".to_string(), Value::from(update.base_url.as_str()));
    }
    Value::Object(metadata).to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn cpu_tenths_become_percent() {
        assert_eq!(cpu_percent(0), 0.0);
        assert_eq!(cpu_percent(455), 45.5);
        assert_eq!(cpu_percent(1000), 100.0);
    }

    #[test]
    fn metadata_only_carries_set_fields() {
        let empty = NodeLifecycleUpdate::default();
        assert_eq!(node_metadata(&empty), "{}");

        let update = NodeLifecycleUpdate {
            capabilities: Some(json!({ "ingest": true })),
            bw_limit: 1_000_000,
            base_url: "https://edge-1.example".to_string(),
            ..Default::default()
        };
        let parsed: Value = serde_json::from_str(&node_metadata(&update)).unwrap();
        assert_eq!(
            parsed,
            json!({
                "capabilities": { "ingest": true },
                "bw_limit": 1_000_000,
                "base_url": "https://edge-1.example"
            })
        );
    }
}
