use crate::decode::decode_trigger;
use crate::error::IngestError;
use crate::handler::{Disposition, IngestHandler, Scope};
use crate::identity::{self, normalize_internal_name};
use crate::store::rows::ClientQoeSampleRow;

use super::{connection_quality, expect_payload};

impl IngestHandler {
    /// One QoE sample per periodic client report. Samples without a resolvable
    /// stream keep a nil stream id rather than being dropped.
    pub(crate) async fn process_client_lifecycle(
        &self,
        scope: &Scope<'_>,
    ) -> Result<Disposition, IngestError> {
        let mut trigger = decode_trigger(&scope.event.data)?;
        let client = expect_payload!(trigger, ClientLifecycleUpdate, "client_lifecycle_update");

        let row = ClientQoeSampleRow {
            timestamp: scope.event.timestamp,
            tenant_id: scope.tenant_id,
            stream_id: identity::uuid_or_nil(trigger.stream_id()),
            internal_name: normalize_internal_name(&client.internal_name).to_string(),
            session_id: client.session_id,
            node_id: trigger.node_id,
            protocol: client.protocol,
            host: client.host,
            connection_time: client.connection_time,
            position: client.position,
            bandwidth_in: client.bandwidth_in_bps,
            bandwidth_out: client.bandwidth_out_bps,
            bytes_downloaded: client.bytes_downloaded,
            bytes_uploaded: client.bytes_uploaded,
            packets_sent: client.packets_sent,
            packets_lost: client.packets_lost,
            packets_retransmitted: client.packets_retransmitted,
            connection_quality: connection_quality(client.packets_sent, client.packets_lost),
        };

        self.projector.write(row).await?;
        Ok(Disposition::Processed)
    }
}
