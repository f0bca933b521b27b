//! Analytical store boundary. Handlers build typed rows and hand them over in
//! per-table batches; the store decides how they reach ClickHouse.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;

pub mod clickhouse;
pub mod rows;

use rows::*;

#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Appends one batch of rows to its table.
    async fn insert(&self, batch: RowBatch) -> Result<(), StoreError>;

    /// Point probe used for best-effort deduplication.
    async fn event_exists(&self, table: Table, event_id: Uuid) -> Result<bool, StoreError>;
}

macro_rules! destination_tables {
    ($($variant:ident => $name:literal, $row:ty;)+) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Table {
            $($variant),+
        }

        impl Table {
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name),+
                }
            }
        }

        #[derive(Debug, Clone)]
        pub enum RowBatch {
            $($variant(Vec<$row>)),+
        }

        impl RowBatch {
            pub fn table(&self) -> Table {
                match self {
                    $(Self::$variant(_) => Table::$variant),+
                }
            }

            pub fn len(&self) -> usize {
                match self {
                    $(Self::$variant(rows) => rows.len()),+
                }
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }
        }

        $(
            impl From<Vec<$row>> for RowBatch {
                fn from(rows: Vec<$row>) -> Self {
                    Self::$variant(rows)
                }
            }

            impl From<$row> for RowBatch {
                fn from(row: $row) -> Self {
                    Self::$variant(vec![row])
                }
            }
        )+
    };
}

destination_tables! {
    ViewerConnectionEvents => "viewer_connection_events", ViewerConnectionRow;
    StreamStateCurrent => "stream_state_current", StreamStateRow;
    StreamEventLog => "stream_event_log", StreamEventLogRow;
    StreamHealthSamples => "stream_health_samples", StreamHealthSampleRow;
    TrackListEvents => "track_list_events", TrackListRow;
    RoutingDecisions => "routing_decisions", RoutingDecisionRow;
    ClientQoeSamples => "client_qoe_samples", ClientQoeSampleRow;
    NodeStateCurrent => "node_state_current", NodeStateRow;
    NodeMetricsSamples => "node_metrics_samples", NodeMetricsSampleRow;
    ArtifactStateCurrent => "artifact_state_current", ArtifactStateRow;
    ArtifactEvents => "artifact_events", ArtifactEventRow;
    StorageEvents => "storage_events", StorageEventRow;
    StorageSnapshots => "storage_snapshots", StorageSnapshotRow;
    ProcessingEvents => "processing_events", ProcessingEventRow;
    ApiRequests => "api_requests", ApiRequestRow;
    ApiEvents => "api_events", ApiEventRow;
    TenantAcquisitionEvents => "tenant_acquisition_events", TenantAcquisitionRow;
    FederationEvents => "federation_events", FederationEventRow;
    IngestErrors => "ingest_errors", IngestErrorRow;
}
