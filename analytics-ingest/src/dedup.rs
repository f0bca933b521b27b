use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::metrics::IngestMetrics;
use crate::store::{AnalyticsStore, Table};

/// Best-effort idempotency probe. This is a check-then-insert, so two
/// deliveries racing each other can both pass; history tables tolerate that.
#[derive(Clone)]
pub struct DuplicateDetector {
    store: Arc<dyn AnalyticsStore>,
    metrics: IngestMetrics,
}

impl DuplicateDetector {
    pub fn new(store: Arc<dyn AnalyticsStore>, metrics: IngestMetrics) -> Self {
        Self { store, metrics }
    }

    /// True when `event_id` already has a row in `table`. Probe failures are
    /// treated as "not seen" so the event still gets written.
    pub async fn seen(&self, table: Table, event_id: Uuid, event_type: &str) -> bool {
        if event_id.is_nil() {
            return false;
        }

        match self.store.event_exists(table, event_id).await {
            Ok(true) => {
                debug!(
                    table = table.name(),
                    %event_id,
                    event_type,
                    "Skipping already processed event"
                );
                self.metrics.duplicate(event_type);
                true
            }
            Ok(false) => false,
            Err(err) => {
                warn!(
                    table = table.name(),
                    %event_id,
                    error = %err,
                    "Duplicate probe failed, continuing"
                );
                false
            }
        }
    }

    /// True when any of `tables` already holds the event.
    pub async fn seen_in_any(&self, tables: &[Table], event_id: Uuid, event_type: &str) -> bool {
        for table in tables {
            if self.seen(*table, event_id, event_type).await {
                return true;
            }
        }
        false
    }
}
