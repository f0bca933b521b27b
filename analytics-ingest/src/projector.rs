//! Sequential writes of the rows one event produces.
//!
//! Batches go out in the order given and the first failure stops the rest.
//! A state row that landed before a later failure stays written; the event is
//! redelivered and the state table converges by last-write-wins.

use std::sync::Arc;

use tracing::error;

use crate::error::IngestError;
use crate::metrics::IngestMetrics;
use crate::store::{AnalyticsStore, RowBatch};

#[derive(Clone)]
pub struct Projector {
    store: Arc<dyn AnalyticsStore>,
    metrics: IngestMetrics,
}

impl Projector {
    pub fn new(store: Arc<dyn AnalyticsStore>, metrics: IngestMetrics) -> Self {
        Self { store, metrics }
    }

    pub async fn write(&self, batch: impl Into<RowBatch>) -> Result<(), IngestError> {
        let batch = batch.into();
        let table = batch.table();
        self.metrics.insert(table, "attempt");

        match self.store.insert(batch).await {
            Ok(()) => {
                self.metrics.insert(table, "success");
                Ok(())
            }
            Err(source) => {
                self.metrics.insert(table, "error");
                error!(table = table.name(), error = %source, "Failed to write batch");
                Err(IngestError::Store {
                    table: table.name(),
                    source,
                })
            }
        }
    }

    /// Writes state first, then history, then any samples.
    pub async fn write_all(&self, batches: Vec<RowBatch>) -> Result<(), IngestError> {
        for batch in batches {
            self.write(batch).await?;
        }
        Ok(())
    }
}
