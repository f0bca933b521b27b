//! In-memory stand-ins for ClickHouse and Postgres, plus event builders.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use analytics_ingest::error::StoreError;
use analytics_ingest::metrics::IngestMetrics;
use analytics_ingest::rollups::ViewerRollups;
use analytics_ingest::store::rows::IngestErrorRow;
use analytics_ingest::store::{AnalyticsStore, RowBatch, Table};
use analytics_ingest::{AnalyticsEvent, IngestHandler, ServiceEvent};
use async_trait::async_trait;
use metrics::Key;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use parking_lot::Mutex;
use serde_json::{json, Value};
use uuid::Uuid;

pub const TENANT: &str = "5a1d5c6e-4b8f-4a44-9a2d-1c1b0b7f8e11";
pub const OTHER_TENANT: &str = "0b6f2c3e-9d1a-4f7e-8c55-2a7e9d3b4c21";
pub const STREAM: &str = "6d3c1c52-7f55-4f0d-9d35-0c5f7f1f1a01";
pub const EVENT_ID: &str = "9f8e7d6c-5b4a-4321-8fed-cba987654321";

#[derive(Default)]
pub struct RecordingStore {
    batches: Mutex<Vec<RowBatch>>,
    existing: Mutex<HashSet<(Table, Uuid)>>,
    failing: Mutex<Option<Table>>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes the duplicate probe report `event_id` as present in `table`.
    pub fn seed_existing(&self, table: Table, event_id: &str) {
        let id = Uuid::parse_str(event_id).unwrap();
        self.existing.lock().insert((table, id));
    }

    /// Rejects every insert into `table`.
    pub fn fail_on(&self, table: Table) {
        *self.failing.lock() = Some(table);
    }

    pub fn batches(&self) -> Vec<RowBatch> {
        self.batches.lock().clone()
    }

    pub fn tables(&self) -> Vec<Table> {
        self.batches.lock().iter().map(RowBatch::table).collect()
    }

    pub fn row_count(&self) -> usize {
        self.batches.lock().iter().map(RowBatch::len).sum()
    }

    pub fn ingest_errors(&self) -> Vec<IngestErrorRow> {
        self.batches
            .lock()
            .iter()
            .filter_map(|batch| match batch {
                RowBatch::IngestErrors(rows) => Some(rows.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

#[async_trait]
impl AnalyticsStore for RecordingStore {
    async fn insert(&self, batch: RowBatch) -> Result<(), StoreError> {
        if *self.failing.lock() == Some(batch.table()) {
            return Err(StoreError::Rejected(format!(
                "{} unavailable",
                batch.table().name()
            )));
        }
        self.batches.lock().push(batch);
        Ok(())
    }

    async fn event_exists(&self, table: Table, event_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.existing.lock().contains(&(table, event_id)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RollupCall {
    Connect(Uuid, String),
    Disconnect(Uuid, String, u32, u64),
}

#[derive(Default)]
pub struct RecordingRollups {
    pub calls: Mutex<Vec<RollupCall>>,
}

#[async_trait]
impl ViewerRollups for RecordingRollups {
    async fn record_connect(&self, tenant_id: Uuid, internal_name: &str) -> Result<(), sqlx::Error> {
        self.calls
            .lock()
            .push(RollupCall::Connect(tenant_id, internal_name.to_string()));
        Ok(())
    }

    async fn record_disconnect(
        &self,
        tenant_id: Uuid,
        internal_name: &str,
        session_seconds: u32,
        bytes_transferred: u64,
    ) -> Result<(), sqlx::Error> {
        self.calls.lock().push(RollupCall::Disconnect(
            tenant_id,
            internal_name.to_string(),
            session_seconds,
            bytes_transferred,
        ));
        Ok(())
    }
}

pub struct Harness {
    pub handler: IngestHandler,
    pub store: Arc<RecordingStore>,
    pub rollups: Arc<RecordingRollups>,
    pub snapshotter: Snapshotter,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_legacy_fallback(false)
    }

    pub fn with_legacy_fallback(enabled: bool) -> Self {
        let store = RecordingStore::new();
        let rollups = Arc::new(RecordingRollups::default());
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let handler = IngestHandler::new(
            store.clone(),
            rollups.clone(),
            IngestMetrics::new(Arc::new(recorder)),
        )
        .with_legacy_tenant_fallback(enabled);
        Self {
            handler,
            store,
            rollups,
            snapshotter,
        }
    }

    /// Current value of a counter with exactly these labels, if it was touched.
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> Option<u64> {
        self.snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .find(|(key, _, _, _)| key_matches(key.key(), name, labels))
            .and_then(|(_, _, _, value)| match value {
                DebugValue::Counter(count) => Some(count),
                _ => None,
            })
    }
}

fn key_matches(key: &Key, name: &str, labels: &[(&str, &str)]) -> bool {
    key.name() == name
        && key.labels().count() == labels.len()
        && labels
            .iter()
            .all(|(k, v)| key.labels().any(|l| l.key() == *k && l.value() == *v))
}

pub fn analytics_event(event_type: &str, tenant_id: &str, data: Value) -> AnalyticsEvent {
    serde_json::from_value(json!({
        "event_id": EVENT_ID,
        "event_type": event_type,
        "timestamp": "2024-01-01T00:00:00Z",
        "tenant_id": tenant_id,
        "source": "decklog",
        "data": data,
    }))
    .unwrap()
}

pub fn service_event(event_type: &str, tenant_id: &str, data: Value) -> ServiceEvent {
    serde_json::from_value(json!({
        "event_id": EVENT_ID,
        "event_type": event_type,
        "timestamp": "2024-01-01T00:00:00Z",
        "tenant_id": tenant_id,
        "source": "commodore",
        "data": data,
    }))
    .unwrap()
}

/// A trigger envelope around one payload.
pub fn trigger(payload_key: &str, payload: Value) -> Value {
    let mut data = json!({
        "triggerType": "TEST",
        "nodeId": "edge-1",
        "clusterId": "eu-west",
        "streamId": STREAM,
        "timestamp": "1704067200",
    });
    data[payload_key] = payload;
    data
}

pub fn viewer_connect() -> Value {
    trigger(
        "viewerConnect",
        json!({
            "streamName": "live+demo",
            "host": "203.0.113.7",
            "connector": "HLS",
            "sessionId": "s-1",
            "clientCountry": "NL",
            "clientCity": "Amsterdam",
            "clientLatitude": 52.37,
            "clientLongitude": 4.89
        }),
    )
}

pub fn viewer_disconnect() -> Value {
    trigger(
        "viewerDisconnect",
        json!({
            "streamName": "live+demo",
            "sessionId": "s-1",
            "connector": "HLS",
            "duration": "120",
            "upBytes": "1000",
            "downBytes": "-5",
            "nodeId": "edge-1"
        }),
    )
}
