use std::sync::Arc;
use std::time::Duration;

use metrics::{Key, Label, Level, Metadata, NoopRecorder, Recorder};

use crate::metrics_consts::{
    ANALYTICS_EVENTS, CLICKHOUSE_INSERTS, DLQ_MESSAGES, DUPLICATE_EVENTS, KAFKA_MESSAGES,
    PROCESSING_DURATION, ROLLUP_UPDATES,
};
use crate::store::Table;

pub const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Handle to the process recorder. Handlers receive one at construction so
/// tests can swap in a debugging recorder instead of touching a global.
#[derive(Clone)]
pub struct IngestMetrics {
    recorder: Arc<dyn Recorder + Send + Sync>,
}

impl IngestMetrics {
    pub fn new(recorder: Arc<dyn Recorder + Send + Sync>) -> Self {
        Self { recorder }
    }

    pub fn noop() -> Self {
        Self::new(Arc::new(NoopRecorder))
    }

    pub fn event(&self, event_type: &str, status: &str) {
        self.increment(
            ANALYTICS_EVENTS,
            vec![
                Label::new("event_type", event_type.to_string()),
                Label::new("status", status.to_string()),
            ],
        );
    }

    pub fn processing_duration(&self, source: &str, elapsed: Duration) {
        let key = Key::from_parts(
            PROCESSING_DURATION,
            vec![Label::new("source", source.to_string())],
        );
        self.recorder
            .register_histogram(&key, &metadata())
            .record(elapsed.as_secs_f64());
    }

    pub fn insert(&self, table: Table, status: &'static str) {
        self.increment(
            CLICKHOUSE_INSERTS,
            vec![Label::new("table", table.name()), Label::new("status", status)],
        );
    }

    pub fn duplicate(&self, event_type: &str) {
        self.increment(
            DUPLICATE_EVENTS,
            vec![Label::new("event_type", event_type.to_string())],
        );
    }

    pub fn dlq(&self, topic: &str, error_type: &str) {
        self.increment(
            DLQ_MESSAGES,
            vec![
                Label::new("topic", topic.to_string()),
                Label::new("error_type", error_type.to_string()),
            ],
        );
    }

    pub fn kafka_message(&self, topic: &str, status: &'static str) {
        self.increment(
            KAFKA_MESSAGES,
            vec![
                Label::new("topic", topic.to_string()),
                Label::new("status", status),
            ],
        );
    }

    pub fn rollup(&self, status: &'static str) {
        self.increment(ROLLUP_UPDATES, vec![Label::new("status", status)]);
    }

    fn increment(&self, name: &'static str, labels: Vec<Label>) {
        let key = Key::from_parts(name, labels);
        self.recorder.register_counter(&key, &metadata()).increment(1);
    }
}

fn metadata() -> Metadata<'static> {
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()))
}

#[cfg(test)]
mod tests {
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    use super::*;

    #[test]
    fn counters_carry_labels() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let metrics = IngestMetrics::new(Arc::new(recorder));

        metrics.event("viewer_connect", "received");
        metrics.event("viewer_connect", "received");
        metrics.insert(Table::StreamEventLog, "attempt");

        let snapshot = snapshotter.snapshot().into_vec();
        let received = snapshot
            .iter()
            .find(|(key, _, _, _)| {
                key.key().name() == ANALYTICS_EVENTS
                    && key
                        .key()
                        .labels()
                        .any(|l| l.key() == "status" && l.value() == "received")
            })
            .map(|(_, _, _, value)| value.clone());
        assert_eq!(received, Some(&DebugValue::Counter(2)));

        let inserts = snapshot
            .iter()
            .find(|(key, _, _, _)| key.key().name() == CLICKHOUSE_INSERTS)
            .map(|(key, _, _, _)| {
                key.key()
                    .labels()
                    .map(|l| (l.key().to_string(), l.value().to_string()))
                    .collect::<Vec<_>>()
            });
        assert_eq!(
            inserts,
            Some(vec![
                ("table".to_string(), "stream_event_log".to_string()),
                ("status".to_string(), "attempt".to_string()),
            ])
        );
    }
}
