pub const ANALYTICS_EVENTS: &str = "analytics_events_total";
pub const PROCESSING_DURATION: &str = "batch_processing_duration_seconds";
pub const CLICKHOUSE_INSERTS: &str = "clickhouse_inserts_total";
pub const DUPLICATE_EVENTS: &str = "duplicate_events_total";
pub const DLQ_MESSAGES: &str = "dlq_messages_total";
pub const KAFKA_MESSAGES: &str = "kafka_messages_total";
pub const ROLLUP_UPDATES: &str = "rollup_updates_total";
