use std::time::Duration;

use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "::")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "18005")]
    pub port: u16,

    // Empty disables the Postgres viewer rollups.
    #[envconfig(default = "")]
    pub database_url: String,

    #[envconfig(default = "4")]
    pub max_pg_connections: u32,

    #[envconfig(default = "false")]
    pub legacy_tenant_fallback: bool,

    #[envconfig(default = "30")]
    pub consumer_heartbeat_interval_secs: u64,

    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    #[envconfig(nested = true)]
    pub clickhouse: ClickhouseConfig,
}

impl Config {
    pub fn init_with_defaults() -> Result<Self, envconfig::Error> {
        Self::init_from_env()
    }

    pub fn bind(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Deadline after which a silent consumer loop is reported unhealthy.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.consumer_heartbeat_interval_secs)
    }
}

#[derive(Envconfig, Clone)]
pub struct KafkaConfig {
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,
    #[envconfig(default = "false")]
    pub kafka_tls: bool,
    #[envconfig(default = "periscope-ingest")]
    pub kafka_consumer_group: String,
    #[envconfig(default = "analytics_events")]
    pub kafka_analytics_topic: String,
    #[envconfig(default = "service_events")]
    pub kafka_service_topic: String,
    #[envconfig(default = "decklog_events_dlq")]
    pub kafka_dlq_topic: String,
    #[envconfig(default = "earliest")]
    pub kafka_consumer_offset_reset: String, // earliest, latest
    #[envconfig(default = "20")]
    pub kafka_producer_linger_ms: u32, // Maximum time between DLQ producer batches
    #[envconfig(default = "20000")]
    pub kafka_message_timeout_ms: u32, // Time before a DLQ produce is considered failed
}

#[derive(Envconfig, Clone)]
pub struct ClickhouseConfig {
    #[envconfig(default = "http://localhost:8123")]
    pub clickhouse_url: String,
    #[envconfig(default = "periscope")]
    pub clickhouse_database: String,
    #[envconfig(default = "default")]
    pub clickhouse_user: String,
    #[envconfig(default = "")]
    pub clickhouse_password: String,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::init_from_hashmap(&HashMap::new()).unwrap();
        assert_eq!(config.bind(), "[::]:18005");
        assert_eq!(config.kafka.kafka_consumer_group, "periscope-ingest");
        assert_eq!(config.kafka.kafka_dlq_topic, "decklog_events_dlq");
        assert_eq!(config.clickhouse.clickhouse_database, "periscope");
        assert!(config.database_url.is_empty());
        assert!(!config.legacy_tenant_fallback);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
    }

    #[test]
    fn ipv4_bind_has_no_brackets() {
        let env = HashMap::from([
            ("BIND_HOST".to_string(), "0.0.0.0".to_string()),
            ("BIND_PORT".to_string(), "3302".to_string()),
        ]);
        let config = Config::init_from_hashmap(&env).unwrap();
        assert_eq!(config.bind(), "0.0.0.0:3302");
    }
}
