pub mod config;
pub mod consumer;
pub mod decode;
pub mod dedup;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod health;
pub mod identity;
pub mod ingest_errors;
pub mod metrics;
pub mod metrics_consts;
pub mod projector;
pub mod proto_json;
pub mod rollups;
pub mod store;
pub mod transform;
pub mod trigger;

pub use envelope::{AnalyticsEvent, ServiceEvent};
pub use error::IngestError;
pub use handler::{Disposition, IngestHandler};
