use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to parse trigger envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("failed to parse {key} payload: {source}")]
    Payload {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("multiple trigger payloads present: {0}")]
    AmbiguousPayload(String),
    #[error("field {0} given under both its proto and JSON names")]
    DuplicateField(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("clickhouse error: {0}")]
    ClickHouse(#[from] clickhouse::error::Error),
    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Failures that should be audited and redelivered. Policy drops and
/// duplicates are not errors; see [`crate::handler::Disposition`].
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("unexpected payload for {expected}: got {found}")]
    UnexpectedPayload {
        expected: &'static str,
        found: &'static str,
    },
    #[error("viewer connection payload mismatch: expected {expected}, got {actual}")]
    DirectionMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("invalid service event: {0}")]
    InvalidServiceEvent(String),
    #[error("failed to write {table}: {source}")]
    Store {
        table: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("failed to serialize event data: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IngestError {
    /// Short label used for the `error_type` metric dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::UnexpectedPayload { .. } => "unexpected_payload",
            Self::DirectionMismatch { .. } => "direction_mismatch",
            Self::InvalidServiceEvent(_) => "invalid_service_event",
            Self::Store { .. } => "store",
            Self::Serialization(_) => "serialization",
        }
    }
}
