//! Running viewer aggregates kept in Postgres alongside the ClickHouse history.
//!
//! These are reduced counters for dashboards, keyed by `(tenant_id, internal_name)`.
//! Callers treat every failure here as non-fatal.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

#[async_trait]
pub trait ViewerRollups: Send + Sync {
    async fn record_connect(&self, tenant_id: Uuid, internal_name: &str) -> Result<(), sqlx::Error>;

    async fn record_disconnect(
        &self,
        tenant_id: Uuid,
        internal_name: &str,
        session_seconds: u32,
        bytes_transferred: u64,
    ) -> Result<(), sqlx::Error>;
}

/// Used when no relational database is configured.
pub struct NoopRollups;

#[async_trait]
impl ViewerRollups for NoopRollups {
    async fn record_connect(&self, _: Uuid, _: &str) -> Result<(), sqlx::Error> {
        Ok(())
    }

    async fn record_disconnect(&self, _: Uuid, _: &str, _: u32, _: u64) -> Result<(), sqlx::Error> {
        Ok(())
    }
}

pub struct PgViewerRollups {
    pool: PgPool,
}

const CONNECT_SQL: &str = r#"
INSERT INTO stream_viewer_rollups
    (tenant_id, internal_name, current_viewers, total_sessions, total_session_seconds, total_bytes, updated_at)
VALUES ($1, $2, 1, 1, 0, 0, NOW())
ON CONFLICT (tenant_id, internal_name) DO UPDATE SET
    current_viewers = stream_viewer_rollups.current_viewers + 1,
    total_sessions = stream_viewer_rollups.total_sessions + 1,
    updated_at = NOW()
"#;

const DISCONNECT_SQL: &str = r#"
INSERT INTO stream_viewer_rollups
    (tenant_id, internal_name, current_viewers, total_sessions, total_session_seconds, total_bytes, updated_at)
VALUES ($1, $2, 0, 0, $3, $4, NOW())
ON CONFLICT (tenant_id, internal_name) DO UPDATE SET
    current_viewers = GREATEST(stream_viewer_rollups.current_viewers - 1, 0),
    total_session_seconds = stream_viewer_rollups.total_session_seconds + EXCLUDED.total_session_seconds,
    total_bytes = stream_viewer_rollups.total_bytes + EXCLUDED.total_bytes,
    updated_at = NOW()
"#;

impl PgViewerRollups {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(2))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl ViewerRollups for PgViewerRollups {
    async fn record_connect(&self, tenant_id: Uuid, internal_name: &str) -> Result<(), sqlx::Error> {
        sqlx::query(CONNECT_SQL)
            .bind(tenant_id)
            .bind(internal_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_disconnect(
        &self,
        tenant_id: Uuid,
        internal_name: &str,
        session_seconds: u32,
        bytes_transferred: u64,
    ) -> Result<(), sqlx::Error> {
        // Postgres has no unsigned integers.
        let bytes = i64::try_from(bytes_transferred).unwrap_or(i64::MAX);
        sqlx::query(DISCONNECT_SQL)
            .bind(tenant_id)
            .bind(internal_name)
            .bind(i64::from(session_seconds))
            .bind(bytes)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
