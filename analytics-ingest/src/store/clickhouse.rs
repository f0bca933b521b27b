use anyhow::{Context, Result};
use async_trait::async_trait;
use clickhouse::sql::Identifier;
use clickhouse::{Client, Row};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::ClickhouseConfig;
use crate::error::StoreError;
use crate::store::{AnalyticsStore, RowBatch, Table};

pub struct ClickhouseStore {
    client: Client,
}

impl ClickhouseStore {
    pub async fn new(config: &ClickhouseConfig) -> Result<Self> {
        let client = Client::default()
            .with_url(&config.clickhouse_url)
            .with_database(&config.clickhouse_database)
            .with_user(&config.clickhouse_user)
            .with_password(&config.clickhouse_password);

        client
            .query("SELECT 1")
            .execute()
            .await
            .context("Failed to connect to ClickHouse")?;

        info!(
            url = %config.clickhouse_url,
            database = %config.clickhouse_database,
            "Connected to ClickHouse"
        );

        Ok(Self { client })
    }

    async fn insert_rows<T>(&self, table: Table, rows: &[T]) -> Result<(), StoreError>
    where
        T: Row + Serialize,
    {
        let mut insert = self.client.insert(table.name())?;
        for row in rows {
            insert.write(row).await?;
        }
        insert.end().await?;
        Ok(())
    }
}

#[async_trait]
impl AnalyticsStore for ClickhouseStore {
    async fn insert(&self, batch: RowBatch) -> Result<(), StoreError> {
        let table = batch.table();
        match &batch {
            RowBatch::ViewerConnectionEvents(rows) => self.insert_rows(table, rows).await,
            RowBatch::StreamStateCurrent(rows) => self.insert_rows(table, rows).await,
            RowBatch::StreamEventLog(rows) => self.insert_rows(table, rows).await,
            RowBatch::StreamHealthSamples(rows) => self.insert_rows(table, rows).await,
            RowBatch::TrackListEvents(rows) => self.insert_rows(table, rows).await,
            RowBatch::RoutingDecisions(rows) => self.insert_rows(table, rows).await,
            RowBatch::ClientQoeSamples(rows) => self.insert_rows(table, rows).await,
            RowBatch::NodeStateCurrent(rows) => self.insert_rows(table, rows).await,
            RowBatch::NodeMetricsSamples(rows) => self.insert_rows(table, rows).await,
            RowBatch::ArtifactStateCurrent(rows) => self.insert_rows(table, rows).await,
            RowBatch::ArtifactEvents(rows) => self.insert_rows(table, rows).await,
            RowBatch::StorageEvents(rows) => self.insert_rows(table, rows).await,
            RowBatch::StorageSnapshots(rows) => self.insert_rows(table, rows).await,
            RowBatch::ProcessingEvents(rows) => self.insert_rows(table, rows).await,
            RowBatch::ApiRequests(rows) => self.insert_rows(table, rows).await,
            RowBatch::ApiEvents(rows) => self.insert_rows(table, rows).await,
            RowBatch::TenantAcquisitionEvents(rows) => self.insert_rows(table, rows).await,
            RowBatch::FederationEvents(rows) => self.insert_rows(table, rows).await,
            RowBatch::IngestErrors(rows) => self.insert_rows(table, rows).await,
        }
    }

    async fn event_exists(&self, table: Table, event_id: Uuid) -> Result<bool, StoreError> {
        let found = self
            .client
            .query("SELECT 1 FROM ? WHERE event_id = ? LIMIT 1")
            .bind(Identifier(table.name()))
            .bind(event_id.to_string())
            .fetch_optional::<u8>()
            .await?;
        Ok(found.is_some())
    }
}
