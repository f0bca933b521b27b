use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::decode::decode_trigger;
use crate::error::IngestError;
use crate::handler::{Disposition, IngestHandler, Scope};
use crate::identity;
use crate::store::rows::ApiRequestRow;
use crate::store::Table;
use crate::trigger::ApiRequestAggregate;

use super::{expect_payload, non_empty};

impl IngestHandler {
    /// Gateway usage aggregates. Each aggregate names its own tenant and is
    /// kept or skipped on that basis alone.
    pub(crate) async fn process_api_request_batch(
        &self,
        scope: &Scope<'_>,
    ) -> Result<Disposition, IngestError> {
        let mut trigger = decode_trigger(&scope.event.data)?;
        let batch = expect_payload!(trigger, ApiRequestBatch, "api_request_batch");

        let rows: Vec<ApiRequestRow> = batch
            .aggregates
            .iter()
            .filter_map(|agg| {
                let tenant_id = identity::parse_identity(&agg.tenant_id)?;
                let timestamp =
                    aggregate_timestamp(agg.timestamp, batch.timestamp, scope.event.timestamp);
                Some(request_row(agg, tenant_id, &batch.source_node, timestamp))
            })
            .collect();

        self.write_api_requests(rows, &batch.source_node).await
    }

    /// Shared tail of the analytics and service batch paths. An empty batch
    /// is a skip, never an error, so a bad producer cannot stall a partition.
    pub(crate) async fn write_api_requests(
        &self,
        rows: Vec<ApiRequestRow>,
        source_node: &str,
    ) -> Result<Disposition, IngestError> {
        if rows.is_empty() {
            self.metrics.insert(Table::ApiRequests, "skip");
            debug!(source_node, "API request batch had no valid aggregates, skipping");
            return Ok(Disposition::Skipped);
        }

        let count = rows.len();
        self.projector.write(rows).await?;
        debug!(source_node, aggregate_count = count, "Recorded API request batch");
        Ok(Disposition::Processed)
    }
}

pub(crate) fn request_row(
    agg: &ApiRequestAggregate,
    tenant_id: Uuid,
    source_node: &str,
    timestamp: OffsetDateTime,
) -> ApiRequestRow {
    ApiRequestRow {
        timestamp,
        tenant_id,
        source_node: source_node.to_string(),
        auth_type: agg.auth_type.clone(),
        operation_name: non_empty(&agg.operation_name),
        operation_type: agg.operation_type.clone(),
        request_count: agg.request_count,
        error_count: agg.error_count,
        total_duration_ms: agg.total_duration_ms,
        total_complexity: agg.total_complexity,
        user_hashes: agg.user_hashes.clone(),
        token_hashes: agg.token_hashes.clone(),
    }
}

/// Aggregate time, else batch time, else the envelope's.
pub(crate) fn aggregate_timestamp(
    aggregate: i64,
    batch: i64,
    fallback: OffsetDateTime,
) -> OffsetDateTime {
    [aggregate, batch]
        .into_iter()
        .filter(|ts| *ts > 0)
        .find_map(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn timestamp_precedence() {
        let envelope = datetime!(2024-01-01 00:00 UTC);
        assert_eq!(aggregate_timestamp(0, 0, envelope), envelope);
        assert_eq!(
            aggregate_timestamp(0, 1_704_153_600, envelope),
            datetime!(2024-01-02 00:00 UTC)
        );
        assert_eq!(
            aggregate_timestamp(1_704_240_000, 1_704_153_600, envelope),
            datetime!(2024-01-03 00:00 UTC)
        );
    }

    #[test]
    fn empty_operation_name_is_null() {
        let agg = ApiRequestAggregate {
            operation_type: "query".to_string(),
            request_count: 3,
            ..Default::default()
        };
        let row = request_row(&agg, Uuid::new_v4(), "gw-1", datetime!(2024-01-01 00:00 UTC));
        assert_eq!(row.operation_name, None);
        assert_eq!(row.request_count, 3);
        assert!(row.user_hashes.is_empty());
    }
}
