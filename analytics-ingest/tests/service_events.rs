mod common;

use analytics_ingest::error::IngestError;
use analytics_ingest::metrics_consts::ANALYTICS_EVENTS;
use analytics_ingest::store::{RowBatch, Table};
use analytics_ingest::Disposition;
use common::*;
use serde_json::{json, Value};
use uuid::Uuid;

#[tokio::test]
async fn missing_tenant_is_dropped_and_audited() {
    let harness = Harness::new();
    let event = service_event("tenant_updated", "", json!({ "plan": "pro" }));

    let disposition = harness.handler.handle_service_event(&event).await.unwrap();

    assert_eq!(disposition, Disposition::Dropped);
    let errors = harness.store.ingest_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error, "missing_or_invalid_tenant_id_service_event");
    assert_eq!(harness.store.tables(), vec![Table::IngestErrors]);
    assert_eq!(
        harness.counter(
            ANALYTICS_EVENTS,
            &[("event_type", "tenant_updated"), ("status", "dropped")]
        ),
        Some(1)
    );
}

#[tokio::test]
async fn generic_event_is_audited_with_raw_data() {
    let harness = Harness::new();
    let mut event = service_event("tenant_updated", TENANT, json!({ "plan": "pro" }));
    event.resource_type = Some("tenant".to_string());
    event.resource_id = Some(String::new());

    let disposition = harness.handler.handle_service_event(&event).await.unwrap();

    assert_eq!(disposition, Disposition::Processed);
    let batches = harness.store.batches();
    let [RowBatch::ApiEvents(rows)] = batches.as_slice() else {
        panic!("unexpected batches {batches:?}");
    };
    let row = &rows[0];
    assert_eq!(row.tenant_id, Uuid::parse_str(TENANT).unwrap());
    assert_eq!(row.source, "commodore");
    assert_eq!(row.resource_type.as_deref(), Some("tenant"));
    assert_eq!(row.resource_id, None);
    let details: Value = serde_json::from_str(&row.details).unwrap();
    assert_eq!(details, json!({ "plan": "pro" }));
}

#[tokio::test]
async fn message_bodies_never_reach_the_audit() {
    let harness = Harness::new();
    let event = service_event(
        "message_received",
        TENANT,
        json!({ "conversation_id": "c-1", "message_id": "m-1", "body": "hello" }),
    );

    harness.handler.handle_service_event(&event).await.unwrap();

    let batches = harness.store.batches();
    let [RowBatch::ApiEvents(rows)] = batches.as_slice() else {
        panic!("unexpected batches {batches:?}");
    };
    let details: Value = serde_json::from_str(&rows[0].details).unwrap();
    assert_eq!(details, json!({ "conversation_id": "c-1", "message_id": "m-1" }));
}

#[tokio::test]
async fn tenant_created_with_attribution() {
    let harness = Harness::new();
    let event = service_event(
        "tenant_created",
        TENANT,
        json!({
            "attribution": {
                "signup_channel": "web",
                "signup_method": "email",
                "utm_source": "newsletter",
                "utm_medium": "",
                "is_agent": true
            }
        }),
    );

    let disposition = harness.handler.handle_service_event(&event).await.unwrap();

    assert_eq!(disposition, Disposition::Processed);
    assert_eq!(
        harness.store.tables(),
        vec![Table::TenantAcquisitionEvents, Table::ApiEvents]
    );
    let batches = harness.store.batches();
    let RowBatch::TenantAcquisitionEvents(rows) = &batches[0] else {
        panic!("expected acquisition row first");
    };
    assert_eq!(rows[0].signup_channel, "web");
    assert_eq!(rows[0].utm_source.as_deref(), Some("newsletter"));
    assert_eq!(rows[0].utm_medium, None);
    assert_eq!(rows[0].is_agent, 1);
}

#[tokio::test]
async fn tenant_created_without_channel_is_only_audited() {
    let harness = Harness::new();
    let event = service_event(
        "tenant_created",
        TENANT,
        json!({ "attribution": { "signup_channel": "" } }),
    );

    harness.handler.handle_service_event(&event).await.unwrap();

    assert_eq!(harness.store.tables(), vec![Table::ApiEvents]);
}

#[tokio::test]
async fn api_batch_skips_tenant_gate_and_validates_per_aggregate() {
    let harness = Harness::new();
    let event = service_event(
        "api_request_batch",
        "",
        json!({
            "source_node": "gw-1",
            "timestamp": 1_704_067_200,
            "aggregates": [
                {
                    "tenant_id": TENANT,
                    "auth_type": "jwt",
                    "operation_type": "query",
                    "operation_name": "streams",
                    "request_count": 5,
                    "user_hashes": [11, 12]
                },
                { "tenant_id": "bad", "request_count": 9 }
            ]
        }),
    );

    let disposition = harness.handler.handle_service_event(&event).await.unwrap();

    assert_eq!(disposition, Disposition::Processed);
    assert_eq!(
        harness.store.tables(),
        vec![Table::ApiRequests, Table::ApiEvents]
    );
    let batches = harness.store.batches();
    let RowBatch::ApiRequests(requests) = &batches[0] else {
        panic!("expected api_requests first");
    };
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].operation_name.as_deref(), Some("streams"));
    assert_eq!(requests[0].user_hashes, vec![11, 12]);
    let RowBatch::ApiEvents(audits) = &batches[1] else {
        panic!("expected api_events second");
    };
    assert_eq!(audits.len(), 1);
    let details: Value = serde_json::from_str(&audits[0].details).unwrap();
    assert_eq!(details["request_count"], 5);
    assert_eq!(details["source_node"], "gw-1");
}

#[tokio::test]
async fn api_batch_with_no_valid_aggregates_is_skipped() {
    let harness = Harness::new();
    let event = service_event(
        "api_request_batch",
        "",
        json!({ "source_node": "gw-1", "aggregates": [{ "tenant_id": "" }] }),
    );

    let disposition = harness.handler.handle_service_event(&event).await.unwrap();

    assert_eq!(disposition, Disposition::Skipped);
    assert_eq!(harness.store.row_count(), 0);
}

#[tokio::test]
async fn api_batch_without_aggregates_is_an_error() {
    for data in [json!({ "source_node": "gw-1" }), json!({ "aggregates": "x" })] {
        let harness = Harness::new();
        let event = service_event("api_request_batch", "", data);

        let err = harness
            .handler
            .handle_service_event(&event)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::InvalidServiceEvent(_)));
        let errors = harness.store.ingest_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].error.starts_with("handler_error"));
    }
}

#[tokio::test]
async fn audit_failure_is_returned() {
    let harness = Harness::new();
    harness.store.fail_on(Table::ApiEvents);
    let event = service_event("tenant_updated", TENANT, json!({}));

    let err = harness
        .handler
        .handle_service_event(&event)
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Store { table: "api_events", .. }));
    assert_eq!(harness.store.ingest_errors().len(), 1);
}
