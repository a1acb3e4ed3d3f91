//! HTTP contract tests for the PostgREST-style REST gateway.

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use commission_core::{
    ChangeEvent, ChangeKind, GatewayConfig, RemoteStore, RestStore, RowFilter, StoreEntity,
    StoreError,
};

async fn store_for(server: &MockServer) -> RestStore {
    RestStore::new(&GatewayConfig {
        base_url: server.uri(),
        api_key: "secret".to_string(),
    })
    .expect("gateway construction")
}

#[tokio::test]
async fn list_renders_filter_as_query_and_sends_auth_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/commissions"))
        .and(query_param("warehouse_id", "eq.w1"))
        .and(query_param("deleted_at", "is.null"))
        .and(header("apikey", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "11111111-1111-1111-1111-111111111111", "name": "K1"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let filter = RowFilter::new()
        .eq("warehouse_id", json!("w1"))
        .is_null("deleted_at");
    let rows = store.list(StoreEntity::Commissions, &filter).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "K1");
}

#[tokio::test]
async fn count_is_head_only_and_parses_content_range() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/commissions"))
        .and(header("Prefer", "count=exact"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("Content-Range", "0-0/42")
                .set_body_json(json!([])),
        )
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let count = store
        .count(StoreEntity::Commissions, &RowFilter::new())
        .await
        .unwrap();
    assert_eq!(count, 42);
}

#[tokio::test]
async fn insert_returns_the_created_representation() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/commission_events"))
        .and(header("Prefer", "return=representation"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!([{"id": id.to_string(), "action": "created"}])),
        )
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let row = store
        .insert(
            StoreEntity::CommissionEvents,
            json!({"id": id.to_string(), "action": "created"}),
        )
        .await
        .unwrap();
    assert_eq!(row["id"], id.to_string());
}

#[tokio::test]
async fn update_of_unknown_row_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/commissions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let err = store
        .update(StoreEntity::Commissions, Uuid::new_v4(), json!({"notes": "x"}))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::RowNotFound(_)));
}

#[tokio::test]
async fn backend_failures_surface_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/articles"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let err = store
        .list(StoreEntity::Articles, &RowFilter::new())
        .await
        .unwrap_err();
    match err {
        StoreError::Backend(message) => {
            assert!(message.contains("500"));
            assert!(message.contains("boom"));
        }
        other => panic!("expected backend error, got {other:?}"),
    }
}

#[tokio::test]
async fn injected_push_events_reach_subscribers() {
    let server = MockServer::start().await;
    let store = store_for(&server).await;

    let mut stream = store.subscribe(
        StoreEntity::Commissions,
        RowFilter::new().eq("warehouse_id", json!("w1")),
    );
    let injector = store.change_injector(StoreEntity::Commissions);
    injector
        .send(ChangeEvent {
            kind: ChangeKind::Updated,
            entity: StoreEntity::Commissions,
            row: json!({"id": Uuid::new_v4().to_string(), "warehouse_id": "w1"}),
        })
        .unwrap();

    let event = stream.recv().await.unwrap();
    assert_eq!(event.kind, ChangeKind::Updated);
    assert_eq!(event.row["warehouse_id"], "w1");
}
