//! Realtime reconciliation: coarse list invalidation, detail-scope
//! wholesale replacement and subscription lifecycle.

mod common;

use std::time::Duration;

use common::TestApp;
use serde_json::json;
use uuid::Uuid;

use commission_core::{
    ChangeKind, Clock, CommissionStatus, CommissionTab, QueryKey, RemoteStore, StoreEntity,
};

fn active_key(app: &TestApp) -> QueryKey {
    QueryKey::CommissionList {
        tab: CommissionTab::Active,
        warehouse_id: app.warehouse_id,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn open_detail_view_reflects_remote_status_change() {
    let app = TestApp::new();
    let article = app.seed_article("Fernwirkung", 5).await;
    let (commission, _) = app
        .create_commission_with_items("Concurrent edit", vec![app.stock_item(&article, 1)])
        .await;

    let mut watch = app.reconciler.watch_detail(commission.clone());
    assert_eq!(watch.current().unwrap().status, CommissionStatus::Draft);

    // Another session moves the commission on; its write carries a newer
    // timestamp.
    app.clock.advance(chrono::Duration::seconds(5));
    app.store
        .update(
            StoreEntity::Commissions,
            commission.id,
            json!({"status": "preparing", "updated_at": app.clock.now()}),
        )
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(1), watch.changed())
        .await
        .expect("detail update arrives")
        .unwrap();
    assert_eq!(
        watch.current().unwrap().status,
        CommissionStatus::Preparing,
        "open detail view shows the new value without reopening"
    );
}

#[tokio::test]
async fn stale_push_events_lose_against_newer_local_state() {
    let app = TestApp::new();
    let commission = app.create_commission("Last write wins").await;
    let watch = app.reconciler.watch_detail(commission.clone());

    let mut stale_row = serde_json::to_value(&commission).unwrap();
    stale_row["status"] = json!("missing");
    stale_row["updated_at"] = json!(commission.updated_at - chrono::Duration::seconds(30));
    app.store
        .push_external_event(ChangeKind::Updated, StoreEntity::Commissions, stale_row);

    settle().await;
    assert_eq!(
        watch.current().unwrap().status,
        CommissionStatus::Draft,
        "an older payload must not clobber newer state"
    );
}

#[tokio::test]
async fn remote_delete_clears_the_open_detail() {
    let app = TestApp::new();
    let commission = app.create_commission("Vanishing").await;
    let mut watch = app.reconciler.watch_detail(commission.clone());

    app.store
        .delete(StoreEntity::Commissions, commission.id)
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(1), watch.changed())
        .await
        .expect("delete arrives")
        .unwrap();
    assert!(watch.current().is_none());
}

#[tokio::test]
async fn item_changes_trigger_targeted_item_refetch() {
    let app = TestApp::new();
    let article = app.seed_article("Feingranular", 5).await;
    let (commission, items) = app
        .create_commission_with_items("Detail items", vec![app.stock_item(&article, 2)])
        .await;
    let _watch = app.reconciler.watch_detail(commission.clone());

    // Fresh item cache.
    app.aggregator
        .fetch_commission_items(commission.id)
        .await
        .unwrap();
    settle().await;

    // Another session toggles a pick; only the item cache goes stale.
    app.store
        .update(
            StoreEntity::CommissionItems,
            items[0].id,
            json!({"is_picked": true}),
        )
        .await
        .unwrap();
    settle().await;

    let key = QueryKey::CommissionItems {
        commission_id: commission.id,
    };
    let slot = app.cache.get(&key).expect("item slot");
    assert!(slot.fetched_at.is_none(), "targeted invalidation hit the item cache");
}

#[tokio::test]
async fn list_scope_events_invalidate_list_caches() {
    let app = TestApp::new();
    let _guard = app.reconciler.watch_lists();
    app.create_commission("Existing").await;

    let fresh = app.aggregator.refresh_commissions(CommissionTab::Active).await;
    assert_eq!(fresh.commissions.len(), 1);
    assert!(app.cache.get(&active_key(&app)).unwrap().fetched_at.is_some());

    // A row arrives from another session, bypassing the aggregator.
    app.store
        .insert(
            StoreEntity::Commissions,
            json!({
                "id": Uuid::new_v4().to_string(),
                "name": "Pushed in",
                "order_number": null,
                "notes": "",
                "status": "draft",
                "warehouse_id": app.warehouse_id.to_string(),
                "supplier_id": null,
                "needs_label": false,
                "withdrawn_at": null,
                "deleted_at": null,
                "last_scanned_at": null,
                "created_at": app.clock.now(),
                "updated_at": app.clock.now(),
            }),
        )
        .await
        .unwrap();
    settle().await;

    let slot = app.cache.get(&active_key(&app)).unwrap();
    assert!(slot.fetched_at.is_none(), "list cache was coarsely invalidated");

    let refreshed = app.aggregator.refresh_commissions(CommissionTab::Active).await;
    assert_eq!(refreshed.commissions.len(), 2);
}

#[tokio::test]
async fn dropping_the_guard_tears_the_subscription_down() {
    let app = TestApp::new();
    let guard = app.reconciler.watch_lists();
    app.create_commission("Before drop").await;
    drop(guard);

    let fresh = app.aggregator.refresh_commissions(CommissionTab::Active).await;
    assert!(app.cache.get(&active_key(&app)).unwrap().fetched_at.is_some());
    assert_eq!(fresh.commissions.len(), 1);

    app.store
        .insert(
            StoreEntity::Commissions,
            json!({
                "id": Uuid::new_v4().to_string(),
                "name": "Unseen",
                "order_number": null,
                "notes": "",
                "status": "draft",
                "warehouse_id": app.warehouse_id.to_string(),
                "supplier_id": null,
                "needs_label": false,
                "withdrawn_at": null,
                "deleted_at": null,
                "last_scanned_at": null,
                "created_at": app.clock.now(),
                "updated_at": app.clock.now(),
            }),
        )
        .await
        .unwrap();
    settle().await;

    let slot = app.cache.get(&active_key(&app)).unwrap();
    assert!(
        slot.fetched_at.is_some(),
        "released scope no longer invalidates; staleness covers recovery"
    );
}
