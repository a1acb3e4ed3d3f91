//! Tab filter partition, trash retention window and supplier ordering.

mod common;

use chrono::Duration;
use common::TestApp;
use serde_json::json;
use uuid::Uuid;

use commission_core::{Clock, CommissionStatus, CommissionTab, RemoteStore, StoreEntity};

async fn ids_in(app: &TestApp, tab: CommissionTab) -> Vec<Uuid> {
    app.aggregator
        .refresh_commissions(tab)
        .await
        .commissions
        .iter()
        .map(|c| c.id)
        .collect()
}

#[tokio::test]
async fn tabs_partition_commissions_by_filter_predicate() {
    let app = TestApp::new();

    let draft = app.create_commission("Draft").await;
    let pending = app.create_commission("Return pending").await;
    let withdrawn = app.create_commission("Withdrawn").await;
    let missing = app.create_commission("Missing").await;
    let trashed = app.create_commission("Trashed").await;

    app.set_status(pending.id, CommissionStatus::ReturnPending).await;
    app.set_status(withdrawn.id, CommissionStatus::Withdrawn).await;
    app.set_status(missing.id, CommissionStatus::Missing).await;
    app.aggregator.soft_delete(trashed.id).await.unwrap();

    let active = ids_in(&app, CommissionTab::Active).await;
    for id in [draft.id, pending.id, withdrawn.id, missing.id] {
        assert!(active.contains(&id));
    }
    assert!(!active.contains(&trashed.id));

    let returns = ids_in(&app, CommissionTab::Returns).await;
    assert_eq!(returns, vec![pending.id]);

    let withdrawn_tab = ids_in(&app, CommissionTab::Withdrawn).await;
    assert_eq!(withdrawn_tab, vec![withdrawn.id]);

    let missing_tab = ids_in(&app, CommissionTab::Missing).await;
    assert!(missing_tab.contains(&missing.id));
    assert!(missing_tab.contains(&pending.id), "return statuses count as missing-relevant");
    assert!(!missing_tab.contains(&draft.id));
    assert!(!missing_tab.contains(&withdrawn.id));

    let trash = ids_in(&app, CommissionTab::Trash).await;
    assert_eq!(trash, vec![trashed.id]);
}

#[tokio::test]
async fn foreign_warehouse_rows_stay_invisible() {
    let app = TestApp::new();
    let mine = app.create_commission("Mine").await;

    let foreign_id = Uuid::new_v4();
    app.store
        .insert(
            StoreEntity::Commissions,
            json!({
                "id": foreign_id.to_string(),
                "name": "Foreign",
                "order_number": null,
                "notes": "",
                "status": "draft",
                "warehouse_id": Uuid::new_v4().to_string(),
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

    let active = ids_in(&app, CommissionTab::Active).await;
    assert!(active.contains(&mine.id));
    assert!(!active.contains(&foreign_id));
}

#[tokio::test]
async fn trash_hides_rows_past_the_retention_window() {
    let app = TestApp::new();
    let commission = app.create_commission("Ephemeral").await;
    app.aggregator.soft_delete(commission.id).await.unwrap();

    let trash = ids_in(&app, CommissionTab::Trash).await;
    assert_eq!(trash, vec![commission.id]);

    app.clock.advance(Duration::days(8));
    let trash = ids_in(&app, CommissionTab::Trash).await;
    assert!(trash.is_empty(), "8-day-old soft delete left the trash view");

    // The row itself survives until an explicit permanent delete.
    let row = app
        .store
        .get(StoreEntity::Commissions, commission.id)
        .await
        .unwrap();
    assert!(row.is_some());
}

#[tokio::test]
async fn restore_brings_a_commission_back_from_trash() {
    let app = TestApp::new();
    let commission = app.create_commission("Second chance").await;
    app.aggregator.soft_delete(commission.id).await.unwrap();
    assert!(!ids_in(&app, CommissionTab::Active).await.contains(&commission.id));

    app.aggregator.restore(commission.id).await.unwrap();
    assert!(ids_in(&app, CommissionTab::Active).await.contains(&commission.id));
    assert!(ids_in(&app, CommissionTab::Trash).await.is_empty());
}

#[tokio::test]
async fn purge_removes_rows_but_keeps_audit_history() {
    let app = TestApp::new();
    let article = app.seed_article("Spuren", 3).await;
    let (commission, _) = app
        .create_commission_with_items("Purge me", vec![app.stock_item(&article, 1)])
        .await;
    app.aggregator.soft_delete(commission.id).await.unwrap();
    app.aggregator.purge(commission.id).await.unwrap();

    assert!(app
        .store
        .get(StoreEntity::Commissions, commission.id)
        .await
        .unwrap()
        .is_none());
    let history = app.history_of(commission.id).await;
    assert!(!history.is_empty(), "audit rows outlive the commission");
    assert!(history.iter().all(|e| e.commission_name == "Purge me"));
}

#[tokio::test]
async fn tab_counts_reflect_missing_and_return_buckets() {
    let app = TestApp::new();
    let pending = app.create_commission("Pending").await;
    let missing = app.create_commission("Gone").await;
    app.create_commission("Plain draft").await;

    app.set_status(pending.id, CommissionStatus::ReturnPending).await;
    app.set_status(missing.id, CommissionStatus::Missing).await;

    let counts = app.aggregator.tab_counts().await;
    assert_eq!(counts.missing, 2, "return_pending and missing both count");
    assert_eq!(counts.returns, 1);
}

#[tokio::test]
async fn suppliers_are_ordered_by_usage_then_name() {
    let app = TestApp::new();
    let mut supplier_ids = Vec::new();
    for name in ["Zebra Stahl", "Anton Werkzeuge", "Mittel GmbH"] {
        let id = Uuid::new_v4();
        app.store
            .insert(
                StoreEntity::Suppliers,
                json!({
                    "id": id.to_string(),
                    "name": name,
                    "short_code": null,
                    "created_at": app.clock.now(),
                }),
            )
            .await
            .unwrap();
        supplier_ids.push(id);
    }
    let (zebra, _anton, mittel) = (supplier_ids[0], supplier_ids[1], supplier_ids[2]);

    // Two commissions use Mittel, one uses Zebra, none use Anton.
    for (name, supplier) in [("K1", mittel), ("K2", mittel), ("K3", zebra)] {
        app.aggregator
            .create_commission(commission_core::CommissionDraft {
                name: name.to_string(),
                order_number: None,
                notes: String::new(),
                supplier_id: Some(supplier),
                needs_label: false,
            })
            .await
            .unwrap();
    }

    let suppliers = app.aggregator.suppliers().await;
    let names: Vec<&str> = suppliers.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Mittel GmbH", "Zebra Stahl", "Anton Werkzeuge"]);
}

#[tokio::test]
async fn mark_scanned_degrades_gracefully() {
    let app = TestApp::new();
    let commission = app.create_commission("Scan me").await;
    app.aggregator.mark_scanned(commission.id).await;
    assert!(app.commission(commission.id).await.last_scanned_at.is_some());

    // Unknown id: logged, never surfaced.
    app.aggregator.mark_scanned(Uuid::new_v4()).await;
}
