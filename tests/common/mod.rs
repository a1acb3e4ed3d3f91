#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use commission_core::{
    Article, Clock, Commission, CommissionAggregator, CommissionDraft, CommissionEvent,
    CommissionItem, CommissionStatus, EventSender, ItemDraft, ItemKind, ItemPatch, ManualClock,
    MemoryStore, NullPrinter, QueryCache, RealtimeReconciler, RemoteStore, RowFilter,
    StockMovement, StoreEntity, SyncConfig, ViewController, WorkflowService,
};

/// Test harness wiring the services over a seeded in-memory store.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub cache: QueryCache,
    pub clock: Arc<ManualClock>,
    pub aggregator: CommissionAggregator,
    pub workflow: WorkflowService,
    pub reconciler: RealtimeReconciler,
    pub view: Arc<Mutex<ViewController>>,
    pub warehouse_id: Uuid,
}

impl TestApp {
    pub fn new() -> Self {
        let config = SyncConfig::default();
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn RemoteStore> = store.clone();
        let cache = QueryCache::new(&config);
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let warehouse_id = Uuid::new_v4();

        let (events, mut rx) = EventSender::channel(config.event_buffer);
        // Drain domain events so mutators never block on a full channel.
        tokio::spawn(async move { while rx.recv().await.is_some() {} });

        let aggregator = CommissionAggregator::new(
            dyn_store.clone(),
            cache.clone(),
            events.clone(),
            dyn_clock.clone(),
            "tester",
            warehouse_id,
            &config,
        );
        let view = Arc::new(Mutex::new(ViewController::new()));
        let workflow = WorkflowService::new(
            dyn_store.clone(),
            aggregator.clone(),
            events,
            Arc::new(NullPrinter),
            view.clone(),
            dyn_clock,
        );
        let reconciler = RealtimeReconciler::new(dyn_store, cache.clone(), warehouse_id);

        Self {
            store,
            cache,
            clock,
            aggregator,
            workflow,
            reconciler,
            view,
            warehouse_id,
        }
    }

    pub async fn seed_article(&self, name: &str, stock: i64) -> Article {
        let now = self.clock.now();
        let article = Article {
            id: Uuid::new_v4(),
            warehouse_id: self.warehouse_id,
            name: name.to_string(),
            ean: None,
            sku: None,
            supplier_sku: None,
            stock,
            location: None,
            created_at: now,
            updated_at: now,
        };
        self.store
            .insert(StoreEntity::Articles, serde_json::to_value(&article).unwrap())
            .await
            .unwrap();
        article
    }

    pub async fn create_commission(&self, name: &str) -> Commission {
        self.aggregator
            .create_commission(CommissionDraft {
                name: name.to_string(),
                order_number: None,
                notes: String::new(),
                supplier_id: None,
                needs_label: false,
            })
            .await
            .expect("commission creation")
    }

    pub async fn create_commission_with_items(
        &self,
        name: &str,
        items: Vec<ItemDraft>,
    ) -> (Commission, Vec<CommissionItem>) {
        let commission = self.create_commission(name).await;
        let draft = CommissionDraft {
            name: name.to_string(),
            order_number: None,
            notes: String::new(),
            supplier_id: None,
            needs_label: false,
        };
        let saved = self
            .aggregator
            .save_commission(commission.id, draft, items)
            .await
            .expect("commission save");
        let items = self
            .aggregator
            .fetch_commission_items(commission.id)
            .await
            .expect("items fetch");
        (saved, items)
    }

    pub fn stock_item(&self, article: &Article, amount: i64) -> ItemDraft {
        ItemDraft {
            kind: ItemKind::Stock,
            amount,
            article_id: Some(article.id),
            custom_name: None,
            external_reference: None,
            attachment: None,
            is_backorder: false,
            notes: String::new(),
        }
    }

    pub fn backorder_item(&self, article: &Article, amount: i64) -> ItemDraft {
        ItemDraft {
            is_backorder: true,
            ..self.stock_item(article, amount)
        }
    }

    pub async fn pick_all(&self, commission_id: Uuid) {
        let items = self
            .aggregator
            .fetch_commission_items(commission_id)
            .await
            .expect("items fetch");
        for item in items {
            self.aggregator
                .update_item(
                    item.id,
                    ItemPatch {
                        is_picked: Some(true),
                        ..ItemPatch::default()
                    },
                )
                .await
                .expect("item pick");
        }
    }

    /// Directly seeds a status, bypassing the workflow, for filter tests.
    pub async fn set_status(&self, commission_id: Uuid, status: CommissionStatus) {
        self.store
            .update(
                StoreEntity::Commissions,
                commission_id,
                json!({"status": status, "updated_at": self.clock.now()}),
            )
            .await
            .unwrap();
        self.aggregator.invalidate_commission_caches();
    }

    pub async fn article(&self, id: Uuid) -> Article {
        let row = self
            .store
            .get(StoreEntity::Articles, id)
            .await
            .unwrap()
            .expect("article row");
        serde_json::from_value(row).unwrap()
    }

    pub async fn commission(&self, id: Uuid) -> Commission {
        let row = self
            .store
            .get(StoreEntity::Commissions, id)
            .await
            .unwrap()
            .expect("commission row");
        serde_json::from_value(row).unwrap()
    }

    pub async fn movements_for(&self, article_id: Uuid) -> Vec<StockMovement> {
        let filter = RowFilter::new().eq("article_id", json!(article_id));
        let rows = self
            .store
            .list(StoreEntity::StockMovements, &filter)
            .await
            .unwrap();
        rows.into_iter()
            .map(|row| serde_json::from_value(row).unwrap())
            .collect()
    }

    pub async fn history_of(&self, commission_id: Uuid) -> Vec<CommissionEvent> {
        self.aggregator
            .fetch_commission_history(commission_id)
            .await
            .expect("history fetch")
    }
}
