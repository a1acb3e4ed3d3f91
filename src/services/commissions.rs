//! Commission data aggregator: composes cached reads for commissions,
//! suppliers, items and history, and exposes the imperative mutators that
//! perform remote writes and reconcile cache state afterwards.

use std::sync::Arc;

use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::cache::{CachedValue, QueryCache, QueryKey};
use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::errors::{ServiceError, StoreError};
use crate::events::{DomainEvent, EventSender};
use crate::models::{
    Commission, CommissionEvent, CommissionItem, CommissionStatus, CommissionTab, EventAction,
    ItemKind, Supplier,
};
use crate::store::{JsonRow, RemoteStore, RowFilter, StoreEntity};

/// Payload for creating or saving a commission header.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CommissionDraft {
    #[validate(length(min = 1, max = 120, message = "Name must be between 1 and 120 characters"))]
    pub name: String,
    pub order_number: Option<String>,
    #[serde(default)]
    pub notes: String,
    pub supplier_id: Option<Uuid>,
    #[serde(default)]
    pub needs_label: bool,
}

/// Payload for one item line on edit-save.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ItemDraft {
    pub kind: ItemKind,
    #[validate(range(min = 1, message = "Amount must be positive"))]
    pub amount: i64,
    pub article_id: Option<Uuid>,
    pub custom_name: Option<String>,
    pub external_reference: Option<String>,
    pub attachment: Option<String>,
    #[serde(default)]
    pub is_backorder: bool,
    #[serde(default)]
    pub notes: String,
}

impl ItemDraft {
    /// Exactly one of article reference / custom name is meaningful, keyed
    /// by the item kind.
    fn check_kind(&self) -> Result<(), ServiceError> {
        match self.kind {
            ItemKind::Stock if self.article_id.is_none() => Err(ServiceError::ValidationError(
                "Stock items require an article reference".to_string(),
            )),
            ItemKind::External if self.custom_name.as_deref().unwrap_or("").is_empty() => {
                Err(ServiceError::ValidationError(
                    "External items require a custom name".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// In-place edit of a single item during detail-view interaction.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    pub is_picked: Option<bool>,
    pub is_backorder: Option<bool>,
    pub notes: Option<String>,
}

/// Outcome of an item edit; picking a backorder line is blocked as a no-op.
#[derive(Debug, Clone)]
pub enum ItemEditOutcome {
    Updated(CommissionItem),
    Blocked,
}

/// A tab's commission list together with its loading and error flags.
///
/// A transient fetch failure keeps the last good rows and sets `error`; the
/// caller presents the retry affordance.
#[derive(Debug, Clone, Default)]
pub struct CommissionList {
    pub commissions: Vec<Commission>,
    pub is_loading: bool,
    pub error: Option<String>,
}

/// Lightweight badge counts, fetched head-only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TabCounts {
    pub missing: u64,
    pub returns: u64,
}

pub(crate) fn decode<T: DeserializeOwned>(row: &JsonRow) -> Result<T, ServiceError> {
    serde_json::from_value(row.clone())
        .map_err(|e| ServiceError::StoreError(StoreError::MalformedRow(e.to_string())))
}

pub(crate) fn decode_all<T: DeserializeOwned>(rows: &[JsonRow]) -> Vec<T> {
    rows.iter()
        .filter_map(|row| match serde_json::from_value(row.clone()) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "skipping malformed row");
                None
            }
        })
        .collect()
}

/// The aggregator. Scope (warehouse) and actor arrive as constructor
/// parameters rather than ambient globals so the core stays testable.
#[derive(Clone)]
pub struct CommissionAggregator {
    store: Arc<dyn RemoteStore>,
    cache: QueryCache,
    events: EventSender,
    clock: Arc<dyn Clock>,
    actor: String,
    warehouse_id: Uuid,
    retention: Duration,
}

impl CommissionAggregator {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        cache: QueryCache,
        events: EventSender,
        clock: Arc<dyn Clock>,
        actor: impl Into<String>,
        warehouse_id: Uuid,
        config: &SyncConfig,
    ) -> Self {
        Self {
            store,
            cache,
            events,
            clock,
            actor: actor.into(),
            warehouse_id,
            retention: Duration::days(config.trash_retention_days),
        }
    }

    pub fn warehouse_id(&self) -> Uuid {
        self.warehouse_id
    }

    /// Server-side filter narrowing a tab's list query.
    fn list_filter(&self, tab: CommissionTab) -> RowFilter {
        let base = RowFilter::new().eq("warehouse_id", json!(self.warehouse_id));
        match tab {
            CommissionTab::Trash => base.not_null("deleted_at"),
            CommissionTab::Missing => {
                let statuses = tab
                    .status_set()
                    .unwrap_or_default()
                    .iter()
                    .map(|s| json!(s))
                    .collect();
                base.is_null("deleted_at").is_in("status", statuses)
            }
            _ => base.is_null("deleted_at"),
        }
    }

    fn list_fetcher(&self, tab: CommissionTab) -> crate::cache::Fetcher {
        let store = self.store.clone();
        let filter = self.list_filter(tab);
        Box::pin(async move {
            store
                .list(StoreEntity::Commissions, &filter)
                .await
                .map(CachedValue::Rows)
        })
    }

    fn assemble_list(&self, tab: CommissionTab, slot: crate::cache::CacheSlot) -> CommissionList {
        let now = self.clock.now();
        let mut commissions: Vec<Commission> = decode_all(slot.rows())
            .into_iter()
            .filter(|c| tab.client_matches(c, now, self.retention))
            .collect();
        commissions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        CommissionList {
            commissions,
            is_loading: slot.is_loading,
            error: slot.error,
        }
    }

    /// The filtered, server-and-client-combined list for a tab.
    pub async fn commissions(&self, tab: CommissionTab) -> CommissionList {
        let key = QueryKey::CommissionList {
            tab,
            warehouse_id: self.warehouse_id,
        };
        let slot = self.cache.resolve(key, self.list_fetcher(tab)).await;
        self.assemble_list(tab, slot)
    }

    /// Forces an immediate refetch of a tab's list, bypassing staleness.
    pub async fn refresh_commissions(&self, tab: CommissionTab) -> CommissionList {
        let key = QueryKey::CommissionList {
            tab,
            warehouse_id: self.warehouse_id,
        };
        let slot = self.cache.refresh(key, self.list_fetcher(tab)).await;
        self.assemble_list(tab, slot)
    }

    /// Badge counts, fetched as head-only counts on a short staleness window.
    pub async fn tab_counts(&self) -> TabCounts {
        let missing_filter = self.list_filter(CommissionTab::Missing);
        let returns_filter = RowFilter::new()
            .eq("warehouse_id", json!(self.warehouse_id))
            .is_null("deleted_at")
            .is_in(
                "status",
                vec![
                    json!(CommissionStatus::ReturnPending),
                    json!(CommissionStatus::ReturnReady),
                ],
            );

        let store = self.store.clone();
        let missing_slot = self
            .cache
            .resolve(
                QueryKey::MissingCount {
                    warehouse_id: self.warehouse_id,
                },
                Box::pin(async move {
                    store
                        .count(StoreEntity::Commissions, &missing_filter)
                        .await
                        .map(CachedValue::Count)
                }),
            )
            .await;

        let store = self.store.clone();
        let returns_slot = self
            .cache
            .resolve(
                QueryKey::ReturnsCount {
                    warehouse_id: self.warehouse_id,
                },
                Box::pin(async move {
                    store
                        .count(StoreEntity::Commissions, &returns_filter)
                        .await
                        .map(CachedValue::Count)
                }),
            )
            .await;

        TabCounts {
            missing: missing_slot.count(),
            returns: returns_slot.count(),
        }
    }

    /// Supplier reference list ordered by usage frequency (descending
    /// commission count), tie-broken alphabetically, to bias quick-pick UI
    /// toward commonly used suppliers.
    pub async fn suppliers(&self) -> Vec<Supplier> {
        let store = self.store.clone();
        let commission_filter = RowFilter::new()
            .eq("warehouse_id", json!(self.warehouse_id))
            .is_null("deleted_at");
        let slot = self
            .cache
            .resolve(
                QueryKey::Suppliers {
                    warehouse_id: self.warehouse_id,
                },
                Box::pin(async move {
                    let suppliers = store.list(StoreEntity::Suppliers, &RowFilter::new()).await?;
                    let commissions = store
                        .list(StoreEntity::Commissions, &commission_filter)
                        .await?;

                    let usage = |supplier: &JsonRow| -> usize {
                        let id = supplier.get("id").cloned().unwrap_or(Value::Null);
                        commissions
                            .iter()
                            .filter(|c| c.get("supplier_id") == Some(&id))
                            .count()
                    };
                    let name = |supplier: &JsonRow| -> String {
                        supplier
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string()
                    };

                    let mut ordered = suppliers;
                    ordered.sort_by(|a, b| {
                        usage(b).cmp(&usage(a)).then_with(|| name(a).cmp(&name(b)))
                    });
                    Ok(CachedValue::Rows(ordered))
                }),
            )
            .await;
        decode_all(slot.rows())
    }

    /// On-demand detail fetch of a commission's items; not part of the list
    /// query to avoid N+1 fan-out against the backing store.
    #[instrument(skip(self), fields(commission_id = %commission_id))]
    pub async fn fetch_commission_items(
        &self,
        commission_id: Uuid,
    ) -> Result<Vec<CommissionItem>, ServiceError> {
        let store = self.store.clone();
        let filter = RowFilter::new().eq("commission_id", json!(commission_id));
        let slot = self
            .cache
            .resolve(
                QueryKey::CommissionItems { commission_id },
                Box::pin(async move {
                    store
                        .list(StoreEntity::CommissionItems, &filter)
                        .await
                        .map(CachedValue::Rows)
                }),
            )
            .await;

        if slot.data.is_none() {
            if let Some(message) = &slot.error {
                return Err(ServiceError::StoreError(StoreError::Transport(
                    message.clone(),
                )));
            }
        }
        let mut items: Vec<CommissionItem> = decode_all(slot.rows());
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(items)
    }

    /// Audit trail of a single commission, newest first.
    pub async fn fetch_commission_history(
        &self,
        commission_id: Uuid,
    ) -> Result<Vec<CommissionEvent>, ServiceError> {
        let filter = RowFilter::new().eq("commission_id", json!(commission_id));
        let rows = self.store.list(StoreEntity::CommissionEvents, &filter).await?;
        let mut events: Vec<CommissionEvent> = decode_all(&rows);
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(events)
    }

    /// Global audit history, newest first.
    pub async fn commission_history(&self) -> Result<Vec<CommissionEvent>, ServiceError> {
        let store = self.store.clone();
        let slot = self
            .cache
            .resolve(
                QueryKey::CommissionHistory,
                Box::pin(async move {
                    store
                        .list(StoreEntity::CommissionEvents, &RowFilter::new())
                        .await
                        .map(CachedValue::Rows)
                }),
            )
            .await;
        let mut events: Vec<CommissionEvent> = decode_all(slot.rows());
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(events)
    }

    /// History of label print runs, newest first.
    pub async fn print_history(&self) -> Result<Vec<CommissionEvent>, ServiceError> {
        let store = self.store.clone();
        let filter = RowFilter::new().eq("action", json!(EventAction::LabelsPrinted));
        let slot = self
            .cache
            .resolve(
                QueryKey::PrintHistory,
                Box::pin(async move {
                    store
                        .list(StoreEntity::CommissionEvents, &filter)
                        .await
                        .map(CachedValue::Rows)
                }),
            )
            .await;
        let mut events: Vec<CommissionEvent> = decode_all(slot.rows());
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(events)
    }

    /// Appends an audit row and invalidates the history caches.
    #[instrument(skip(self, details), fields(commission_id = %commission_id, action = %action))]
    pub async fn log_commission_event(
        &self,
        commission_id: Uuid,
        commission_name: &str,
        action: EventAction,
        details: impl Into<String>,
    ) -> Result<CommissionEvent, ServiceError> {
        let event = CommissionEvent {
            id: Uuid::new_v4(),
            commission_id,
            commission_name: commission_name.to_string(),
            actor: self.actor.clone(),
            action,
            details: details.into(),
            created_at: self.clock.now(),
        };
        self.store
            .insert(StoreEntity::CommissionEvents, serde_json::to_value(&event)?)
            .await?;
        self.cache.invalidate(&QueryKey::CommissionHistory);
        self.cache.invalidate(&QueryKey::PrintHistory);
        Ok(event)
    }

    /// Marks every commission list and count cache of this warehouse stale.
    pub fn invalidate_commission_caches(&self) {
        let warehouse_id = self.warehouse_id;
        self.cache
            .invalidate_matching(|key| key.is_commission_scope(warehouse_id));
    }

    pub(crate) async fn commission_or_not_found(
        &self,
        id: Uuid,
    ) -> Result<Commission, ServiceError> {
        let row = self
            .store
            .get(StoreEntity::Commissions, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Commission {id} not found")))?;
        decode(&row)
    }

    async fn announce(&self, event: DomainEvent) {
        if let Err(e) = self.events.send(event).await {
            warn!(error = %e, "failed to send domain event");
        }
    }

    /// Creates a commission in Draft status.
    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create_commission(
        &self,
        draft: CommissionDraft,
    ) -> Result<Commission, ServiceError> {
        draft
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let now = self.clock.now();
        let commission = Commission {
            id: Uuid::new_v4(),
            name: draft.name,
            order_number: draft.order_number,
            notes: draft.notes,
            status: CommissionStatus::Draft,
            warehouse_id: self.warehouse_id,
            supplier_id: draft.supplier_id,
            needs_label: draft.needs_label,
            withdrawn_at: None,
            deleted_at: None,
            last_scanned_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store
            .insert(StoreEntity::Commissions, serde_json::to_value(&commission)?)
            .await?;

        self.log_commission_event(commission.id, &commission.name, EventAction::Created, "")
            .await?;
        self.announce(DomainEvent::CommissionCreated(commission.id)).await;
        self.invalidate_commission_caches();

        info!(commission_id = %commission.id, "commission created");
        Ok(commission)
    }

    /// Saves a commission from the edit form: header update plus wholesale
    /// item replacement (delete all, then insert the submitted set). The
    /// observable outcome is that the final item set matches the submitted
    /// set exactly.
    #[instrument(skip(self, draft, items), fields(commission_id = %id, item_count = items.len()))]
    pub async fn save_commission(
        &self,
        id: Uuid,
        draft: CommissionDraft,
        items: Vec<ItemDraft>,
    ) -> Result<Commission, ServiceError> {
        draft
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        for item in &items {
            item.validate()
                .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
            item.check_kind()?;
        }

        let existing = self.commission_or_not_found(id).await?;
        let now = self.clock.now();

        let patch = json!({
            "name": draft.name,
            "order_number": draft.order_number,
            "notes": draft.notes,
            "supplier_id": draft.supplier_id,
            "needs_label": draft.needs_label,
            "updated_at": now,
        });
        let updated_row = self.store.update(StoreEntity::Commissions, id, patch).await?;
        let updated: Commission = decode(&updated_row)?;

        let item_filter = RowFilter::new().eq("commission_id", json!(id));
        let old_items = self
            .store
            .list(StoreEntity::CommissionItems, &item_filter)
            .await?;
        for row in &old_items {
            let item_id = crate::store::row_id(row)?;
            self.store.delete(StoreEntity::CommissionItems, item_id).await?;
        }

        let count = items.len();
        let mut inserted_rows = Vec::with_capacity(count);
        for draft_item in items {
            let item = CommissionItem {
                id: Uuid::new_v4(),
                commission_id: id,
                kind: draft_item.kind,
                amount: draft_item.amount,
                article_id: draft_item.article_id,
                custom_name: draft_item.custom_name,
                external_reference: draft_item.external_reference,
                attachment: draft_item.attachment,
                is_backorder: draft_item.is_backorder,
                is_picked: false,
                notes: draft_item.notes,
                created_at: self.clock.now(),
            };
            let row = self
                .store
                .insert(StoreEntity::CommissionItems, serde_json::to_value(&item)?)
                .await?;
            inserted_rows.push(row);
        }

        self.log_commission_event(id, &existing.name, EventAction::Updated, "")
            .await?;
        self.announce(DomainEvent::ItemsReplaced {
            commission_id: id,
            count,
        })
        .await;
        self.announce(DomainEvent::CommissionUpdated(id)).await;

        // The inserted rows are server truth; overwrite the item cache so the
        // detail view reflects the save immediately. The slot stays stale, so
        // the next refetch still reconciles.
        self.cache.set_data(
            QueryKey::CommissionItems { commission_id: id },
            CachedValue::Rows(inserted_rows),
        );
        self.cache.invalidate(&QueryKey::CommissionItems { commission_id: id });
        self.invalidate_commission_caches();
        Ok(updated)
    }

    /// In-place item edit from the detail view. Picking a backorder line is
    /// blocked as a no-op; picking the first item of a Draft commission
    /// auto-advances it to Preparing.
    #[instrument(skip(self, patch), fields(item_id = %item_id))]
    pub async fn update_item(
        &self,
        item_id: Uuid,
        patch: ItemPatch,
    ) -> Result<ItemEditOutcome, ServiceError> {
        let row = self
            .store
            .get(StoreEntity::CommissionItems, item_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Item {item_id} not found")))?;
        let item: CommissionItem = decode(&row)?;

        if patch.is_picked == Some(true) && !item.can_be_picked() {
            info!(item_id = %item_id, "pick blocked on backorder item");
            return Ok(ItemEditOutcome::Blocked);
        }

        let mut fields = serde_json::Map::new();
        if let Some(picked) = patch.is_picked {
            fields.insert("is_picked".to_string(), json!(picked));
        }
        if let Some(backorder) = patch.is_backorder {
            fields.insert("is_backorder".to_string(), json!(backorder));
        }
        if let Some(notes) = &patch.notes {
            fields.insert("notes".to_string(), json!(notes));
        }
        let updated_row = self
            .store
            .update(StoreEntity::CommissionItems, item_id, Value::Object(fields))
            .await?;
        let updated: CommissionItem = decode(&updated_row)?;

        self.announce(DomainEvent::ItemUpdated {
            commission_id: updated.commission_id,
            item_id,
        })
        .await;

        let items_key = QueryKey::CommissionItems {
            commission_id: updated.commission_id,
        };
        // Splice the confirmed row into the cached item set so the open
        // detail view updates without waiting for the refetch.
        if let Some(slot) = self.cache.get(&items_key) {
            if let Some(CachedValue::Rows(mut rows)) = slot.data {
                for row in rows.iter_mut() {
                    if crate::store::row_id(row).ok() == Some(item_id) {
                        *row = updated_row.clone();
                    }
                }
                self.cache.set_data(items_key.clone(), CachedValue::Rows(rows));
            }
        }
        self.cache.invalidate(&items_key);
        self.invalidate_commission_caches();

        // First pick on a Draft commission advances it to Preparing. This
        // lives in the item-edit path, not the explicit transition table.
        if patch.is_picked == Some(true) {
            let commission = self.commission_or_not_found(updated.commission_id).await?;
            if commission.status == CommissionStatus::Draft {
                self.advance_draft(&commission).await?;
            }
        }

        Ok(ItemEditOutcome::Updated(updated))
    }

    async fn advance_draft(&self, commission: &Commission) -> Result<(), ServiceError> {
        let patch = json!({
            "status": CommissionStatus::Preparing,
            "updated_at": self.clock.now(),
        });
        self.store
            .update(StoreEntity::Commissions, commission.id, patch)
            .await?;
        self.log_commission_event(
            commission.id,
            &commission.name,
            EventAction::StatusChange,
            format!("{} -> {}", CommissionStatus::Draft, CommissionStatus::Preparing),
        )
        .await?;
        self.announce(DomainEvent::StatusChanged {
            commission_id: commission.id,
            old_status: CommissionStatus::Draft,
            new_status: CommissionStatus::Preparing,
        })
        .await;
        self.invalidate_commission_caches();
        Ok(())
    }

    /// Soft-deletes into the trash view.
    #[instrument(skip(self), fields(commission_id = %id))]
    pub async fn soft_delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let commission = self.commission_or_not_found(id).await?;
        let now = self.clock.now();
        self.store
            .update(
                StoreEntity::Commissions,
                id,
                json!({"deleted_at": now, "updated_at": now}),
            )
            .await?;
        self.log_commission_event(id, &commission.name, EventAction::Deleted, "")
            .await?;
        self.announce(DomainEvent::CommissionDeleted(id)).await;
        self.invalidate_commission_caches();
        Ok(())
    }

    /// Restores a soft-deleted commission from the trash.
    #[instrument(skip(self), fields(commission_id = %id))]
    pub async fn restore(&self, id: Uuid) -> Result<(), ServiceError> {
        let commission = self.commission_or_not_found(id).await?;
        self.store
            .update(
                StoreEntity::Commissions,
                id,
                json!({"deleted_at": null, "updated_at": self.clock.now()}),
            )
            .await?;
        self.log_commission_event(id, &commission.name, EventAction::Restored, "")
            .await?;
        self.announce(DomainEvent::CommissionRestored(id)).await;
        self.invalidate_commission_caches();
        Ok(())
    }

    /// Permanently deletes a commission and its items. The audit rows stay;
    /// their denormalized name keeps them meaningful.
    #[instrument(skip(self), fields(commission_id = %id))]
    pub async fn purge(&self, id: Uuid) -> Result<(), ServiceError> {
        let commission = self.commission_or_not_found(id).await?;

        let item_filter = RowFilter::new().eq("commission_id", json!(id));
        let items = self
            .store
            .list(StoreEntity::CommissionItems, &item_filter)
            .await?;
        for row in &items {
            let item_id = crate::store::row_id(row)?;
            self.store.delete(StoreEntity::CommissionItems, item_id).await?;
        }
        self.store.delete(StoreEntity::Commissions, id).await?;

        self.log_commission_event(id, &commission.name, EventAction::Purged, "")
            .await?;
        self.announce(DomainEvent::CommissionPurged(id)).await;
        self.cache.invalidate(&QueryKey::CommissionItems { commission_id: id });
        self.invalidate_commission_caches();
        Ok(())
    }

    /// Best-effort scan timestamp write; degrades to a log line on failure
    /// instead of interrupting the user.
    pub async fn mark_scanned(&self, id: Uuid) {
        let patch = json!({"last_scanned_at": self.clock.now()});
        if let Err(e) = self.store.update(StoreEntity::Commissions, id, patch).await {
            error!(commission_id = %id, error = %e, "failed to record scan timestamp");
        }
    }
}
