//! Realtime reconciler: folds server-pushed change events into cache state.
//!
//! Two granularities, per scope: any commission or item change within the
//! warehouse coarsely invalidates the list and count caches (list composition
//! is non-trivial to replicate from a single row delta, so correctness wins
//! over efficiency), while an open detail view gets its single commission
//! replaced wholesale and its items refetched in a targeted way.
//!
//! Subscriptions are explicit resources: acquiring a watch spawns the pump
//! task, dropping the returned guard releases it. Missed events while
//! unsubscribed are not replayed; staleness-based refetch is the recovery
//! path after a gap.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{QueryCache, QueryKey};
use crate::models::Commission;
use crate::services::commissions::decode;
use crate::store::{ChangeKind, RemoteStore, RowFilter, StoreEntity};

/// Owns a pump task; dropping the guard tears the subscription down.
pub struct ScopeGuard {
    handle: JoinHandle<()>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Live view of a single open commission, fed by the detail-scope
/// subscription.
pub struct DetailWatch {
    rx: watch::Receiver<Option<Commission>>,
    _guard: ScopeGuard,
}

impl DetailWatch {
    /// The freshest known state; `None` once the commission was deleted
    /// remotely.
    pub fn current(&self) -> Option<Commission> {
        self.rx.borrow().clone()
    }

    /// Completes when the detail state changes.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.rx.changed().await
    }
}

pub struct RealtimeReconciler {
    store: Arc<dyn RemoteStore>,
    cache: QueryCache,
    warehouse_id: Uuid,
}

impl RealtimeReconciler {
    pub fn new(store: Arc<dyn RemoteStore>, cache: QueryCache, warehouse_id: Uuid) -> Self {
        Self {
            store,
            cache,
            warehouse_id,
        }
    }

    /// List-scope subscription: any commission or item change in the
    /// warehouse marks the list and count caches stale.
    pub fn watch_lists(&self) -> ScopeGuard {
        let mut commissions = self.store.subscribe(
            StoreEntity::Commissions,
            RowFilter::new().eq("warehouse_id", json!(self.warehouse_id)),
        );
        // Items carry no warehouse column; over-invalidating on foreign item
        // events is acceptable for a stale marker.
        let mut items = self
            .store
            .subscribe(StoreEntity::CommissionItems, RowFilter::new());

        let cache = self.cache.clone();
        let warehouse_id = self.warehouse_id;
        let handle = tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    event = commissions.recv() => event,
                    event = items.recv() => event,
                };
                match received {
                    Ok(event) => {
                        debug!(kind = ?event.kind, entity = %event.entity, "list scope event");
                        cache.invalidate_matching(|key| key.is_commission_scope(warehouse_id));
                    }
                    Err(RecvError::Lagged(missed)) => {
                        // Dropped events are fine: the stale marker is
                        // idempotent and the refetch is authoritative.
                        warn!(missed, "list subscription lagged, invalidating");
                        cache.invalidate_matching(|key| key.is_commission_scope(warehouse_id));
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        ScopeGuard { handle }
    }

    /// Detail-scope subscription for one open commission: updates to the row
    /// replace the in-memory object wholesale (last-write-wins on the row's
    /// own `updated_at`), item changes trigger a targeted item refetch.
    pub fn watch_detail(&self, initial: Commission) -> DetailWatch {
        let commission_id = initial.id;
        let mut commission_events = self.store.subscribe(
            StoreEntity::Commissions,
            RowFilter::new().eq("id", json!(commission_id)),
        );
        let mut item_events = self.store.subscribe(
            StoreEntity::CommissionItems,
            RowFilter::new().eq("commission_id", json!(commission_id)),
        );

        let (tx, rx) = watch::channel(Some(initial));
        let cache = self.cache.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = commission_events.recv() => match event {
                        Ok(event) if event.kind == ChangeKind::Deleted => {
                            let _ = tx.send(None);
                        }
                        Ok(event) => match decode::<Commission>(&event.row) {
                            Ok(fresh) => {
                                let newer = tx
                                    .borrow()
                                    .as_ref()
                                    .map(|current| fresh.updated_at >= current.updated_at)
                                    .unwrap_or(true);
                                if newer {
                                    let _ = tx.send(Some(fresh));
                                }
                            }
                            Err(e) => warn!(error = %e, "undecodable detail event"),
                        },
                        Err(RecvError::Lagged(_)) => {
                            // Wholesale replacement state may be stale now;
                            // the items path below covers cache freshness.
                            cache.invalidate(&QueryKey::CommissionItems { commission_id });
                        }
                        Err(RecvError::Closed) => break,
                    },
                    event = item_events.recv() => match event {
                        Ok(_) | Err(RecvError::Lagged(_)) => {
                            cache.invalidate(&QueryKey::CommissionItems { commission_id });
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });

        DetailWatch {
            rx,
            _guard: ScopeGuard { handle },
        }
    }
}
