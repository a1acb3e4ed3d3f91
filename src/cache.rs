//! Keyed stale-while-revalidate query cache.
//!
//! Cached data is served immediately even when stale while a background
//! refetch runs; switching scope never blanks a previously-loaded view, and a
//! failed refetch retains the last good data alongside an error flag.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::future::BoxFuture;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::errors::StoreError;
use crate::models::CommissionTab;
use crate::store::JsonRow;

/// Composite cache key: entity kind plus scope discriminators.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    CommissionList {
        tab: CommissionTab,
        warehouse_id: Uuid,
    },
    MissingCount {
        warehouse_id: Uuid,
    },
    ReturnsCount {
        warehouse_id: Uuid,
    },
    Suppliers {
        warehouse_id: Uuid,
    },
    CommissionHistory,
    PrintHistory,
    CommissionItems {
        commission_id: Uuid,
    },
}

/// Staleness classes with their own refetch thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StalenessClass {
    List,
    Count,
    Reference,
}

impl QueryKey {
    pub fn class(&self) -> StalenessClass {
        match self {
            QueryKey::CommissionList { .. }
            | QueryKey::CommissionItems { .. }
            | QueryKey::CommissionHistory
            | QueryKey::PrintHistory => StalenessClass::List,
            QueryKey::MissingCount { .. } | QueryKey::ReturnsCount { .. } => StalenessClass::Count,
            QueryKey::Suppliers { .. } => StalenessClass::Reference,
        }
    }

    /// Whether this key belongs to the commission list/count surface of the
    /// given warehouse; the reconciler invalidates these coarsely.
    pub fn is_commission_scope(&self, warehouse: Uuid) -> bool {
        match self {
            QueryKey::CommissionList { warehouse_id, .. }
            | QueryKey::MissingCount { warehouse_id }
            | QueryKey::ReturnsCount { warehouse_id } => *warehouse_id == warehouse,
            _ => false,
        }
    }
}

/// What a slot holds: materialized rows or a head-only count.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Rows(Vec<JsonRow>),
    Count(u64),
}

/// Snapshot of a cache slot as served to callers.
#[derive(Debug, Clone, Default)]
pub struct CacheSlot {
    pub data: Option<CachedValue>,
    pub fetched_at: Option<Instant>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl CacheSlot {
    pub fn rows(&self) -> &[JsonRow] {
        match &self.data {
            Some(CachedValue::Rows(rows)) => rows,
            _ => &[],
        }
    }

    pub fn count(&self) -> u64 {
        match self.data {
            Some(CachedValue::Count(n)) => n,
            _ => 0,
        }
    }
}

pub type Fetcher = BoxFuture<'static, Result<CachedValue, StoreError>>;

struct Inner {
    slots: DashMap<QueryKey, CacheSlot>,
    list_window: Duration,
    count_window: Duration,
    reference_window: Duration,
}

#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl QueryCache {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: DashMap::new(),
                list_window: Duration::from_secs(config.list_staleness_secs),
                count_window: Duration::from_secs(config.count_staleness_secs),
                reference_window: Duration::from_secs(config.reference_staleness_secs),
            }),
        }
    }

    fn window(&self, class: StalenessClass) -> Duration {
        match class {
            StalenessClass::List => self.inner.list_window,
            StalenessClass::Count => self.inner.count_window,
            StalenessClass::Reference => self.inner.reference_window,
        }
    }

    fn slot_is_stale(&self, slot: &CacheSlot, class: StalenessClass) -> bool {
        match slot.fetched_at {
            Some(at) => at.elapsed() > self.window(class),
            None => true,
        }
    }

    pub fn get(&self, key: &QueryKey) -> Option<CacheSlot> {
        self.inner.slots.get(key).map(|slot| slot.clone())
    }

    /// Marks a slot stale without dropping its data; the next read triggers a
    /// refetch while the previous data keeps rendering.
    pub fn invalidate(&self, key: &QueryKey) {
        if let Some(mut slot) = self.inner.slots.get_mut(key) {
            slot.fetched_at = None;
        }
    }

    pub fn invalidate_matching(&self, predicate: impl Fn(&QueryKey) -> bool) {
        for mut entry in self.inner.slots.iter_mut() {
            if predicate(entry.key()) {
                entry.value_mut().fetched_at = None;
            }
        }
    }

    /// Optimistic local overwrite. Does not touch `fetched_at`, so an
    /// in-flight or future refetch still lands and reconciles the slot.
    pub fn set_data(&self, key: QueryKey, value: CachedValue) {
        let mut slot = self.inner.slots.entry(key).or_default();
        slot.data = Some(value);
    }

    /// Serves the slot under stale-while-revalidate policy.
    ///
    /// A cold slot awaits the fetch inline; a stale slot returns its previous
    /// data immediately and revalidates in the background. Concurrent reads
    /// of a slot that is already loading do not issue a second fetch.
    pub async fn resolve(&self, key: QueryKey, fetcher: Fetcher) -> CacheSlot {
        enum Action {
            Serve,
            FetchInline,
            RevalidateInBackground,
        }

        let (snapshot, action) = {
            let mut slot = self.inner.slots.entry(key.clone()).or_default();
            let action = if slot.is_loading {
                Action::Serve
            } else if slot.data.is_some() && !self.slot_is_stale(&slot, key.class()) {
                Action::Serve
            } else {
                slot.is_loading = true;
                if slot.data.is_none() {
                    Action::FetchInline
                } else {
                    Action::RevalidateInBackground
                }
            };
            (slot.clone(), action)
        };

        match action {
            Action::Serve => snapshot,
            Action::FetchInline => {
                let result = fetcher.await;
                self.apply(&key, result);
                self.get(&key).unwrap_or_default()
            }
            Action::RevalidateInBackground => {
                let cache = self.clone();
                tokio::spawn(async move {
                    let result = fetcher.await;
                    cache.apply(&key, result);
                });
                snapshot
            }
        }
    }

    /// Forces an immediate inline refetch, bypassing staleness.
    pub async fn refresh(&self, key: QueryKey, fetcher: Fetcher) -> CacheSlot {
        {
            let mut slot = self.inner.slots.entry(key.clone()).or_default();
            slot.is_loading = true;
        }
        let result = fetcher.await;
        self.apply(&key, result);
        self.get(&key).unwrap_or_default()
    }

    fn apply(&self, key: &QueryKey, result: Result<CachedValue, StoreError>) {
        let mut slot = self.inner.slots.entry(key.clone()).or_default();
        slot.is_loading = false;
        match result {
            Ok(value) => {
                slot.data = Some(value);
                slot.fetched_at = Some(Instant::now());
                slot.error = None;
                debug!(?key, "cache slot refreshed");
            }
            Err(err) => {
                // Last good data stays in place; only the flag changes.
                slot.error = Some(err.to_string());
                warn!(?key, error = %err, "refetch failed, serving last good data");
            }
        }
    }
}
