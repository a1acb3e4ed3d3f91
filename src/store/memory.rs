//! In-memory store used by tests and as an embedded/offline backend.

use std::collections::HashMap;

use dashmap::DashMap;
use strum::IntoEnumIterator;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{
    row_id, ChangeEvent, ChangeKind, ChangeStream, JsonRow, RemoteStore, RowFilter, StoreEntity,
};
use crate::errors::StoreError;
use async_trait::async_trait;

const FEED_CAPACITY: usize = 256;

/// DashMap-backed tables with per-entity broadcast change feeds.
pub struct MemoryStore {
    tables: HashMap<StoreEntity, DashMap<Uuid, JsonRow>>,
    feeds: HashMap<StoreEntity, broadcast::Sender<ChangeEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut tables = HashMap::new();
        let mut feeds = HashMap::new();
        for entity in StoreEntity::iter() {
            tables.insert(entity, DashMap::new());
            let (tx, _) = broadcast::channel(FEED_CAPACITY);
            feeds.insert(entity, tx);
        }
        Self { tables, feeds }
    }

    fn table(&self, entity: StoreEntity) -> &DashMap<Uuid, JsonRow> {
        // All variants are populated in `new`.
        &self.tables[&entity]
    }

    fn emit(&self, kind: ChangeKind, entity: StoreEntity, row: JsonRow) {
        // Send failures just mean nobody is subscribed.
        let _ = self.feeds[&entity].send(ChangeEvent { kind, entity, row });
    }

    /// Injects a change event without touching table state, simulating a
    /// push notification produced by another session.
    pub fn push_external_event(&self, kind: ChangeKind, entity: StoreEntity, row: JsonRow) {
        if let Ok(id) = row_id(&row) {
            if kind != ChangeKind::Deleted {
                self.table(entity).insert(id, row.clone());
            }
        }
        self.emit(kind, entity, row);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list(
        &self,
        entity: StoreEntity,
        filter: &RowFilter,
    ) -> Result<Vec<JsonRow>, StoreError> {
        let rows = self
            .table(entity)
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        Ok(rows)
    }

    async fn count(&self, entity: StoreEntity, filter: &RowFilter) -> Result<u64, StoreError> {
        let count = self
            .table(entity)
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .count();
        Ok(count as u64)
    }

    async fn insert(&self, entity: StoreEntity, row: JsonRow) -> Result<JsonRow, StoreError> {
        let id = row_id(&row)?;
        self.table(entity).insert(id, row.clone());
        self.emit(ChangeKind::Inserted, entity, row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        entity: StoreEntity,
        id: Uuid,
        patch: JsonRow,
    ) -> Result<JsonRow, StoreError> {
        let table = self.table(entity);
        let merged = {
            let mut entry = table.get_mut(&id).ok_or(StoreError::RowNotFound(id))?;
            if let (Some(row), Some(fields)) = (entry.value_mut().as_object_mut(), patch.as_object())
            {
                for (key, value) in fields {
                    row.insert(key.clone(), value.clone());
                }
            }
            entry.value().clone()
        };
        self.emit(ChangeKind::Updated, entity, merged.clone());
        Ok(merged)
    }

    async fn delete(&self, entity: StoreEntity, id: Uuid) -> Result<(), StoreError> {
        if let Some((_, row)) = self.table(entity).remove(&id) {
            self.emit(ChangeKind::Deleted, entity, row);
        }
        Ok(())
    }

    fn subscribe(&self, entity: StoreEntity, filter: RowFilter) -> ChangeStream {
        ChangeStream::new(self.feeds[&entity].subscribe(), filter)
    }

    async fn get(&self, entity: StoreEntity, id: Uuid) -> Result<Option<JsonRow>, StoreError> {
        Ok(self.table(entity).get(&id).map(|entry| entry.value().clone()))
    }
}
