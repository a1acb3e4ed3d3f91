//! Remote store gateway: row-level CRUD, filtered reads and per-entity
//! change subscriptions over the hosted backend.
//!
//! No ordering is guaranteed between a write's response and the change event
//! the same write produces on a subscription. Consumers treat both as
//! independent, idempotent update paths to the same cache entry.

use async_trait::async_trait;
use serde_json::Value;
use strum::{Display, EnumIter, EnumString};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::errors::StoreError;

pub mod memory;
pub mod rest;

pub use memory::MemoryStore;
pub use rest::RestStore;

/// Rows travel through the gateway as plain JSON objects.
pub type JsonRow = Value;

/// Entity kinds the gateway can address; the display form is the table name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum StoreEntity {
    Commissions,
    CommissionItems,
    Articles,
    StockMovements,
    CommissionEvents,
    Suppliers,
}

#[derive(Debug, Clone)]
enum Condition {
    Eq(Value),
    In(Vec<Value>),
    IsNull,
    NotNull,
}

/// A conjunction of per-field conditions, renderable both as an in-memory
/// predicate and as a REST query string.
#[derive(Debug, Clone, Default)]
pub struct RowFilter {
    conditions: Vec<(String, Condition)>,
}

impl RowFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: Value) -> Self {
        self.conditions.push((field.to_string(), Condition::Eq(value)));
        self
    }

    pub fn is_in(mut self, field: &str, values: Vec<Value>) -> Self {
        self.conditions
            .push((field.to_string(), Condition::In(values)));
        self
    }

    pub fn is_null(mut self, field: &str) -> Self {
        self.conditions.push((field.to_string(), Condition::IsNull));
        self
    }

    pub fn not_null(mut self, field: &str) -> Self {
        self.conditions.push((field.to_string(), Condition::NotNull));
        self
    }

    /// Evaluates the filter against a row. Absent fields count as null.
    pub fn matches(&self, row: &JsonRow) -> bool {
        self.conditions.iter().all(|(field, cond)| {
            let value = row.get(field).unwrap_or(&Value::Null);
            match cond {
                Condition::Eq(expected) => value == expected,
                Condition::In(set) => set.contains(value),
                Condition::IsNull => value.is_null(),
                Condition::NotNull => !value.is_null(),
            }
        })
    }

    /// Renders the filter as PostgREST-style query pairs.
    pub fn to_query(&self) -> Vec<(String, String)> {
        self.conditions
            .iter()
            .map(|(field, cond)| {
                let rendered = match cond {
                    Condition::Eq(v) => format!("eq.{}", scalar(v)),
                    Condition::In(vs) => {
                        let joined: Vec<String> = vs.iter().map(scalar).collect();
                        format!("in.({})", joined.join(","))
                    }
                    Condition::IsNull => "is.null".to_string(),
                    Condition::NotNull => "not.is.null".to_string(),
                };
                (field.clone(), rendered)
            })
            .collect()
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

/// A push-style change notification for a single row.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub entity: StoreEntity,
    pub row: JsonRow,
}

/// A subscription to an entity's change feed, narrowed by a row filter.
///
/// The filter is applied on receipt, so a lagging consumer only skips rows it
/// never wanted. Dropping the stream releases the subscription.
pub struct ChangeStream {
    rx: broadcast::Receiver<ChangeEvent>,
    filter: RowFilter,
}

impl ChangeStream {
    pub fn new(rx: broadcast::Receiver<ChangeEvent>, filter: RowFilter) -> Self {
        Self { rx, filter }
    }

    /// Receives the next event matching the filter.
    pub async fn recv(&mut self) -> Result<ChangeEvent, broadcast::error::RecvError> {
        loop {
            let event = self.rx.recv().await?;
            if self.filter.matches(&event.row) {
                return Ok(event);
            }
        }
    }
}

/// Extracts the `id` column of a row.
pub fn row_id(row: &JsonRow) -> Result<Uuid, StoreError> {
    row.get("id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| StoreError::MalformedRow(format!("row without usable id: {row}")))
}

/// Abstract row store with change subscriptions.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list(
        &self,
        entity: StoreEntity,
        filter: &RowFilter,
    ) -> Result<Vec<JsonRow>, StoreError>;

    /// Head-only count; never materializes rows.
    async fn count(&self, entity: StoreEntity, filter: &RowFilter) -> Result<u64, StoreError>;

    async fn insert(&self, entity: StoreEntity, row: JsonRow) -> Result<JsonRow, StoreError>;

    /// Shallow-merges `patch` into the row; explicit nulls clear fields.
    async fn update(
        &self,
        entity: StoreEntity,
        id: Uuid,
        patch: JsonRow,
    ) -> Result<JsonRow, StoreError>;

    async fn delete(&self, entity: StoreEntity, id: Uuid) -> Result<(), StoreError>;

    /// Opens a change subscription narrowed by `filter`.
    fn subscribe(&self, entity: StoreEntity, filter: RowFilter) -> ChangeStream;

    /// Fetches a single row by id.
    async fn get(&self, entity: StoreEntity, id: Uuid) -> Result<Option<JsonRow>, StoreError> {
        let filter = RowFilter::new().eq("id", Value::String(id.to_string()));
        let rows = self.list(entity, &filter).await?;
        Ok(rows.into_iter().next())
    }
}
