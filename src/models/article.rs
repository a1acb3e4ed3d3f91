use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Inventory item with a quantity on hand, scoped to a warehouse.
///
/// Referenced (not owned) by commission items; deleting an article orphans
/// the reference rather than cascading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub warehouse_id: Uuid,
    pub name: String,
    pub ean: Option<String>,
    pub sku: Option<String>,
    pub supplier_sku: Option<String>,
    pub stock: i64,
    /// Shelf code in `category::location` form, e.g. `tools::A3`.
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Types of stock movements recorded in the ledger.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StockMovementKind {
    Pick,
    Correction,
    Restock,
}

/// Append-only ledger entry of a signed quantity change against an article.
/// Never mutated or deleted by the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    pub article_id: Uuid,
    pub amount: i64,
    pub kind: StockMovementKind,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    pub fn pick(article_id: Uuid, amount: i64, reference: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            article_id,
            amount: -amount,
            kind: StockMovementKind::Pick,
            reference,
            created_at: now,
        }
    }
}
