use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Whether a line is fulfilled from warehouse stock or ordered externally.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemKind {
    Stock,
    External,
}

/// One line of material belonging to exactly one commission.
///
/// Exactly one of `article_id` / `custom_name` is meaningful, keyed by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionItem {
    pub id: Uuid,
    pub commission_id: Uuid,
    pub kind: ItemKind,
    pub amount: i64,
    pub article_id: Option<Uuid>,
    pub custom_name: Option<String>,
    pub external_reference: Option<String>,
    pub attachment: Option<String>,
    pub is_backorder: bool,
    pub is_picked: bool,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl CommissionItem {
    /// Backorders are excluded from the readiness computation and also cannot
    /// be picked by direct user action.
    pub fn can_be_picked(&self) -> bool {
        !self.is_backorder
    }

    /// Display name: article reference for stock lines, free text otherwise.
    pub fn is_stock(&self) -> bool {
        self.kind == ItemKind::Stock
    }
}
