use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Action tag on an audit log entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventAction {
    Created,
    Updated,
    StatusChange,
    Deleted,
    Restored,
    Purged,
    LabelsPrinted,
    Scanned,
}

/// Append-only audit log entry for a commission.
///
/// The commission name is denormalized so the entry stays meaningful even if
/// the commission is later renamed or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionEvent {
    pub id: Uuid,
    pub commission_id: Uuid,
    pub commission_name: String,
    pub actor: String,
    pub action: EventAction,
    pub details: String,
    pub created_at: DateTime<Utc>,
}
