use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;

/// Workflow status of a commission.
///
/// Happy path runs `Draft -> Preparing -> Ready -> Withdrawn`; the return
/// branch runs `Ready -> ReturnPending -> ReturnReady -> ReturnComplete`.
/// `Missing` is an inventory-audit side channel, reversible to `Preparing`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CommissionStatus {
    Draft,
    Preparing,
    Ready,
    Withdrawn,
    ReturnPending,
    ReturnReady,
    ReturnComplete,
    Missing,
}

/// Named filtered view over the commission list.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CommissionTab {
    Active,
    Returns,
    Withdrawn,
    Missing,
    Trash,
}

impl CommissionTab {
    /// Statuses the server-side filter narrows to, where the tab has one.
    /// `None` means the tab filters on deletion state only.
    pub fn status_set(&self) -> Option<&'static [CommissionStatus]> {
        match self {
            CommissionTab::Missing => Some(&[
                CommissionStatus::Ready,
                CommissionStatus::ReturnReady,
                CommissionStatus::ReturnPending,
                CommissionStatus::ReturnComplete,
                CommissionStatus::Missing,
            ]),
            _ => None,
        }
    }

    /// Client-side secondary predicate applied after the server filter.
    pub fn client_matches(
        &self,
        commission: &Commission,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> bool {
        match self {
            CommissionTab::Active => commission.deleted_at.is_none(),
            CommissionTab::Returns => {
                commission.deleted_at.is_none()
                    && matches!(
                        commission.status,
                        CommissionStatus::ReturnPending | CommissionStatus::ReturnReady
                    )
            }
            CommissionTab::Withdrawn => {
                commission.deleted_at.is_none()
                    && matches!(
                        commission.status,
                        CommissionStatus::Withdrawn | CommissionStatus::ReturnComplete
                    )
            }
            CommissionTab::Missing => {
                commission.deleted_at.is_none()
                    && self
                        .status_set()
                        .map(|set| set.contains(&commission.status))
                        .unwrap_or(true)
            }
            CommissionTab::Trash => commission
                .deleted_at
                .map(|deleted| now - deleted < retention)
                .unwrap_or(false),
        }
    }
}

/// A pick/prepare order for a set of warehouse items or external orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commission {
    pub id: Uuid,
    pub name: String,
    pub order_number: Option<String>,
    pub notes: String,
    pub status: CommissionStatus,
    pub warehouse_id: Uuid,
    pub supplier_id: Option<Uuid>,
    pub needs_label: bool,
    pub withdrawn_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub last_scanned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Commission {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Soft-deleted longer than the retention window ago; still a row in the
    /// store, but no longer shown in the trash view and eligible for purge.
    pub fn is_purge_eligible(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        self.deleted_at
            .map(|deleted| now - deleted >= retention)
            .unwrap_or(false)
    }
}
