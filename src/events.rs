//! In-process domain event bus.
//!
//! Mutators announce what happened here so surfaces such as notification
//! toasts can react; this is separate from the append-only `CommissionEvent`
//! audit rows, which live in the remote store.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::CommissionStatus;

/// Events emitted by the aggregator and workflow services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    CommissionCreated(Uuid),
    CommissionUpdated(Uuid),
    CommissionDeleted(Uuid),
    CommissionRestored(Uuid),
    CommissionPurged(Uuid),
    StatusChanged {
        commission_id: Uuid,
        old_status: CommissionStatus,
        new_status: CommissionStatus,
    },
    ItemsReplaced {
        commission_id: Uuid,
        count: usize,
    },
    ItemUpdated {
        commission_id: Uuid,
        item_id: Uuid,
    },
    StockPosted {
        article_id: Uuid,
        amount: i64,
    },
    PartialFulfillment {
        commission_id: Uuid,
        article_id: Uuid,
        requested: i64,
        available: i64,
    },
    LabelsPrinted {
        commission_ids: Vec<Uuid>,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<DomainEvent>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<DomainEvent>) -> Self {
        Self { sender }
    }

    /// Creates a connected sender/receiver pair.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<DomainEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: DomainEvent) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {e}"))
    }
}
