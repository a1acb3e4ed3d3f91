//! Commission workflow state machine.
//!
//! The pure layer (`allowed`, `ready_guard`) defines which transitions exist
//! and when readiness holds; `WorkflowService` performs them against the
//! store, with stock postings and audit events as side effects. Every applied
//! transition performs the remote write, appends exactly one audit event
//! describing it, and marks the list caches stale. The three steps are not
//! atomic across the gateway; a partial failure leaves auditable state, never
//! a silent rollback.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use strum::{Display, EnumString};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::errors::ServiceError;
use crate::events::{DomainEvent, EventSender};
use crate::labels::{LabelJob, LabelPrinter};
use crate::models::{
    Article, Commission, CommissionItem, CommissionStatus, EventAction, StockMovement,
};
use crate::services::commissions::{decode, decode_all, CommissionAggregator};
use crate::store::{RemoteStore, RowFilter, StoreEntity};
use crate::view::ViewController;

/// Whether the state machine defines a transition between two statuses.
///
/// `Ready` and `ReturnPending` are reachable from anywhere, `Preparing` is
/// the universal reset target, and `Missing` is only reachable from the
/// active working states.
pub fn allowed(from: CommissionStatus, to: CommissionStatus) -> bool {
    use CommissionStatus::*;
    if from == to {
        return false;
    }
    match (from, to) {
        (_, Ready) => true,
        (Ready, Withdrawn) => true,
        (_, ReturnPending) => true,
        (ReturnPending, ReturnReady) => true,
        (ReturnReady, ReturnComplete) => true,
        (_, Preparing) => true,
        (Draft | Preparing | Ready, Missing) => true,
        _ => false,
    }
}

/// Readiness check: every item picked and no backorder present. Backorders
/// cannot be picked, so a single backorder line blocks readiness.
pub fn ready_guard(items: &[CommissionItem]) -> bool {
    !items.iter().any(|item| item.is_backorder) && items.iter().all(|item| item.is_picked)
}

/// How returned material should be handled; encoded into the structured
/// `ACTION:` note prepended to the commission on return request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum ReturnDisposition {
    Restock,
    SupplierReturn,
}

/// Result of invoking a transition. Guard failures reject before any write
/// is issued; the UI treats a rejection as a disabled control, not an error.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    Applied(Commission),
    Rejected(&'static str),
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}

#[derive(Clone)]
pub struct WorkflowService {
    store: Arc<dyn RemoteStore>,
    aggregator: CommissionAggregator,
    events: EventSender,
    printer: Arc<dyn LabelPrinter>,
    view: Arc<Mutex<ViewController>>,
    clock: Arc<dyn Clock>,
}

impl WorkflowService {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        aggregator: CommissionAggregator,
        events: EventSender,
        printer: Arc<dyn LabelPrinter>,
        view: Arc<Mutex<ViewController>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            aggregator,
            events,
            printer,
            view,
            clock,
        }
    }

    async fn announce(&self, event: DomainEvent) {
        if let Err(e) = self.events.send(event).await {
            warn!(error = %e, "failed to send domain event");
        }
    }

    async fn items_of(&self, commission_id: Uuid) -> Result<Vec<CommissionItem>, ServiceError> {
        let filter = RowFilter::new().eq("commission_id", json!(commission_id));
        let rows = self
            .store
            .list(StoreEntity::CommissionItems, &filter)
            .await?;
        Ok(decode_all(&rows))
    }

    /// Writes the status change plus any extra fields. On failure the list
    /// caches are invalidated so the next read restores server truth instead
    /// of trusting optimistic state.
    async fn apply_status(
        &self,
        commission: &Commission,
        new_status: CommissionStatus,
        extra: Vec<(&str, Value)>,
    ) -> Result<Commission, ServiceError> {
        let mut patch = serde_json::Map::new();
        patch.insert("status".to_string(), json!(new_status));
        patch.insert("updated_at".to_string(), json!(self.clock.now()));
        for (field, value) in extra {
            patch.insert(field.to_string(), value);
        }

        match self
            .store
            .update(StoreEntity::Commissions, commission.id, Value::Object(patch))
            .await
        {
            Ok(row) => decode(&row),
            Err(e) => {
                error!(commission_id = %commission.id, error = %e, "status write failed");
                self.aggregator.invalidate_commission_caches();
                Err(e.into())
            }
        }
    }

    /// The audit-and-refresh tail shared by every transition: exactly one
    /// audit event describing it, a domain event, and a list refresh.
    async fn finish_transition(
        &self,
        commission: &Commission,
        new_status: CommissionStatus,
    ) -> Result<(), ServiceError> {
        self.aggregator
            .log_commission_event(
                commission.id,
                &commission.name,
                EventAction::StatusChange,
                format!("{} -> {}", commission.status, new_status),
            )
            .await?;
        self.announce(DomainEvent::StatusChanged {
            commission_id: commission.id,
            old_status: commission.status,
            new_status,
        })
        .await;
        self.aggregator.invalidate_commission_caches();
        info!(
            commission_id = %commission.id,
            from = %commission.status,
            to = %new_status,
            "commission transitioned"
        );
        Ok(())
    }

    /// Marks a commission ready: decrements stock for each fulfillable stock
    /// line and posts the matching ledger entries.
    ///
    /// Items whose article lacks sufficient stock are skipped without failing
    /// the transition; partial fulfillment is an operational reality. The
    /// per-item writes run sequentially so a mid-loop failure leaves a
    /// deterministic, inspectable partial state.
    #[instrument(skip(self), fields(commission_id = %id))]
    pub async fn mark_ready(&self, id: Uuid) -> Result<TransitionOutcome, ServiceError> {
        let commission = self.aggregator.commission_or_not_found(id).await?;
        if !allowed(commission.status, CommissionStatus::Ready) {
            return Ok(TransitionOutcome::Rejected("transition not allowed"));
        }

        let items = self.items_of(id).await?;
        if !ready_guard(&items) {
            return Ok(TransitionOutcome::Rejected("unpicked or backorder items"));
        }

        for item in items.iter().filter(|item| item.is_stock()) {
            let Some(article_id) = item.article_id else {
                continue;
            };
            if let Err(e) = self.post_pick(&commission, article_id, item.amount).await {
                // Best-effort per item: the partial state stays visible and
                // auditable, and the status write still proceeds.
                error!(
                    commission_id = %id,
                    article_id = %article_id,
                    error = %e,
                    "stock posting failed, continuing"
                );
            }
        }

        let updated = self.apply_status(&commission, CommissionStatus::Ready, vec![]).await?;
        self.finish_transition(&commission, CommissionStatus::Ready).await?;
        Ok(TransitionOutcome::Applied(updated))
    }

    /// Decrements one article and appends the pick movement; skips silently
    /// when stock is insufficient. Never writes a negative stock.
    async fn post_pick(
        &self,
        commission: &Commission,
        article_id: Uuid,
        amount: i64,
    ) -> Result<(), ServiceError> {
        let Some(row) = self.store.get(StoreEntity::Articles, article_id).await? else {
            warn!(article_id = %article_id, "article vanished, skipping pick");
            return Ok(());
        };
        let article: Article = decode(&row)?;

        if article.stock < amount {
            warn!(
                article_id = %article_id,
                requested = amount,
                available = article.stock,
                "insufficient stock, item skipped"
            );
            self.announce(DomainEvent::PartialFulfillment {
                commission_id: commission.id,
                article_id,
                requested: amount,
                available: article.stock,
            })
            .await;
            return Ok(());
        }

        let now = self.clock.now();
        self.store
            .update(
                StoreEntity::Articles,
                article_id,
                json!({"stock": article.stock - amount, "updated_at": now}),
            )
            .await?;
        let movement = StockMovement::pick(article_id, amount, commission.name.clone(), now);
        self.store
            .insert(StoreEntity::StockMovements, serde_json::to_value(&movement)?)
            .await?;
        self.announce(DomainEvent::StockPosted {
            article_id,
            amount: -amount,
        })
        .await;
        Ok(())
    }

    /// Ready -> Withdrawn on explicit user confirmation.
    #[instrument(skip(self), fields(commission_id = %id))]
    pub async fn withdraw(&self, id: Uuid) -> Result<TransitionOutcome, ServiceError> {
        let commission = self.aggregator.commission_or_not_found(id).await?;
        if commission.status != CommissionStatus::Ready {
            return Ok(TransitionOutcome::Rejected("only ready commissions withdraw"));
        }
        let updated = self
            .apply_status(
                &commission,
                CommissionStatus::Withdrawn,
                vec![("withdrawn_at", json!(self.clock.now()))],
            )
            .await?;
        self.finish_transition(&commission, CommissionStatus::Withdrawn).await?;
        Ok(TransitionOutcome::Applied(updated))
    }

    /// Withdrawn -> Ready. Clears the withdrawal timestamp; stock consumption
    /// stays one-way, nothing is re-incremented.
    #[instrument(skip(self), fields(commission_id = %id))]
    pub async fn revert_withdrawal(&self, id: Uuid) -> Result<TransitionOutcome, ServiceError> {
        let commission = self.aggregator.commission_or_not_found(id).await?;
        if commission.status != CommissionStatus::Withdrawn {
            return Ok(TransitionOutcome::Rejected("commission is not withdrawn"));
        }
        let updated = self
            .apply_status(
                &commission,
                CommissionStatus::Ready,
                vec![("withdrawn_at", Value::Null)],
            )
            .await?;
        self.finish_transition(&commission, CommissionStatus::Ready).await?;
        Ok(TransitionOutcome::Applied(updated))
    }

    /// Any active state -> ReturnPending, with a structured return-reason
    /// note prepended to the commission notes.
    #[instrument(skip(self, reason), fields(commission_id = %id, disposition = %disposition))]
    pub async fn request_return(
        &self,
        id: Uuid,
        disposition: ReturnDisposition,
        reason: &str,
    ) -> Result<TransitionOutcome, ServiceError> {
        let commission = self.aggregator.commission_or_not_found(id).await?;
        if !allowed(commission.status, CommissionStatus::ReturnPending) {
            return Ok(TransitionOutcome::Rejected("transition not allowed"));
        }
        let notes = format!("ACTION: {disposition} {reason}\n{}", commission.notes);
        let updated = self
            .apply_status(
                &commission,
                CommissionStatus::ReturnPending,
                vec![("notes", json!(notes))],
            )
            .await?;
        self.finish_transition(&commission, CommissionStatus::ReturnPending).await?;
        Ok(TransitionOutcome::Applied(updated))
    }

    /// ReturnPending -> ReturnReady; prints the return label.
    #[instrument(skip(self), fields(commission_id = %id))]
    pub async fn mark_return_ready(&self, id: Uuid) -> Result<TransitionOutcome, ServiceError> {
        let commission = self.aggregator.commission_or_not_found(id).await?;
        if commission.status != CommissionStatus::ReturnPending {
            return Ok(TransitionOutcome::Rejected("no return pending"));
        }
        let updated = self
            .apply_status(&commission, CommissionStatus::ReturnReady, vec![])
            .await?;
        self.finish_transition(&commission, CommissionStatus::ReturnReady).await?;

        let items = self.items_of(id).await?;
        self.print_labels(&[LabelJob {
            commission: updated.clone(),
            items,
        }])
        .await?;
        Ok(TransitionOutcome::Applied(updated))
    }

    /// ReturnReady -> ReturnComplete; clears the active selection.
    #[instrument(skip(self), fields(commission_id = %id))]
    pub async fn complete_return(&self, id: Uuid) -> Result<TransitionOutcome, ServiceError> {
        let commission = self.aggregator.commission_or_not_found(id).await?;
        if commission.status != CommissionStatus::ReturnReady {
            return Ok(TransitionOutcome::Rejected("return is not ready"));
        }
        let updated = self
            .apply_status(&commission, CommissionStatus::ReturnComplete, vec![])
            .await?;
        self.finish_transition(&commission, CommissionStatus::ReturnComplete).await?;
        if let Ok(mut view) = self.view.lock() {
            view.clear_selection_of(id);
        }
        Ok(TransitionOutcome::Applied(updated))
    }

    /// Explicit manual reset to Preparing from any state. Audit event, no
    /// other effect.
    #[instrument(skip(self), fields(commission_id = %id))]
    pub async fn reset_status(&self, id: Uuid) -> Result<TransitionOutcome, ServiceError> {
        let commission = self.aggregator.commission_or_not_found(id).await?;
        if !allowed(commission.status, CommissionStatus::Preparing) {
            return Ok(TransitionOutcome::Rejected("already preparing"));
        }
        let updated = self
            .apply_status(&commission, CommissionStatus::Preparing, vec![])
            .await?;
        self.finish_transition(&commission, CommissionStatus::Preparing).await?;
        Ok(TransitionOutcome::Applied(updated))
    }

    /// Flags a commission as missing during an inventory audit.
    #[instrument(skip(self), fields(commission_id = %id))]
    pub async fn mark_missing(&self, id: Uuid) -> Result<TransitionOutcome, ServiceError> {
        let commission = self.aggregator.commission_or_not_found(id).await?;
        if !allowed(commission.status, CommissionStatus::Missing) {
            return Ok(TransitionOutcome::Rejected("transition not allowed"));
        }
        let updated = self
            .apply_status(&commission, CommissionStatus::Missing, vec![])
            .await?;
        self.finish_transition(&commission, CommissionStatus::Missing).await?;
        Ok(TransitionOutcome::Applied(updated))
    }

    /// Missing -> Preparing once the commission turns up again.
    #[instrument(skip(self), fields(commission_id = %id))]
    pub async fn mark_found(&self, id: Uuid) -> Result<TransitionOutcome, ServiceError> {
        let commission = self.aggregator.commission_or_not_found(id).await?;
        if commission.status != CommissionStatus::Missing {
            return Ok(TransitionOutcome::Rejected("commission is not missing"));
        }
        let updated = self
            .apply_status(&commission, CommissionStatus::Preparing, vec![])
            .await?;
        self.finish_transition(&commission, CommissionStatus::Preparing).await?;
        Ok(TransitionOutcome::Applied(updated))
    }

    /// Hands label jobs to the print collaborator and logs the print run.
    /// Rendering is fire-and-forget; the audit row is written regardless of
    /// rendering outcome, which the core cannot observe.
    pub async fn print_labels(&self, jobs: &[LabelJob]) -> Result<(), ServiceError> {
        self.printer.print(jobs).await;
        for job in jobs {
            self.aggregator
                .log_commission_event(
                    job.commission.id,
                    &job.commission.name,
                    EventAction::LabelsPrinted,
                    format!("{} labels", jobs.len()),
                )
                .await?;
        }
        self.announce(DomainEvent::LabelsPrinted {
            commission_ids: jobs.iter().map(|j| j.commission.id).collect(),
        })
        .await;
        Ok(())
    }
}
