//! commission-core
//!
//! Data synchronization and workflow core for warehouse commission
//! fulfillment: a stale-while-revalidate query cache over an abstract remote
//! row store, a realtime reconciler folding push events into cache state, and
//! the commission status workflow with its stock and audit side effects.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod cache;
pub mod clock;
pub mod config;
pub mod errors;
pub mod events;
pub mod labels;
pub mod logging;
pub mod models;
pub mod realtime;
pub mod scan;
pub mod services;
pub mod store;
pub mod view;

pub use cache::{CacheSlot, CachedValue, QueryCache, QueryKey};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{GatewayConfig, SyncConfig};
pub use errors::{ServiceError, StoreError};
pub use events::{DomainEvent, EventSender};
pub use labels::{LabelJob, LabelPrinter, NullPrinter};
pub use models::{
    Article, Commission, CommissionEvent, CommissionItem, CommissionStatus, CommissionTab,
    EventAction, ItemKind, StockMovement, StockMovementKind, Supplier,
};
pub use realtime::{DetailWatch, RealtimeReconciler, ScopeGuard};
pub use services::commissions::{
    CommissionAggregator, CommissionDraft, CommissionList, ItemDraft, ItemEditOutcome, ItemPatch,
    TabCounts,
};
pub use services::workflow::{
    allowed, ready_guard, ReturnDisposition, TransitionOutcome, WorkflowService,
};
pub use store::{
    ChangeEvent, ChangeKind, ChangeStream, JsonRow, MemoryStore, RemoteStore, RestStore,
    RowFilter, StoreEntity,
};
pub use view::{CloseOutcome, PanelMode, ViewController};
