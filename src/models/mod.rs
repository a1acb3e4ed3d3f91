pub mod article;
pub mod commission;
pub mod commission_event;
pub mod commission_item;
pub mod supplier;

pub use article::{Article, StockMovement, StockMovementKind};
pub use commission::{Commission, CommissionStatus, CommissionTab};
pub use commission_event::{CommissionEvent, EventAction};
pub use commission_item::{CommissionItem, ItemKind};
pub use supplier::Supplier;
