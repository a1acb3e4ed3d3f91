use async_trait::async_trait;
use tracing::debug;

use crate::models::{Commission, CommissionItem};

/// One page of label/PDF output: a commission with its items.
#[derive(Debug, Clone)]
pub struct LabelJob {
    pub commission: Commission,
    pub items: Vec<CommissionItem>,
}

/// External label/PDF rendering collaborator.
///
/// Fire-and-forget: rendering failures are not observable to the core, which
/// logs its `labels_printed` audit row immediately after invocation.
#[async_trait]
pub trait LabelPrinter: Send + Sync {
    async fn print(&self, jobs: &[LabelJob]);
}

/// Printer that renders nothing; the default collaborator in tests and
/// headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPrinter;

#[async_trait]
impl LabelPrinter for NullPrinter {
    async fn print(&self, jobs: &[LabelJob]) {
        debug!(count = jobs.len(), "label print suppressed (null printer)");
    }
}
