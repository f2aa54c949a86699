pub mod pending_reconciler;

pub use pending_reconciler::{CycleReport, PendingReconcilerConfig, PendingReconcilerWorker};
