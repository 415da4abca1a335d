//! The sync cycle worker and the operator force-sync path.

pub mod force;
pub mod worker;

pub use force::{ForceSyncHandle, ForceSyncOutcome, ForceSyncRunner, ForceTarget};
pub use worker::{SyncDeps, SyncWorker, SyncWorkerConfig};
