//! hcv-exec
//!
//! Plan executor. Applies an [`hcv_plan::ActionPlan`] against a live host
//! and its configuration files, one action at a time:
//! - module toggles re-check the host first and skip when already satisfied
//! - a concurrency-model switch is verified afterwards; on failure it is
//!   rolled back best-effort and the rest of the plan is aborted
//! - fragment writes and include registrations are idempotent
//! - every outcome lands in a [`ReconciliationReport`]; nothing is raised
//!
//! No retries.

mod executor;
mod report;
mod store;

pub use executor::{apply, ApplyOptions};
pub use report::{
    ActionOutcome, ActionRecord, ActionSummary, ReconciliationReport, ReportStatus, SkipReason,
};
pub use store::{FileState, FragmentStore, StoreError};
