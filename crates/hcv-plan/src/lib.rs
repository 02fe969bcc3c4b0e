//! hcv-plan
//!
//! Reconciliation planner: desired state + host snapshot -> ordered
//! [`ActionPlan`].
//!
//! Guarantees:
//! - structural validation before anything is planned ([`PlanError`])
//! - a concurrency-model switch is always the first action
//! - no module is both enabled and disabled in one plan
//! - fragments are written only when their content differs from disk
//! - a single trailing restart, only when something changed
//! - planning against the state produced by applying a plan yields no actions
//!
//! Deterministic, pure logic. No IO.

mod actions;
mod engine;

pub use actions::{Action, ActionPlan};
pub use engine::{plan, PlanError};
