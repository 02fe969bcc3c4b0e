use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use hcv_model::FragmentKind;
use hcv_plan::Action;
use hcv_render::TemplateError;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyEnabled,
    AlreadyDisabled,
    ContentUnchanged,
    AlreadyRegistered,
    /// The cycle deadline passed before the action started.
    Timeout,
    /// An earlier plan-fatal failure aborted the rest of the plan.
    AbortedAfterPlanFatal,
    /// The fragment's write failed earlier in this cycle; including it would
    /// point the server at a missing file.
    FragmentNotWritten,
}

impl SkipReason {
    /// The action was never attempted, as opposed to already satisfied.
    pub fn is_abandoned(&self) -> bool {
        matches!(
            self,
            SkipReason::Timeout | SkipReason::AbortedAfterPlanFatal | SkipReason::FragmentNotWritten
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ActionOutcome {
    Applied,
    Skipped(SkipReason),
    Failed(String),
}

impl ActionOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ActionOutcome::Failed(_))
    }

    pub fn is_abandoned(&self) -> bool {
        matches!(self, ActionOutcome::Skipped(r) if r.is_abandoned())
    }
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionOutcome::Applied => f.write_str("applied"),
            ActionOutcome::Skipped(r) => write!(f, "skipped({r:?})"),
            ActionOutcome::Failed(cause) => write!(f, "failed({cause})"),
        }
    }
}

/// An action without its payload (fragment bodies stay out of reports).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionSummary {
    pub kind: String,
    pub target: Option<String>,
}

impl ActionSummary {
    pub fn render_fragment(fragment: FragmentKind) -> Self {
        Self {
            kind: "render_fragment".to_string(),
            target: Some(fragment.to_string()),
        }
    }
}

impl From<&Action> for ActionSummary {
    fn from(a: &Action) -> Self {
        let target = match a {
            Action::EnableModule { name } | Action::DisableModule { name } => Some(name.clone()),
            Action::SwitchConcurrencyModel { .. } => a.switch_target(),
            Action::WriteFragment { fragment, .. } | Action::RegisterInclude { fragment } => {
                Some(fragment.to_string())
            }
            Action::RestartService => None,
        };
        Self {
            kind: a.kind().to_string(),
            target,
        }
    }
}

impl fmt::Display for ActionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(t) => write!(f, "{}({t})", self.kind),
            None => f.write_str(&self.kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRecord {
    pub action: ActionSummary,
    #[serde(flatten)]
    pub outcome: ActionOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReportStatus {
    /// Nothing needed to change.
    NoOp,
    /// Every action applied or already satisfied.
    Applied,
    /// No failures, but some actions were never attempted (deadline passed).
    Incomplete { skipped: usize },
    Partial { failures: usize },
}

/// Outcome of one reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub cycle_id: Uuid,
    pub host_id: String,
    pub started_at_utc: DateTime<Utc>,
    pub finished_at_utc: DateTime<Utc>,
    /// Render failures first (as `render_fragment` records), then one record
    /// per planned action in plan order.
    pub records: Vec<ActionRecord>,
    pub render_failures: BTreeMap<FragmentKind, TemplateError>,
    /// A concurrency-model switch failed and the rest of the plan was aborted.
    pub plan_fatal: bool,
}

impl ReconciliationReport {
    pub fn failures(&self) -> impl Iterator<Item = &ActionRecord> {
        self.records.iter().filter(|r| r.outcome.is_failed())
    }

    /// Records that were never attempted.
    pub fn abandoned(&self) -> impl Iterator<Item = &ActionRecord> {
        self.records.iter().filter(|r| r.outcome.is_abandoned())
    }

    pub fn status(&self) -> ReportStatus {
        let failures = self.failures().count();
        let skipped = self.abandoned().count();
        if failures > 0 {
            ReportStatus::Partial { failures }
        } else if skipped > 0 {
            ReportStatus::Incomplete { skipped }
        } else if self
            .records
            .iter()
            .any(|r| r.outcome == ActionOutcome::Applied)
        {
            ReportStatus::Applied
        } else {
            ReportStatus::NoOp
        }
    }

    /// No failures and nothing left unattempted.
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none() && self.abandoned().next().is_none()
    }

    /// One line per failed or unattempted record, in plan order.
    pub fn failure_listing(&self) -> String {
        self.records
            .iter()
            .filter(|r| r.outcome.is_failed() || r.outcome.is_abandoned())
            .map(|r| format!("{}: {}", r.action, r.outcome))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
