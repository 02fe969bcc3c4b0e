use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use chrono::Utc;
use hcv_host::{read_host_state, HostControl, HostControlError};
use hcv_model::{concurrency_module_name, FragmentKind};
use hcv_plan::{Action, ActionPlan};
use uuid::Uuid;

use crate::report::{
    ActionOutcome, ActionRecord, ActionSummary, ReconciliationReport, SkipReason,
};
use crate::store::FragmentStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Deadline for the whole cycle, checked before each action.
    pub timeout: Option<Duration>,
}

impl ApplyOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// Execute the plan strictly in order.
///
/// Failures are recorded, never raised. Only a failed concurrency-model switch
/// aborts the remaining actions. A fragment whose write failed is never
/// registered as an include.
pub fn apply(
    plan: &ActionPlan,
    host: &dyn HostControl,
    store: &FragmentStore,
    options: &ApplyOptions,
) -> ReconciliationReport {
    let cycle_id = Uuid::new_v4();
    let started_at_utc = Utc::now();
    let deadline = options.timeout.map(|t| Instant::now() + t);

    let mut records = Vec::with_capacity(plan.len() + plan.render_failures.len());
    for (fragment, err) in &plan.render_failures {
        tracing::warn!(%cycle_id, %fragment, error = %err, "fragment not rendered");
        records.push(ActionRecord {
            action: ActionSummary::render_fragment(*fragment),
            outcome: ActionOutcome::Failed(err.to_string()),
        });
    }

    let mut plan_fatal = false;
    let mut unwritten: BTreeSet<FragmentKind> = BTreeSet::new();
    for action in plan {
        let summary = ActionSummary::from(action);

        let outcome = if plan_fatal {
            ActionOutcome::Skipped(SkipReason::AbortedAfterPlanFatal)
        } else if deadline.is_some_and(|d| Instant::now() >= d) {
            ActionOutcome::Skipped(SkipReason::Timeout)
        } else if matches!(action, Action::RegisterInclude { fragment } if unwritten.contains(fragment)) {
            ActionOutcome::Skipped(SkipReason::FragmentNotWritten)
        } else {
            let outcome = execute_action(action, host, store);
            match action {
                Action::SwitchConcurrencyModel { .. } if outcome.is_failed() => {
                    plan_fatal = true;
                    tracing::error!(%cycle_id, action = %summary, "switch failed, aborting remaining actions");
                }
                Action::WriteFragment { fragment, .. } if outcome.is_failed() => {
                    unwritten.insert(*fragment);
                }
                _ => {}
            }
            outcome
        };

        match &outcome {
            ActionOutcome::Applied => tracing::info!(%cycle_id, action = %summary, "applied"),
            ActionOutcome::Skipped(reason) => {
                tracing::debug!(%cycle_id, action = %summary, ?reason, "skipped")
            }
            ActionOutcome::Failed(cause) => {
                tracing::warn!(%cycle_id, action = %summary, %cause, "failed")
            }
        }

        records.push(ActionRecord {
            action: summary,
            outcome,
        });
    }

    ReconciliationReport {
        cycle_id,
        host_id: host.host_id().to_string(),
        started_at_utc,
        finished_at_utc: Utc::now(),
        records,
        render_failures: plan.render_failures.clone(),
        plan_fatal,
    }
}

fn execute_action(
    action: &Action,
    host: &dyn HostControl,
    store: &FragmentStore,
) -> ActionOutcome {
    match action {
        Action::EnableModule { name } => toggle_module(host, name, true),
        Action::DisableModule { name } => toggle_module(host, name, false),
        Action::SwitchConcurrencyModel {
            from,
            to,
            dependents,
        } => {
            match switch_concurrency_model(host, from.as_deref(), to, dependents) {
                Ok(()) => ActionOutcome::Applied,
                Err(cause) => ActionOutcome::Failed(cause),
            }
        }
        Action::WriteFragment { fragment, content } => write_fragment(store, *fragment, content),
        Action::RegisterInclude { fragment } => match store.register_include(*fragment) {
            Ok(true) => ActionOutcome::Applied,
            Ok(false) => ActionOutcome::Skipped(SkipReason::AlreadyRegistered),
            Err(e) => ActionOutcome::Failed(e.to_string()),
        },
        Action::RestartService => match host.restart_service() {
            Ok(()) => ActionOutcome::Applied,
            Err(e) => ActionOutcome::Failed(e.to_string()),
        },
    }
}

fn toggle_module(host: &dyn HostControl, name: &str, enable: bool) -> ActionOutcome {
    let enabled = match host.list_enabled_modules() {
        Ok(mods) => mods.contains(name),
        Err(e) => return ActionOutcome::Failed(e.to_string()),
    };

    if enable && enabled {
        return ActionOutcome::Skipped(SkipReason::AlreadyEnabled);
    }
    if !enable && !enabled {
        return ActionOutcome::Skipped(SkipReason::AlreadyDisabled);
    }

    let result = if enable {
        host.enable_module(name)
    } else {
        host.disable_module(name)
    };
    match result {
        Ok(()) => ActionOutcome::Applied,
        Err(e) => ActionOutcome::Failed(e.to_string()),
    }
}

fn write_fragment(store: &FragmentStore, fragment: FragmentKind, content: &str) -> ActionOutcome {
    match store.write(fragment, content) {
        Ok(true) => ActionOutcome::Applied,
        Ok(false) => ActionOutcome::Skipped(SkipReason::ContentUnchanged),
        Err(e) => ActionOutcome::Failed(e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Concurrency-model switch
// ---------------------------------------------------------------------------

fn switch_concurrency_model(
    host: &dyn HostControl,
    from: Option<&str>,
    to: &str,
    dependents: &[String],
) -> Result<(), String> {
    let mut dropped = Vec::new();
    match switch_steps(host, from, to, dependents, &mut dropped) {
        Ok(()) => Ok(()),
        Err(cause) => {
            recover(host, from, to, &dropped);
            Err(cause)
        }
    }
}

/// Dependents of the outgoing model go first, otherwise the package manager
/// refuses to disable it.
fn switch_steps(
    host: &dyn HostControl,
    from: Option<&str>,
    to: &str,
    dependents: &[String],
    dropped: &mut Vec<String>,
) -> Result<(), String> {
    let to_module = concurrency_module_name(to);

    if !dependents.is_empty() {
        let enabled = host.list_enabled_modules().map_err(|e| e.to_string())?;
        for dep in dependents.iter().filter(|d| enabled.contains(d.as_str())) {
            host.disable_module(dep).map_err(|e| e.to_string())?;
            dropped.push(dep.clone());
        }
    }

    if let Some(from) = from.filter(|f| *f != to) {
        host.disable_module(&concurrency_module_name(from))
            .map_err(|e| e.to_string())?;
    }
    host.enable_module(&to_module).map_err(|e| e.to_string())?;

    let state = read_host_state(host).map_err(|e| format!("post-switch verification: {e}"))?;
    let enabled = state.concurrency_models_enabled();
    if enabled.len() != 1 || !enabled.contains(to) {
        return Err(format!(
            "post-switch verification: expected only `{to}` enabled, found {:?}",
            enabled
        ));
    }
    Ok(())
}

/// Best effort: leave at most one concurrency model enabled, preferring the
/// one that was running before the switch, then bring back the dependents
/// the switch disabled.
fn recover(host: &dyn HostControl, from: Option<&str>, to: &str, dropped: &[String]) {
    let to_module = concurrency_module_name(to);

    let to_enabled = host
        .list_enabled_modules()
        .map(|mods| mods.contains(&to_module))
        .unwrap_or(true);
    if to_enabled {
        log_recovery_step(host.disable_module(&to_module), &to_module, "disable");
    }

    if let Some(from) = from.filter(|f| *f != to) {
        let from_module = concurrency_module_name(from);
        log_recovery_step(host.enable_module(&from_module), &from_module, "re-enable");
    }

    for dep in dropped {
        log_recovery_step(host.enable_module(dep), dep, "re-enable");
    }
}

fn log_recovery_step(result: Result<(), HostControlError>, module: &str, step: &str) {
    match result {
        Ok(()) => tracing::info!(module, step, "switch recovery step applied"),
        Err(e) => tracing::error!(module, step, error = %e, "switch recovery step failed"),
    }
}
