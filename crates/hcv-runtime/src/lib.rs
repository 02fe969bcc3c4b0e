//! hcv-runtime
//!
//! One reconciliation cycle: lock the host, read its state, plan, apply.
//!
//! Pre-flight failures (host busy, host unreadable, invalid desired state)
//! abort the cycle before any side effect. Everything after planning is
//! reported through the [`ReconciliationReport`].

use std::path::PathBuf;
use std::time::Duration;

use hcv_exec::{apply, ApplyOptions, FragmentStore, ReconciliationReport, StoreError};
use hcv_host::{read_host_state, HostControl, HostQueryError};
use hcv_model::{DesiredState, HostState, ModuleRegistry};
use hcv_plan::{plan, ActionPlan, PlanError};
use thiserror::Error;

mod lock;

pub use lock::{CycleGuard, HostLocks};

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("a reconciliation cycle for host `{host_id}` is already running")]
    Busy { host_id: String },

    #[error(transparent)]
    HostQuery(#[from] HostQueryError),

    #[error("cannot read configuration files: {0}")]
    Snapshot(#[from] StoreError),

    #[error("invalid desired state: {0}")]
    Plan(#[from] PlanError),
}

/// Where the engine writes and which modules it may touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub fragment_dir: PathBuf,
    pub main_config: PathBuf,
    /// Site-specific modules on top of the standard registry.
    pub extra_modules: Vec<String>,
    pub timeout: Option<Duration>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            fragment_dir: PathBuf::from("/etc/apache2/conf-available"),
            main_config: PathBuf::from("/etc/apache2/apache2.conf"),
            extra_modules: Vec::new(),
            timeout: None,
        }
    }
}

impl EngineSettings {
    pub fn store(&self) -> FragmentStore {
        FragmentStore::new(&self.fragment_dir, &self.main_config)
    }

    pub fn registry(&self) -> ModuleRegistry {
        ModuleRegistry::standard().with_extra(&self.extra_modules)
    }

    pub fn apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            timeout: self.timeout,
        }
    }
}

/// Full host state: live modules plus the files on disk.
pub fn capture_host_state(
    host: &dyn HostControl,
    store: &FragmentStore,
) -> Result<HostState, CycleError> {
    let live = read_host_state(host)?;
    let files = store.snapshot()?;
    Ok(live.with_files(files.fragments, files.registered_includes))
}

/// Read and plan without executing anything.
pub fn plan_cycle(
    desired: &DesiredState,
    host: &dyn HostControl,
    store: &FragmentStore,
    registry: &ModuleRegistry,
) -> Result<(HostState, ActionPlan), CycleError> {
    let actual = capture_host_state(host, store)?;
    let p = plan(desired, &actual, registry)?;
    Ok((actual, p))
}

pub fn run_cycle(
    desired: &DesiredState,
    host: &dyn HostControl,
    store: &FragmentStore,
    registry: &ModuleRegistry,
    options: &ApplyOptions,
) -> Result<ReconciliationReport, CycleError> {
    let host_id = host.host_id().to_string();
    let _guard = HostLocks::try_acquire(&host_id).ok_or_else(|| CycleError::Busy {
        host_id: host_id.clone(),
    })?;

    let (_, p) = plan_cycle(desired, host, store, registry)?;
    tracing::info!(
        host = %host_id,
        actions = p.len(),
        render_failures = p.render_failures.len(),
        "plan computed"
    );

    let report = apply(&p, host, store, options);
    tracing::info!(
        host = %host_id,
        cycle_id = %report.cycle_id,
        status = ?report.status(),
        plan_fatal = report.plan_fatal,
        "cycle finished"
    );
    Ok(report)
}
