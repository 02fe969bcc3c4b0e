//! hcv-host
//!
//! The boundary between the engine and the live web-server host.
//!
//! - [`HostControl`] is the capability set the engine consumes: list the
//!   active concurrency model, list enabled modules, enable/disable a module,
//!   restart the service. Every call may fail with [`HostControlError`].
//! - [`read_host_state`] is the HostState Reader: one fresh snapshot per call,
//!   [`HostQueryError`] when the host cannot be introspected.
//! - [`CommandHost`] implements [`HostControl`] with the Debian apache2
//!   tooling (`apache2ctl`, `a2enmod`, `a2dismod`, `systemctl`).

mod command;

pub use command::{parse_enabled_modules_dir, parse_server_mpm, CommandHost, HostCommands};

use std::collections::BTreeSet;

use hcv_model::HostState;
use thiserror::Error;

/// An external host command failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("host command `{op}` failed: {cause}")]
pub struct HostControlError {
    /// Operation label, e.g. `enable_module(cache)`.
    pub op: String,
    pub cause: String,
}

impl HostControlError {
    pub fn new(op: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            cause: cause.into(),
        }
    }
}

/// The actual state of the host could not be determined.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostQueryError {
    #[error("host introspection failed: {0}")]
    Command(#[from] HostControlError),

    #[error("unexpected {what} output: {detail}")]
    Parse { what: String, detail: String },
}

/// Capability set of the managed host.
///
/// Implementations perform real side effects; the engine never assumes a call
/// succeeded without checking its result.
pub trait HostControl {
    /// Identity used to serialize reconciliation cycles per host.
    fn host_id(&self) -> &str;

    fn list_active_concurrency_model(&self) -> Result<Option<String>, HostControlError>;

    fn list_enabled_modules(&self) -> Result<BTreeSet<String>, HostControlError>;

    fn enable_module(&self, name: &str) -> Result<(), HostControlError>;

    fn disable_module(&self, name: &str) -> Result<(), HostControlError>;

    fn restart_service(&self) -> Result<(), HostControlError>;
}

/// Take a fresh module/concurrency-model snapshot of the host.
///
/// The filesystem half of [`HostState`] (fragments, includes) is left empty;
/// the caller merges it in from the fragment store.
pub fn read_host_state(host: &dyn HostControl) -> Result<HostState, HostQueryError> {
    let active_concurrency_model = host.list_active_concurrency_model()?;
    let enabled_modules = host.list_enabled_modules()?;

    tracing::debug!(
        host = host.host_id(),
        active = ?active_concurrency_model,
        enabled = enabled_modules.len(),
        "host state read"
    );

    Ok(HostState {
        active_concurrency_model,
        enabled_modules,
        ..HostState::default()
    })
}
