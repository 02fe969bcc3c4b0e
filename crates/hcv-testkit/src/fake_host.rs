//! In-memory web-server host.
//!
//! Behaves like the Debian tooling where it matters for reconciliation:
//! enabling an `mpm_*` module while another one is enabled is refused, a
//! module packaged against one model (`php8.2` needs `mpm_prefork`) can be
//! neither enabled without it nor outlive it, and the active model is
//! unreadable while two are enabled. Every call is
//! recorded; faults are injected per operation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use hcv_host::{HostControl, HostControlError};
use hcv_model::{concurrency_model_of, concurrency_module_name, packaged_concurrency_model};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Fault {
    /// `enable_module(name)` returns an error.
    Enable(String),
    /// `enable_module(name)` reports success but changes nothing.
    EnableNoop(String),
    Disable(String),
    Restart,
    ListModules,
    ListActiveModel,
}

#[derive(Debug, Default)]
struct Inner {
    enabled: BTreeSet<String>,
    faults: BTreeSet<Fault>,
    calls: Vec<String>,
    restarts: u32,
    max_models_enabled: usize,
}

impl Inner {
    fn models_enabled(&self) -> Vec<String> {
        self.enabled
            .iter()
            .filter_map(|m| concurrency_model_of(m))
            .map(str::to_string)
            .collect()
    }

    fn observe(&mut self) {
        let n = self.models_enabled().len();
        self.max_models_enabled = self.max_models_enabled.max(n);
    }
}

#[derive(Debug)]
pub struct FakeHost {
    host_id: String,
    latency: Option<Duration>,
    inner: Mutex<Inner>,
}

impl FakeHost {
    pub fn new<I, S>(host_id: &str, enabled: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut inner = Inner {
            enabled: enabled.into_iter().map(Into::into).collect(),
            ..Inner::default()
        };
        inner.observe();
        Self {
            host_id: host_id.to_string(),
            latency: None,
            inner: Mutex::new(inner),
        }
    }

    /// Every mutating call sleeps this long before acting.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn inject(&self, fault: Fault) {
        self.state().faults.insert(fault);
    }

    pub fn clear_faults(&self) {
        self.state().faults.clear();
    }

    pub fn enabled_modules(&self) -> BTreeSet<String> {
        self.state().enabled.clone()
    }

    pub fn concurrency_models_enabled(&self) -> Vec<String> {
        self.state().models_enabled()
    }

    /// Highest number of simultaneously enabled concurrency models observed.
    pub fn max_concurrency_models_enabled(&self) -> usize {
        self.state().max_models_enabled
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Mutating calls only (`enable:x`, `disable:x`, `restart`).
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("list"))
            .collect()
    }

    pub fn restarts(&self) -> u32 {
        self.state().restarts
    }

    fn state(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pause(&self) {
        if let Some(d) = self.latency {
            std::thread::sleep(d);
        }
    }
}

impl HostControl for FakeHost {
    fn host_id(&self) -> &str {
        &self.host_id
    }

    fn list_active_concurrency_model(&self) -> Result<Option<String>, HostControlError> {
        let mut s = self.state();
        s.calls.push("list_active".to_string());
        if s.faults.contains(&Fault::ListActiveModel) {
            return Err(HostControlError::new("list_active_concurrency_model", "injected fault"));
        }
        let models = s.models_enabled();
        match models.len() {
            0 => Ok(None),
            1 => Ok(models.into_iter().next()),
            _ => Err(HostControlError::new(
                "list_active_concurrency_model",
                "More than one MPM loaded.",
            )),
        }
    }

    fn list_enabled_modules(&self) -> Result<BTreeSet<String>, HostControlError> {
        let mut s = self.state();
        s.calls.push("list_modules".to_string());
        if s.faults.contains(&Fault::ListModules) {
            return Err(HostControlError::new("list_enabled_modules", "injected fault"));
        }
        Ok(s.enabled.clone())
    }

    fn enable_module(&self, name: &str) -> Result<(), HostControlError> {
        self.pause();
        let op = format!("enable_module({name})");
        let mut s = self.state();
        s.calls.push(format!("enable:{name}"));

        if s.faults.contains(&Fault::Enable(name.to_string())) {
            return Err(HostControlError::new(op, "injected fault"));
        }
        if s.faults.contains(&Fault::EnableNoop(name.to_string())) {
            return Ok(());
        }
        if concurrency_model_of(name).is_some() {
            let others: Vec<String> = s
                .models_enabled()
                .into_iter()
                .map(|m| format!("mpm_{m}"))
                .filter(|m| m != name)
                .collect();
            if let Some(other) = others.first() {
                return Err(HostControlError::new(
                    op,
                    format!("Module {other} is enabled - cannot proceed due to conflicts."),
                ));
            }
        }
        if let Some(model) = packaged_concurrency_model(name) {
            let needed = concurrency_module_name(model);
            if !s.enabled.contains(&needed) {
                return Err(HostControlError::new(
                    op,
                    format!("Module {name} depends on {needed}, which is not enabled."),
                ));
            }
        }

        s.enabled.insert(name.to_string());
        s.observe();
        Ok(())
    }

    fn disable_module(&self, name: &str) -> Result<(), HostControlError> {
        self.pause();
        let mut s = self.state();
        s.calls.push(format!("disable:{name}"));
        if s.faults.contains(&Fault::Disable(name.to_string())) {
            return Err(HostControlError::new(
                format!("disable_module({name})"),
                "injected fault",
            ));
        }
        if let Some(model) = concurrency_model_of(name) {
            let dependent = s
                .enabled
                .iter()
                .find(|m| packaged_concurrency_model(m) == Some(model))
                .cloned();
            if let Some(dependent) = dependent {
                return Err(HostControlError::new(
                    format!("disable_module({name})"),
                    format!("Module {dependent} depends on {name}, not disabling."),
                ));
            }
        }
        s.enabled.remove(name);
        Ok(())
    }

    fn restart_service(&self) -> Result<(), HostControlError> {
        self.pause();
        let mut s = self.state();
        s.calls.push("restart".to_string());
        if s.faults.contains(&Fault::Restart) {
            return Err(HostControlError::new("restart_service", "injected fault"));
        }
        s.restarts += 1;
        Ok(())
    }
}

/// Count of each mutating call, e.g. `{"enable:cache": 1, "restart": 1}`.
pub fn mutation_counts(host: &FakeHost) -> BTreeMap<String, usize> {
    let mut out = BTreeMap::new();
    for c in host.mutations() {
        *out.entry(c).or_insert(0) += 1;
    }
    out
}
