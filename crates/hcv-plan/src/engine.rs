use std::collections::{BTreeMap, BTreeSet};

use hcv_model::{
    concurrency_model_of, DesiredState, HostState, ModuleRegistry, CONCURRENCY_MODELS,
};
use thiserror::Error;

use crate::{Action, ActionPlan};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("module `{name}` is not in the module registry")]
    UnknownModule { name: String },

    #[error("unknown concurrency model `{name}` (expected one of prefork, worker, event)")]
    UnknownConcurrencyModel { name: String },

    #[error("concurrency model module `{name}` cannot be toggled through module flags")]
    ConcurrencyModelInModuleFlags { name: String },

    #[error("concurrency model module `{name}` cannot be listed as a required module")]
    ConcurrencyModelInRequiredModules { name: String },

    #[error("module `{name}` is both required/enabled and flagged disabled")]
    ConflictingModuleIntent { name: String },

    #[error("module `{name}` only loads under `{requires}`, but the desired concurrency model is `{desired}`")]
    IncompatibleConcurrencyModel {
        name: String,
        requires: String,
        desired: String,
    },

    #[error("enabled module `{name}` depends on `{model}`; flag it disabled to switch away from `{model}`")]
    DependentBlocksSwitch { name: String, model: String },
}

/// Desired state after name resolution.
struct Validated {
    model: String,
    required: Vec<String>,
    flags: BTreeMap<String, bool>,
}

fn is_concurrency_module(registry: &ModuleRegistry, name: &str) -> bool {
    concurrency_model_of(name).is_some()
        || registry
            .resolve(name)
            .map(|h| h.is_concurrency_model())
            .unwrap_or(false)
}

fn resolve_name(registry: &ModuleRegistry, name: &str) -> Result<String, PlanError> {
    registry
        .resolve(name)
        .map(|h| h.name.clone())
        .ok_or_else(|| PlanError::UnknownModule {
            name: name.to_string(),
        })
}

fn validate(desired: &DesiredState, registry: &ModuleRegistry) -> Result<Validated, PlanError> {
    let model = desired.concurrency_model.name.clone();
    if !CONCURRENCY_MODELS.contains(&model.as_str()) {
        return Err(PlanError::UnknownConcurrencyModel { name: model });
    }
    resolve_name(registry, &desired.concurrency_model.module_name())?;

    let mut flags: BTreeMap<String, bool> = BTreeMap::new();
    for (raw, want) in &desired.module_flags {
        let stripped = hcv_model::normalize_module_name(raw);
        if is_concurrency_module(registry, stripped) {
            return Err(PlanError::ConcurrencyModelInModuleFlags { name: raw.clone() });
        }
        let name = resolve_name(registry, raw)?;
        // `mod_cache` and `cache` collapse onto one module.
        if let Some(prev) = flags.insert(name.clone(), *want) {
            if prev != *want {
                return Err(PlanError::ConflictingModuleIntent { name });
            }
        }
    }

    let mut required = Vec::new();
    let mut seen = BTreeSet::new();
    for raw in &desired.required_modules {
        let stripped = hcv_model::normalize_module_name(raw);
        if is_concurrency_module(registry, stripped) {
            return Err(PlanError::ConcurrencyModelInRequiredModules { name: raw.clone() });
        }
        let name = resolve_name(registry, raw)?;
        if flags.get(&name) == Some(&false) {
            return Err(PlanError::ConflictingModuleIntent { name });
        }
        if seen.insert(name.clone()) {
            required.push(name);
        }
    }

    let wanted_on = required
        .iter()
        .chain(flags.iter().filter(|(_, on)| **on).map(|(n, _)| n));
    for name in wanted_on {
        if let Some(requires) = registry.required_concurrency_model(name) {
            if requires != model {
                return Err(PlanError::IncompatibleConcurrencyModel {
                    name: name.clone(),
                    requires,
                    desired: model,
                });
            }
        }
    }

    Ok(Validated {
        model,
        required,
        flags,
    })
}

/// Enabled modules that pin `from`. Each must be flagged off; they are
/// disabled together with `from`, since the host tooling refuses to disable
/// a concurrency model something still depends on.
fn switch_dependents(
    v: &Validated,
    actual: &HostState,
    registry: &ModuleRegistry,
    from: &str,
) -> Result<Vec<String>, PlanError> {
    let mut out = Vec::new();
    for name in &actual.enabled_modules {
        if registry.required_concurrency_model(name).as_deref() != Some(from) {
            continue;
        }
        match v.flags.get(hcv_model::normalize_module_name(name)) {
            Some(false) => out.push(name.clone()),
            _ => {
                return Err(PlanError::DependentBlocksSwitch {
                    name: name.clone(),
                    model: from.to_string(),
                })
            }
        }
    }
    Ok(out)
}

/// Compute the ordered actions that move `actual` to `desired`.
///
/// Pure and deterministic. Ordering:
/// 1. concurrency-model switch. Always first when present and never moved
///    after the module enables: `a2enmod` refuses a module packaged for one
///    model while another is active. Enabled modules that depend on the old
///    model and are flagged off ride along in the switch instead of
///    appearing in step 3.
/// 2. required modules, in declared order
/// 3. module flags, by name
/// 4. fragment writes whose content differs from what is on disk
/// 5. include registrations for fragments not yet referenced
/// 6. one trailing service restart when anything above was emitted
pub fn plan(
    desired: &DesiredState,
    actual: &HostState,
    registry: &ModuleRegistry,
) -> Result<ActionPlan, PlanError> {
    let v = validate(desired, registry)?;
    let mut actions: Vec<Action> = Vec::new();

    // 1) Concurrency model
    let mut dependents: Vec<String> = Vec::new();
    if actual.active_concurrency_model.as_deref() != Some(v.model.as_str()) {
        // When the server cannot report its model, fall back to any other
        // enabled mpm module so the switch still disables it.
        let from = actual.active_concurrency_model.clone().or_else(|| {
            actual
                .concurrency_models_enabled()
                .into_iter()
                .find(|m| *m != v.model)
        });
        if let Some(from) = from.as_deref() {
            dependents = switch_dependents(&v, actual, registry, from)?;
        }
        actions.push(Action::SwitchConcurrencyModel {
            from,
            to: v.model.clone(),
            dependents: dependents.clone(),
        });
    }

    // 2) Required modules
    let mut enabling: BTreeSet<String> = BTreeSet::new();
    for name in &v.required {
        if !actual.is_enabled(name) && enabling.insert(name.clone()) {
            actions.push(Action::EnableModule { name: name.clone() });
        }
    }

    // 3) Module flags
    for (name, want) in &v.flags {
        let have = actual.is_enabled(name);
        match (*want, have) {
            (true, false) => {
                if enabling.insert(name.clone()) {
                    actions.push(Action::EnableModule { name: name.clone() });
                }
            }
            (false, true) if !dependents.contains(name) => {
                actions.push(Action::DisableModule { name: name.clone() })
            }
            _ => {}
        }
    }

    // 4) Fragments
    let rendered = hcv_render::render(desired);
    for (kind, content) in &rendered.fragments {
        if actual.fragments.get(kind) != Some(content) {
            actions.push(Action::WriteFragment {
                fragment: *kind,
                content: content.clone(),
            });
        }
    }

    // 5) Includes
    for kind in rendered.fragments.keys() {
        if !actual.registered_includes.contains(kind) {
            actions.push(Action::RegisterInclude { fragment: *kind });
        }
    }

    // 6) Restart
    if !actions.is_empty() {
        actions.push(Action::RestartService);
    }

    Ok(ActionPlan {
        actions,
        render_failures: rendered.failures,
    })
}
