use hcv_model::*;
use hcv_plan::*;

fn desired() -> DesiredState {
    DesiredState::new(ConcurrencyModel::new("event"))
}

fn actual() -> HostState {
    HostState {
        active_concurrency_model: Some("prefork".to_string()),
        ..HostState::default()
    }
}

#[test]
fn scenario_unknown_module_fails_before_anything_is_planned() {
    let mut d = desired();
    d.module_flags.insert("mod_frobnicate".to_string(), true);

    let err = plan(&d, &actual(), &ModuleRegistry::standard()).unwrap_err();
    assert_eq!(
        err,
        PlanError::UnknownModule {
            name: "mod_frobnicate".to_string()
        }
    );
}

#[test]
fn scenario_extra_registry_entries_make_site_modules_plannable() {
    let mut d = desired();
    d.required_modules.push("evasive".to_string());

    assert!(plan(&d, &actual(), &ModuleRegistry::standard()).is_err());

    let registry = ModuleRegistry::standard().with_extra(["evasive"]);
    let p = plan(&d, &actual(), &registry).unwrap();
    assert!(p.contains(&Action::EnableModule {
        name: "evasive".to_string()
    }));
}

#[test]
fn scenario_concurrency_model_in_required_modules_is_rejected() {
    let mut d = desired();
    d.required_modules.push("mpm_worker".to_string());

    let err = plan(&d, &actual(), &ModuleRegistry::standard()).unwrap_err();
    assert!(matches!(err, PlanError::ConcurrencyModelInRequiredModules { .. }));
}

#[test]
fn scenario_required_but_flagged_off_is_a_conflict() {
    let mut d = desired();
    d.required_modules.push("mod_rewrite".to_string());
    d.module_flags.insert("rewrite".to_string(), false);

    let err = plan(&d, &actual(), &ModuleRegistry::standard()).unwrap_err();
    assert_eq!(
        err,
        PlanError::ConflictingModuleIntent {
            name: "rewrite".to_string()
        }
    );
}

#[test]
fn scenario_php_required_under_event_is_rejected() {
    let mut d = desired();
    d.required_modules.push("php8.2".to_string());

    let registry = ModuleRegistry::standard().with_extra(["php8.2"]);
    let err = plan(&d, &actual(), &registry).unwrap_err();
    assert_eq!(
        err,
        PlanError::IncompatibleConcurrencyModel {
            name: "php8.2".to_string(),
            requires: "prefork".to_string(),
            desired: "event".to_string(),
        }
    );
}
