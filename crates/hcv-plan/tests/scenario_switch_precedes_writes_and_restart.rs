use hcv_model::*;
use hcv_plan::*;

fn full_desired(model: &str) -> DesiredState {
    let mut cm = ConcurrencyModel::new(model);
    for (i, k) in TUNING_KEYS.iter().enumerate() {
        cm = cm.with_tuning(*k, 10 * (i as i64 + 1));
    }
    let mut d = DesiredState::new(cm);
    d.general = GeneralOptions {
        options: Some(["FollowSymLinks".to_string()].into()),
        hostname_lookups: Some(OnOff::Off),
        allow_override: Some("None".to_string()),
        enable_mmap: Some(OnOff::Off),
        enable_sendfile: Some(OnOff::On),
    };
    d.security = SecuritySettings {
        ssl_protocol: Some("-all +TLSv1.2".to_string()),
        ssl_cipher_suite: Some("HIGH:!aNULL".to_string()),
        ssl_honor_cipher_order: Some(OnOff::On),
        strict_transport_security: Some("max-age=31536000".to_string()),
        header_rules: Default::default(),
    };
    d.php_exposure = Some(false);
    d
}

#[test]
fn scenario_switch_from_prefork_to_event_with_cache() {
    let mut desired = full_desired("event");
    desired.module_flags.insert("cache".to_string(), true);

    let actual = HostState {
        active_concurrency_model: Some("prefork".to_string()),
        ..HostState::default()
    };

    let p = plan(&desired, &actual, &ModuleRegistry::standard()).unwrap();

    assert_eq!(
        p.actions[0],
        Action::SwitchConcurrencyModel {
            from: Some("prefork".to_string()),
            to: "event".to_string(),
            dependents: vec![],
        }
    );
    assert!(p.contains(&Action::EnableModule {
        name: "cache".to_string()
    }));

    let writes = p
        .iter()
        .filter(|a| matches!(a, Action::WriteFragment { .. }))
        .count();
    let includes = p
        .iter()
        .filter(|a| matches!(a, Action::RegisterInclude { .. }))
        .count();
    assert_eq!(writes, 4);
    assert_eq!(includes, 4);

    assert_eq!(p.actions.last(), Some(&Action::RestartService));
    assert_eq!(
        p.iter().filter(|a| **a == Action::RestartService).count(),
        1
    );
    assert!(p.render_failures.is_empty());
}

#[test]
fn scenario_switch_precedes_every_write_and_restart() {
    for (active, model) in [("prefork", "event"), ("event", "worker"), ("worker", "prefork")] {
        let desired = full_desired(model);
        let actual = HostState {
            active_concurrency_model: Some(active.to_string()),
            enabled_modules: [concurrency_module_name(active)].into(),
            ..HostState::default()
        };

        let p = plan(&desired, &actual, &ModuleRegistry::standard()).unwrap();
        let switch = p
            .position(|a| matches!(a, Action::SwitchConcurrencyModel { .. }))
            .expect("switch planned");

        for (i, a) in p.iter().enumerate() {
            if matches!(a, Action::WriteFragment { .. } | Action::RestartService) {
                assert!(switch < i, "{a} planned before the switch");
            }
        }
    }
}

#[test]
fn scenario_prefork_only_module_is_enabled_after_the_switch() {
    let mut desired = full_desired("prefork");
    desired.required_modules.push("php8.2".to_string());

    let actual = HostState {
        active_concurrency_model: Some("event".to_string()),
        enabled_modules: ["mpm_event".to_string()].into(),
        ..HostState::default()
    };

    let registry = ModuleRegistry::standard().with_extra(["php8.2"]);
    let p = plan(&desired, &actual, &registry).unwrap();
    let enable_php = p
        .position(|a| {
            *a == Action::EnableModule {
                name: "php8.2".to_string(),
            }
        })
        .expect("php enable planned");
    assert!(matches!(p.actions[0], Action::SwitchConcurrencyModel { .. }));
    assert!(enable_php > 0);
}

#[test]
fn scenario_tuning_change_without_switch_rewrites_fragment() {
    let desired = full_desired("event");
    let rendered = hcv_render::render(&desired);

    let mut actual = HostState {
        active_concurrency_model: Some("event".to_string()),
        enabled_modules: ["mpm_event".to_string()].into(),
        ..HostState::default()
    }
    .with_files(rendered.fragments.clone(), FragmentKind::ALL.into());

    actual.fragments.insert(
        FragmentKind::ConcurrencyModel,
        "<IfModule mpm_event_module>\n    StartServers 1\n</IfModule>\n".to_string(),
    );

    let p = plan(&desired, &actual, &ModuleRegistry::standard()).unwrap();
    assert_eq!(p.len(), 2);
    assert!(matches!(
        &p.actions[0],
        Action::WriteFragment { fragment: FragmentKind::ConcurrencyModel, .. }
    ));
    assert_eq!(p.actions[1], Action::RestartService);
}
