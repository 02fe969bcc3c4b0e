use hcv_model::*;
use hcv_plan::*;

fn full_desired() -> DesiredState {
    let mut cm = ConcurrencyModel::new("worker");
    for k in TUNING_KEYS {
        cm = cm.with_tuning(*k, 64);
    }
    let mut d = DesiredState::new(cm);
    d.general = GeneralOptions {
        options: Some(["FollowSymLinks".to_string(), "MultiViews".to_string()].into()),
        hostname_lookups: Some(OnOff::Off),
        allow_override: Some("All".to_string()),
        enable_mmap: Some(OnOff::On),
        enable_sendfile: Some(OnOff::Off),
    };
    d.security = SecuritySettings {
        ssl_protocol: Some("-all +TLSv1.3".to_string()),
        ssl_cipher_suite: Some("HIGH".to_string()),
        ssl_honor_cipher_order: Some(OnOff::Off),
        strict_transport_security: Some("max-age=600".to_string()),
        header_rules: [(
            "XFrameOptions".to_string(),
            "Header always set X-Frame-Options SAMEORIGIN".to_string(),
        )]
        .into(),
    };
    d.php_exposure = Some(true);
    d.required_modules = vec!["rewrite".to_string(), "mod_headers".to_string()];
    d.module_flags.insert("mod_cache".to_string(), true);
    d.module_flags.insert("deflate".to_string(), false);
    d.module_flags.insert("status".to_string(), false);
    d
}

/// What a successful apply does to the host, without any host.
fn simulate(actual: &HostState, p: &ActionPlan) -> HostState {
    let mut next = actual.clone();
    for a in p {
        match a {
            Action::EnableModule { name } => {
                next.enabled_modules.insert(name.clone());
            }
            Action::DisableModule { name } => {
                next.enabled_modules.remove(name);
            }
            Action::SwitchConcurrencyModel {
                from,
                to,
                dependents,
            } => {
                for d in dependents {
                    next.enabled_modules.remove(d);
                }
                if let Some(f) = from {
                    next.enabled_modules.remove(&concurrency_module_name(f));
                }
                next.enabled_modules.insert(concurrency_module_name(to));
                next.active_concurrency_model = Some(to.clone());
            }
            Action::WriteFragment { fragment, content } => {
                next.fragments.insert(*fragment, content.clone());
            }
            Action::RegisterInclude { fragment } => {
                next.registered_includes.insert(*fragment);
            }
            Action::RestartService => {}
        }
    }
    next
}

#[test]
fn scenario_second_plan_after_apply_is_empty() {
    let desired = full_desired();
    let registry = ModuleRegistry::standard();

    let actual = HostState {
        active_concurrency_model: Some("event".to_string()),
        enabled_modules: ["mpm_event", "deflate", "status", "ssl"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        ..HostState::default()
    };

    let first = plan(&desired, &actual, &registry).unwrap();
    assert!(!first.is_empty());

    let after = simulate(&actual, &first);
    let second = plan(&desired, &after, &registry).unwrap();
    assert!(second.is_empty(), "second plan not empty: {:?}", second.actions);
}

#[test]
fn scenario_matching_host_yields_empty_plan() {
    let desired = full_desired();
    let rendered = hcv_render::render(&desired);

    let actual = HostState {
        active_concurrency_model: Some("worker".to_string()),
        enabled_modules: ["mpm_worker", "rewrite", "headers", "cache"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        ..HostState::default()
    }
    .with_files(rendered.fragments, FragmentKind::ALL.into());

    let p = plan(&desired, &actual, &ModuleRegistry::standard()).unwrap();
    assert!(p.is_empty());
    assert!(p.render_failures.is_empty());
}

#[test]
fn scenario_no_plan_enables_and_disables_same_module() {
    let registry = ModuleRegistry::standard();
    let desired = full_desired();

    let hosts = [
        HostState::default(),
        HostState {
            active_concurrency_model: Some("worker".to_string()),
            enabled_modules: ["cache", "deflate", "rewrite"].iter().map(|s| s.to_string()).collect(),
            ..HostState::default()
        },
    ];

    for actual in &hosts {
        let p = plan(&desired, actual, &registry).unwrap();
        for a in &p {
            if let Action::EnableModule { name } = a {
                assert!(!p.contains(&Action::DisableModule { name: name.clone() }));
            }
        }
    }
}
