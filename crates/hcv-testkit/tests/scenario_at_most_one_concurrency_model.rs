use hcv_exec::{ApplyOptions, FragmentStore};
use hcv_model::ModuleRegistry;
use hcv_runtime::run_cycle;
use hcv_testkit::{full_desired_state, ConfigTree, Fault, FakeHost};

fn fault_sets() -> Vec<Vec<Fault>> {
    vec![
        vec![],
        vec![Fault::Disable("mpm_prefork".to_string())],
        vec![Fault::Enable("mpm_event".to_string())],
        vec![Fault::EnableNoop("mpm_event".to_string())],
        vec![
            Fault::Enable("mpm_event".to_string()),
            Fault::Enable("mpm_prefork".to_string()),
        ],
        vec![
            Fault::EnableNoop("mpm_event".to_string()),
            Fault::Disable("mpm_event".to_string()),
        ],
        vec![Fault::Restart],
    ]
}

/// Whatever fails during a prefork -> event switch, the host never has two
/// concurrency models enabled at once, and a failed switch leaves prefork.
#[test]
fn scenario_at_most_one_concurrency_model_under_faults() {
    for faults in fault_sets() {
        let tree = ConfigTree::new().unwrap();
        let store = FragmentStore::new(&tree.fragment_dir, &tree.main_config);
        let host = FakeHost::new("safety-01", ["mpm_prefork"]);
        for f in &faults {
            host.inject(f.clone());
        }

        let report = run_cycle(
            &full_desired_state("event"),
            &host,
            &store,
            &ModuleRegistry::standard(),
            &ApplyOptions::default(),
        )
        .unwrap();

        assert!(
            host.max_concurrency_models_enabled() <= 1,
            "faults {faults:?}: saw {} models enabled",
            host.max_concurrency_models_enabled()
        );

        let models = host.concurrency_models_enabled();
        if report.plan_fatal {
            assert!(
                models.is_empty() || models == vec!["prefork".to_string()],
                "faults {faults:?}: left {models:?}"
            );
            assert_eq!(host.restarts(), 0, "faults {faults:?}");
        } else {
            assert_eq!(models, vec!["event".to_string()], "faults {faults:?}");
        }
    }
}

/// The no-fault and restart-fault cases still complete the switch; only the
/// switch failures are fatal.
#[test]
fn scenario_only_switch_failures_are_fatal() {
    let cases = [
        (vec![], false),
        (vec![Fault::Restart], false),
        (vec![Fault::Enable("mpm_event".to_string())], true),
    ];
    for (faults, fatal) in cases {
        let tree = ConfigTree::new().unwrap();
        let store = FragmentStore::new(&tree.fragment_dir, &tree.main_config);
        let host = FakeHost::new("safety-02", ["mpm_prefork"]);
        for f in faults {
            host.inject(f);
        }
        let report = run_cycle(
            &full_desired_state("event"),
            &host,
            &store,
            &ModuleRegistry::standard(),
            &ApplyOptions::default(),
        )
        .unwrap();
        assert_eq!(report.plan_fatal, fatal);
    }
}
