use hcv_config::{desired_state_from_json, load_layered_yaml_from_strings};
use hcv_model::OnOff;

const DOC: &str = r#"
Options:
  - FollowSymLinks
  - Indexes
HostnameLookups: "Off"
AllowOverride: None
EnableMMAP: false
EnableSendfile: "On"
Modules:
  mpm: event
  mod_cache: true
  mod_deflate: false
MPM_Modules:
  StartServers: 2
  MinSpareThreads: 25
  MaxSpareThreads: 75
  ThreadLimit: 64
  ThreadsPerChild: 25
  MaxConnectionsPerChild: 0
  MaxRequestWorkers: 150
  ServerLimit: 6
Required_Modules:
  - rewrite
Security:
  SSLProtocol: "-all +TLSv1.2"
  SSLCipherSuite: "HIGH:!aNULL"
  SSLHonorCipherOrder: "On"
  StrictTransportSecurity: "max-age=31536000"
Rules:
  XFrameOptions: "Header always set X-Frame-Options DENY"
PHP:
  expose_php: "Off"
"#;

fn load(docs: &[&str]) -> anyhow::Result<hcv_model::DesiredState> {
    let loaded = load_layered_yaml_from_strings(docs)?;
    desired_state_from_json(&loaded.config_json)
}

#[test]
fn full_document_maps_every_section() {
    let d = load(&[DOC]).unwrap();

    assert_eq!(d.concurrency_model.name, "event");
    assert_eq!(d.concurrency_model.tuning.len(), 8);
    assert_eq!(d.concurrency_model.tuning["MaxRequestWorkers"], 150);
    assert_eq!(d.module_flags.get("mod_cache"), Some(&true));
    assert_eq!(d.module_flags.get("mod_deflate"), Some(&false));
    assert!(!d.module_flags.contains_key("mpm"));
    assert_eq!(d.required_modules, vec!["rewrite".to_string()]);

    assert_eq!(d.general.enable_mmap, Some(OnOff::Off));
    assert_eq!(d.general.enable_sendfile, Some(OnOff::On));
    assert_eq!(d.general.allow_override.as_deref(), Some("None"));
    assert_eq!(d.security.ssl_honor_cipher_order, Some(OnOff::On));
    assert_eq!(d.security.header_rules.len(), 1);
    assert_eq!(d.php_exposure, Some(false));

    assert!(hcv_render::render(&d).is_complete());
}

#[test]
fn absent_sections_are_empty_not_defaulted() {
    let d = load(&["Modules:\n  mpm: worker\n"]).unwrap();
    assert!(d.module_flags.is_empty());
    assert!(d.required_modules.is_empty());
    assert!(d.security.header_rules.is_empty());
    assert_eq!(d.general.hostname_lookups, None);
    assert_eq!(d.php_exposure, None);
}

#[test]
fn missing_mpm_is_a_load_error() {
    let err = load(&["Modules:\n  mod_cache: true\n"]).unwrap_err();
    assert!(err.to_string().contains("Modules.mpm"));
}

#[test]
fn non_boolean_module_flag_is_a_type_error() {
    let err = load(&["Modules:\n  mpm: event\n  mod_cache: \"yes\"\n"]).unwrap_err();
    assert!(err.to_string().contains("Modules.mod_cache"));
}

#[test]
fn non_integer_tuning_is_a_type_error() {
    let err = load(&["Modules:\n  mpm: event\nMPM_Modules:\n  ServerLimit: lots\n"]).unwrap_err();
    assert!(err.to_string().contains("MPM_Modules.ServerLimit"));
}

#[test]
fn invalid_on_off_token_is_rejected() {
    let err = load(&["Modules:\n  mpm: event\nHostnameLookups: maybe\n"]).unwrap_err();
    assert!(err.to_string().contains("HostnameLookups"));
}
