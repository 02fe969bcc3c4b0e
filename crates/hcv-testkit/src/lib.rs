use anyhow::{Context, Result};
use hcv_model::{
    ConcurrencyModel, DesiredState, GeneralOptions, HostState, OnOff, SecuritySettings,
    TUNING_KEYS,
};
use std::fs;
use std::path::{Path, PathBuf};

mod fake_host;

pub use fake_host::{mutation_counts, Fault, FakeHost};

/// A desired state with every fragment field present.
pub fn full_desired_state(model: &str) -> DesiredState {
    let tuning = [25, 75, 250, 64, 25, 0, 400, 16];
    let mut cm = ConcurrencyModel::new(model);
    for (k, v) in TUNING_KEYS.iter().zip(tuning) {
        cm = cm.with_tuning(*k, v);
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
        ssl_protocol: Some("-all +TLSv1.2 +TLSv1.3".to_string()),
        ssl_cipher_suite: Some("HIGH:!aNULL:!MD5".to_string()),
        ssl_honor_cipher_order: Some(OnOff::On),
        strict_transport_security: Some("max-age=63072000; includeSubDomains".to_string()),
        header_rules: [
            (
                "XFrameOptions".to_string(),
                "Header always set X-Frame-Options DENY".to_string(),
            ),
            (
                "XContentTypeOptions".to_string(),
                "Header always set X-Content-Type-Options nosniff".to_string(),
            ),
        ]
        .into(),
    };
    d.php_exposure = Some(false);
    d
}

/// Temporary fragment directory plus a main configuration file.
pub struct ConfigTree {
    pub dir: tempfile::TempDir,
    pub fragment_dir: PathBuf,
    pub main_config: PathBuf,
}

impl ConfigTree {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp config tree")?;
        let fragment_dir = dir.path().join("conf-available");
        let main_config = dir.path().join("apache2.conf");
        fs::write(
            &main_config,
            "ServerRoot \"/etc/apache2\"\nIncludeOptional mods-enabled/*.load\n",
        )
        .with_context(|| format!("write {}", main_config.display()))?;
        Ok(Self {
            dir,
            fragment_dir,
            main_config,
        })
    }

    pub fn main_config_text(&self) -> Result<String> {
        fs::read_to_string(&self.main_config)
            .with_context(|| format!("read {}", self.main_config.display()))
    }
}

/// Serialize a [`HostState`] the way `hcv plan --assume-host` reads it.
pub fn write_host_snapshot(dir: &Path, name: &str, state: &HostState) -> Result<PathBuf> {
    let path = dir.join(name);
    let body = serde_json::to_string_pretty(state).context("serialize host snapshot")?;
    fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

pub fn write_yaml(dir: &Path, name: &str, body: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

/// Document shape accepted by `hcv-config`, matching [`full_desired_state`]
/// for the `event` model plus `mod_cache`.
pub const BASE_YAML: &str = r#"
Options:
  - FollowSymLinks
HostnameLookups: "Off"
AllowOverride: None
EnableMMAP: "Off"
EnableSendfile: "On"

Modules:
  mpm: event
  mod_cache: true
  mod_deflate: false

MPM_Modules:
  StartServers: 25
  MinSpareThreads: 75
  MaxSpareThreads: 250
  ThreadLimit: 64
  ThreadsPerChild: 25
  MaxConnectionsPerChild: 0
  MaxRequestWorkers: 400
  ServerLimit: 16

Required_Modules:
  - rewrite
  - headers

Security:
  SSLProtocol: "-all +TLSv1.2 +TLSv1.3"
  SSLCipherSuite: "HIGH:!aNULL:!MD5"
  SSLHonorCipherOrder: "On"
  StrictTransportSecurity: "max-age=63072000; includeSubDomains"

Rules:
  XFrameOptions: "Header always set X-Frame-Options DENY"
  XContentTypeOptions: "Header always set X-Content-Type-Options nosniff"

PHP:
  expose_php: false
"#;
