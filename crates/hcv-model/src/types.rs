use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Concurrency models the engine knows how to switch between.
pub const CONCURRENCY_MODELS: &[&str] = &["prefork", "worker", "event"];

/// Tuning directives of the concurrency-model fragment, in render order.
pub const TUNING_KEYS: &[&str] = &[
    "StartServers",
    "MinSpareThreads",
    "MaxSpareThreads",
    "ThreadLimit",
    "ThreadsPerChild",
    "MaxConnectionsPerChild",
    "MaxRequestWorkers",
    "ServerLimit",
];

/// Host module name of a concurrency model (`event` -> `mpm_event`).
pub fn concurrency_module_name(model: &str) -> String {
    format!("mpm_{model}")
}

/// Inverse of [`concurrency_module_name`]. Returns `None` for ordinary modules.
pub fn concurrency_model_of(module: &str) -> Option<&str> {
    module.strip_prefix("mpm_")
}

/// Concurrency model a module is packaged to depend on.
///
/// Debian's `libapache2-mod-php*` modules (`php`, `php7.4`, `php8.2`, ...)
/// declare `Depends: mpm_prefork`; `a2dismod mpm_prefork` refuses while one
/// is enabled, and `a2enmod` refuses one under another model.
pub fn packaged_concurrency_model(module: &str) -> Option<&'static str> {
    let version = module.strip_prefix("php")?;
    if version.chars().all(|c| c.is_ascii_digit() || c == '.') {
        Some("prefork")
    } else {
        None
    }
}

/// Boolean-like directive value, rendered verbatim as `On` / `Off`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OnOff {
    On,
    Off,
}

impl OnOff {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnOff::On => "On",
            OnOff::Off => "Off",
        }
    }

    pub fn from_bool(b: bool) -> Self {
        if b {
            OnOff::On
        } else {
            OnOff::Off
        }
    }

    /// Accepts the declared tokens only (case-sensitive, like the directive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "On" => Some(OnOff::On),
            "Off" => Some(OnOff::Off),
            _ => None,
        }
    }
}

impl fmt::Display for OnOff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-wide directives of the general fragment.
///
/// Every scalar is optional so a missing field stays visible to the renderer,
/// which refuses to fill in defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralOptions {
    pub options: Option<BTreeSet<String>>,
    pub hostname_lookups: Option<OnOff>,
    pub allow_override: Option<String>,
    pub enable_mmap: Option<OnOff>,
    pub enable_sendfile: Option<OnOff>,
}

/// The designated concurrency model and its worker-pool tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyModel {
    /// One of [`CONCURRENCY_MODELS`].
    pub name: String,
    /// Tuning directive -> value. Expected keys are [`TUNING_KEYS`].
    #[serde(default)]
    pub tuning: BTreeMap<String, i64>,
}

impl ConcurrencyModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tuning: BTreeMap::new(),
        }
    }

    pub fn with_tuning(mut self, key: impl Into<String>, value: i64) -> Self {
        self.tuning.insert(key.into(), value);
        self
    }

    pub fn module_name(&self) -> String {
        concurrency_module_name(&self.name)
    }
}

/// TLS and response-header settings of the security fragment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecuritySettings {
    pub ssl_protocol: Option<String>,
    pub ssl_cipher_suite: Option<String>,
    pub ssl_honor_cipher_order: Option<OnOff>,
    pub strict_transport_security: Option<String>,
    /// Rule name -> header directive line, rendered verbatim.
    #[serde(default)]
    pub header_rules: BTreeMap<String, String>,
}

/// Target configuration of one web-server host.
///
/// Owned by the caller; the engine only reads it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    #[serde(default)]
    pub general: GeneralOptions,
    pub concurrency_model: ConcurrencyModel,
    /// Optional module -> desired enabled.
    #[serde(default)]
    pub module_flags: BTreeMap<String, bool>,
    /// Modules that must be enabled, in install order.
    #[serde(default)]
    pub required_modules: Vec<String>,
    #[serde(default)]
    pub security: SecuritySettings,
    pub php_exposure: Option<bool>,
}

impl DesiredState {
    /// A desired state that only designates a concurrency model.
    pub fn new(concurrency_model: ConcurrencyModel) -> Self {
        Self {
            general: GeneralOptions::default(),
            concurrency_model,
            module_flags: BTreeMap::new(),
            required_modules: Vec::new(),
            security: SecuritySettings::default(),
            php_exposure: None,
        }
    }
}

/// One generated configuration file. The file name is the fragment's id.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    General,
    ConcurrencyModel,
    Security,
    Php,
}

impl FragmentKind {
    pub const ALL: [FragmentKind; 4] = [
        FragmentKind::General,
        FragmentKind::ConcurrencyModel,
        FragmentKind::Security,
        FragmentKind::Php,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            FragmentKind::General => "general_config.conf",
            FragmentKind::ConcurrencyModel => "mpm_config.conf",
            FragmentKind::Security => "security_config.conf",
            FragmentKind::Php => "php_config.conf",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FragmentKind::General => "general",
            FragmentKind::ConcurrencyModel => "concurrency_model",
            FragmentKind::Security => "security",
            FragmentKind::Php => "php",
        }
    }
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of what the host actually runs.
///
/// Taken fresh at the start of every reconciliation cycle and after any
/// action that may have changed it. Never mutated in place by the engine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostState {
    /// `None` when the host could not tell; never a guessed default.
    pub active_concurrency_model: Option<String>,
    #[serde(default)]
    pub enabled_modules: BTreeSet<String>,
    /// Fragment files currently on disk.
    #[serde(default)]
    pub fragments: BTreeMap<FragmentKind, String>,
    /// Fragments already referenced from the main configuration.
    #[serde(default)]
    pub registered_includes: BTreeSet<FragmentKind>,
}

impl HostState {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self, module: &str) -> bool {
        self.enabled_modules.contains(module)
    }

    /// Concurrency models that appear enabled: every `mpm_*` module plus the
    /// model the server reports as active.
    pub fn concurrency_models_enabled(&self) -> BTreeSet<String> {
        let mut out: BTreeSet<String> = self
            .enabled_modules
            .iter()
            .filter_map(|m| concurrency_model_of(m))
            .map(str::to_string)
            .collect();
        if let Some(active) = &self.active_concurrency_model {
            out.insert(active.clone());
        }
        out
    }

    /// Replace the filesystem half of the snapshot.
    pub fn with_files(
        mut self,
        fragments: BTreeMap<FragmentKind, String>,
        registered_includes: BTreeSet<FragmentKind>,
    ) -> Self {
        self.fragments = fragments;
        self.registered_includes = registered_includes;
        self
    }
}
