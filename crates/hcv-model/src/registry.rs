//! Module registry: explicit name -> handler mapping.
//!
//! Every module the engine may enable or disable must resolve here before a
//! plan is built. Unknown names fail fast at planning time instead of
//! surfacing halfway through execution.

use std::collections::BTreeMap;

use crate::types::{concurrency_module_name, packaged_concurrency_model, CONCURRENCY_MODELS};

/// Stock Debian apache2 modules the engine manages out of the box.
const STANDARD_MODULES: &[&str] = &[
    "access_compat",
    "actions",
    "alias",
    "allowmethods",
    "auth_basic",
    "auth_digest",
    "authn_core",
    "authn_file",
    "authz_core",
    "authz_host",
    "authz_user",
    "autoindex",
    "brotli",
    "cache",
    "cache_disk",
    "cache_socache",
    "cgi",
    "cgid",
    "deflate",
    "dir",
    "env",
    "expires",
    "filter",
    "headers",
    "http2",
    "include",
    "mime",
    "negotiation",
    "proxy",
    "proxy_balancer",
    "proxy_fcgi",
    "proxy_http",
    "proxy_wstunnel",
    "ratelimit",
    "remoteip",
    "reqtimeout",
    "rewrite",
    "security2",
    "setenvif",
    "socache_shmcb",
    "ssl",
    "status",
    "userdir",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleKind {
    /// Ordinary module, enabled/disabled independently.
    Optional,
    /// Mutually exclusive concurrency-model module (`mpm_*`).
    ConcurrencyModel,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleHandler {
    /// Name as understood by the host's enable/disable tooling.
    pub name: String,
    pub kind: ModuleKind,
    /// The module only loads under this concurrency model (`php8.2` -> `prefork`).
    pub requires_concurrency_model: Option<String>,
}

impl ModuleHandler {
    pub fn is_concurrency_model(&self) -> bool {
        self.kind == ModuleKind::ConcurrencyModel
    }
}

/// Strip the `mod_` document prefix (`mod_cache` -> `cache`).
pub fn normalize_module_name(name: &str) -> &str {
    let name = name.trim();
    name.strip_prefix("mod_").unwrap_or(name)
}

#[derive(Clone, Debug, Default)]
pub struct ModuleRegistry {
    handlers: BTreeMap<String, ModuleHandler>,
}

impl ModuleRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Standard module set plus the three concurrency models.
    pub fn standard() -> Self {
        let mut reg = Self::empty();
        for m in STANDARD_MODULES {
            reg.register(m, ModuleKind::Optional);
        }
        for model in CONCURRENCY_MODELS {
            reg.register(&concurrency_module_name(model), ModuleKind::ConcurrencyModel);
        }
        reg
    }

    /// Extend with site-specific optional modules (e.g. `php8.2`).
    pub fn with_extra<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for n in names {
            self.register(n.as_ref(), ModuleKind::Optional);
        }
        self
    }

    pub fn register(&mut self, name: &str, kind: ModuleKind) {
        let name = normalize_module_name(name).to_string();
        let requires_concurrency_model = match kind {
            ModuleKind::Optional => packaged_concurrency_model(&name).map(str::to_string),
            ModuleKind::ConcurrencyModel => None,
        };
        self.handlers.insert(
            name.clone(),
            ModuleHandler {
                name,
                kind,
                requires_concurrency_model,
            },
        );
    }

    /// Register an optional module that only loads under `model`.
    pub fn register_dependent(&mut self, name: &str, model: &str) {
        let name = normalize_module_name(name).to_string();
        self.handlers.insert(
            name.clone(),
            ModuleHandler {
                name,
                kind: ModuleKind::Optional,
                requires_concurrency_model: Some(model.to_string()),
            },
        );
    }

    pub fn resolve(&self, name: &str) -> Option<&ModuleHandler> {
        self.handlers.get(normalize_module_name(name))
    }

    /// Concurrency model `name` depends on. Host modules outside the
    /// registry fall back to the packaging rule.
    pub fn required_concurrency_model(&self, name: &str) -> Option<String> {
        match self.resolve(name) {
            Some(h) => h.requires_concurrency_model.clone(),
            None => packaged_concurrency_model(normalize_module_name(name)).map(str::to_string),
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mod_prefix_is_stripped() {
        assert_eq!(normalize_module_name("mod_cache"), "cache");
        assert_eq!(normalize_module_name("cache"), "cache");
        assert_eq!(normalize_module_name(" mod_deflate "), "deflate");
    }

    #[test]
    fn standard_registry_resolves_document_spellings() {
        let reg = ModuleRegistry::standard();
        let h = reg.resolve("mod_cache").expect("cache known");
        assert_eq!(h.name, "cache");
        assert_eq!(h.kind, ModuleKind::Optional);
        assert!(reg.resolve("mod_does_not_exist").is_none());
    }

    #[test]
    fn concurrency_models_are_tagged() {
        let reg = ModuleRegistry::standard();
        for model in CONCURRENCY_MODELS {
            let h = reg.resolve(&format!("mpm_{model}")).expect("mpm known");
            assert!(h.is_concurrency_model());
        }
        assert!(!reg.resolve("rewrite").expect("rewrite").is_concurrency_model());
    }

    #[test]
    fn php_modules_depend_on_prefork() {
        let mut reg = ModuleRegistry::standard().with_extra(["php8.2"]);
        assert_eq!(reg.required_concurrency_model("php8.2").as_deref(), Some("prefork"));
        // Unregistered host modules use the same rule.
        assert_eq!(reg.required_concurrency_model("php7.4").as_deref(), Some("prefork"));
        assert_eq!(reg.required_concurrency_model("cache"), None);
        assert_eq!(reg.required_concurrency_model("phpmyadmin"), None);

        reg.register_dependent("legacy_cgi", "worker");
        assert_eq!(reg.required_concurrency_model("legacy_cgi").as_deref(), Some("worker"));
    }

    #[test]
    fn extra_modules_extend_the_registry() {
        let reg = ModuleRegistry::standard().with_extra(["php8.2", "mod_evasive"]);
        assert!(reg.resolve("php8.2").is_some());
        assert_eq!(reg.resolve("mod_evasive").map(|h| h.name.as_str()), Some("evasive"));
    }
}
