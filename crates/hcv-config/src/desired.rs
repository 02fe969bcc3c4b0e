use anyhow::{anyhow, bail, Context, Result};
use hcv_model::{
    ConcurrencyModel, DesiredState, GeneralOptions, HostState, OnOff, SecuritySettings,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// Map a merged document onto a [`DesiredState`].
///
/// Absent scalars stay `None` (the renderer reports them); absent sections
/// become empty. `Modules.mpm` is the one mandatory key.
pub fn desired_state_from_json(doc: &Value) -> Result<DesiredState> {
    let root = doc
        .as_object()
        .ok_or_else(|| anyhow!("desired-state document must be a mapping"))?;

    let modules = object_at(root, "Modules")?
        .ok_or_else(|| anyhow!("missing required section `Modules`"))?;
    let mpm = modules
        .get("mpm")
        .ok_or_else(|| anyhow!("missing required key `Modules.mpm`"))?
        .as_str()
        .ok_or_else(|| anyhow!("`Modules.mpm` must be a string"))?;
    let model_name = mpm.trim().strip_prefix("mpm_").unwrap_or(mpm.trim());

    let mut cm = ConcurrencyModel::new(model_name);
    if let Some(tuning) = object_at(root, "MPM_Modules")? {
        for (k, v) in tuning {
            let n = v
                .as_i64()
                .ok_or_else(|| anyhow!("`MPM_Modules.{k}` must be an integer, got {v}"))?;
            cm.tuning.insert(k.clone(), n);
        }
    }

    let mut desired = DesiredState::new(cm);

    for (k, v) in modules.iter().filter(|(k, _)| k.as_str() != "mpm") {
        let want = v
            .as_bool()
            .ok_or_else(|| anyhow!("`Modules.{k}` must be a boolean, got {v}"))?;
        desired.module_flags.insert(k.clone(), want);
    }

    desired.general = GeneralOptions {
        options: options_at(root)?,
        hostname_lookups: on_off_at(root, "HostnameLookups")?,
        allow_override: string_at(root, "AllowOverride")?,
        enable_mmap: on_off_at(root, "EnableMMAP")?,
        enable_sendfile: on_off_at(root, "EnableSendfile")?,
    };

    if let Some(list) = root.get("Required_Modules").filter(|v| !v.is_null()) {
        let list = list
            .as_array()
            .ok_or_else(|| anyhow!("`Required_Modules` must be a list"))?;
        for (i, v) in list.iter().enumerate() {
            let name = v
                .as_str()
                .ok_or_else(|| anyhow!("`Required_Modules[{i}]` must be a string, got {v}"))?;
            desired.required_modules.push(name.to_string());
        }
    }

    let mut security = SecuritySettings::default();
    if let Some(sec) = object_at(root, "Security")? {
        security.ssl_protocol = string_at(sec, "SSLProtocol").context("Security")?;
        security.ssl_cipher_suite = string_at(sec, "SSLCipherSuite").context("Security")?;
        security.ssl_honor_cipher_order =
            on_off_at(sec, "SSLHonorCipherOrder").context("Security")?;
        security.strict_transport_security =
            string_at(sec, "StrictTransportSecurity").context("Security")?;
    }
    if let Some(rules) = object_at(root, "Rules")? {
        let mut header_rules = BTreeMap::new();
        for (k, v) in rules {
            let line = v
                .as_str()
                .ok_or_else(|| anyhow!("`Rules.{k}` must be a string, got {v}"))?;
            header_rules.insert(k.clone(), line.to_string());
        }
        security.header_rules = header_rules;
    }
    desired.security = security;

    if let Some(php) = object_at(root, "PHP")? {
        desired.php_exposure = on_off_at(php, "expose_php")
            .context("PHP")?
            .map(|v| v == OnOff::On);
    }

    Ok(desired)
}

/// Read a captured [`HostState`] snapshot (JSON) for offline planning.
pub fn load_host_snapshot(path: &Path) -> Result<HostState> {
    let s = fs::read_to_string(path)
        .with_context(|| format!("read host snapshot: {}", path.display()))?;
    let state: HostState = serde_json::from_str(&s).context("parse host snapshot json")?;
    Ok(state)
}

// ---------------------------------------------------------------------------
// Field readers
// ---------------------------------------------------------------------------

fn object_at<'a>(m: &'a Map<String, Value>, key: &str) -> Result<Option<&'a Map<String, Value>>> {
    match m.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(o)) => Ok(Some(o)),
        Some(other) => bail!("`{key}` must be a mapping, got {other}"),
    }
}

fn string_at(m: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match m.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => bail!("`{key}` must be a string, got {other}"),
    }
}

/// `On`/`Off` tokens or a YAML boolean.
fn on_off_at(m: &Map<String, Value>, key: &str) -> Result<Option<OnOff>> {
    match m.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(OnOff::from_bool(*b))),
        Some(Value::String(s)) => OnOff::parse(s)
            .map(Some)
            .ok_or_else(|| anyhow!("`{key}` must be On or Off, got {s:?}")),
        Some(other) => bail!("`{key}` must be On or Off, got {other}"),
    }
}

/// A list of option names or a single space-separated string.
fn options_at(m: &Map<String, Value>) -> Result<Option<BTreeSet<String>>> {
    match m.get("Options") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.split_whitespace().map(str::to_string).collect())),
        Some(Value::Array(items)) => {
            let mut out = BTreeSet::new();
            for (i, v) in items.iter().enumerate() {
                let s = v
                    .as_str()
                    .ok_or_else(|| anyhow!("`Options[{i}]` must be a string, got {v}"))?;
                out.insert(s.to_string());
            }
            Ok(Some(out))
        }
        Some(other) => bail!("`Options` must be a list or string, got {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mpm_prefix_is_accepted() {
        let d = desired_state_from_json(&json!({"Modules": {"mpm": "mpm_worker"}})).unwrap();
        assert_eq!(d.concurrency_model.name, "worker");
    }

    #[test]
    fn expose_php_accepts_bool_and_tokens() {
        let a = desired_state_from_json(&json!({"Modules": {"mpm": "event"}, "PHP": {"expose_php": "On"}}))
            .unwrap();
        assert_eq!(a.php_exposure, Some(true));
        let b = desired_state_from_json(&json!({"Modules": {"mpm": "event"}, "PHP": {"expose_php": false}}))
            .unwrap();
        assert_eq!(b.php_exposure, Some(false));
    }

    #[test]
    fn options_string_is_split() {
        let d = desired_state_from_json(
            &json!({"Modules": {"mpm": "event"}, "Options": "Indexes FollowSymLinks"}),
        )
        .unwrap();
        assert_eq!(d.general.options.unwrap().len(), 2);
    }
}
