//! hcv-render
//!
//! Pure text rendering of the four configuration fragments from a
//! [`DesiredState`]. No IO, no defaults: an absent required field is a
//! [`TemplateError`] for that fragment only, the other fragments still render.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use hcv_model::{DesiredState, FragmentKind, OnOff, TUNING_KEYS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TemplateError {
    #[error("fragment `{fragment}` is missing required field `{field}`")]
    MissingField { fragment: FragmentKind, field: String },
}

impl TemplateError {
    fn missing(fragment: FragmentKind, field: &str) -> Self {
        TemplateError::MissingField {
            fragment,
            field: field.to_string(),
        }
    }
}

/// Result of rendering every fragment of a desired state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOutput {
    pub fragments: BTreeMap<FragmentKind, String>,
    pub failures: BTreeMap<FragmentKind, TemplateError>,
}

impl RenderOutput {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub fn render(desired: &DesiredState) -> RenderOutput {
    let mut out = RenderOutput::default();
    for kind in FragmentKind::ALL {
        match render_fragment(kind, desired) {
            Ok(text) => {
                out.fragments.insert(kind, text);
            }
            Err(e) => {
                out.failures.insert(kind, e);
            }
        }
    }
    out
}

pub fn render_fragment(kind: FragmentKind, desired: &DesiredState) -> Result<String, TemplateError> {
    match kind {
        FragmentKind::General => render_general(desired),
        FragmentKind::ConcurrencyModel => render_concurrency_model(desired),
        FragmentKind::Security => render_security(desired),
        FragmentKind::Php => render_php(desired),
    }
}

/// Directive that references a fragment file from the main configuration.
pub fn include_line(path: &Path) -> String {
    format!("Include {}", path.display())
}

// ---------------------------------------------------------------------------
// Fragments
// ---------------------------------------------------------------------------

fn require<'a, T>(value: &'a Option<T>, kind: FragmentKind, field: &str) -> Result<&'a T, TemplateError> {
    value.as_ref().ok_or_else(|| TemplateError::missing(kind, field))
}

fn render_general(desired: &DesiredState) -> Result<String, TemplateError> {
    let kind = FragmentKind::General;
    let g = &desired.general;

    let options = require(&g.options, kind, "Options")?;
    let hostname_lookups = require(&g.hostname_lookups, kind, "HostnameLookups")?;
    let allow_override = require(&g.allow_override, kind, "AllowOverride")?;
    let enable_mmap = require(&g.enable_mmap, kind, "EnableMMAP")?;
    let enable_sendfile = require(&g.enable_sendfile, kind, "EnableSendfile")?;

    let options = if options.is_empty() {
        "None".to_string()
    } else {
        options.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
    };

    let mut s = String::new();
    let _ = writeln!(s, "Options {options}");
    let _ = writeln!(s, "HostnameLookups {hostname_lookups}");
    let _ = writeln!(s, "AllowOverride {allow_override}");
    let _ = writeln!(s, "EnableMMAP {enable_mmap}");
    let _ = writeln!(s, "EnableSendfile {enable_sendfile}");
    s.push('\n');
    s.push_str("<IfModule mod_rewrite.c>\n");
    s.push_str("    RewriteEngine On\n");
    s.push_str("</IfModule>\n");
    Ok(s)
}

fn render_concurrency_model(desired: &DesiredState) -> Result<String, TemplateError> {
    let kind = FragmentKind::ConcurrencyModel;
    let cm = &desired.concurrency_model;

    let mut s = String::new();
    let _ = writeln!(s, "<IfModule {}_module>", cm.module_name());
    for key in TUNING_KEYS {
        let value = cm
            .tuning
            .get(*key)
            .ok_or_else(|| TemplateError::missing(kind, key))?;
        let _ = writeln!(s, "    {key} {value}");
    }
    // Site-specific directives beyond the standard set, in name order.
    for (key, value) in cm.tuning.iter().filter(|(k, _)| !TUNING_KEYS.contains(&k.as_str())) {
        let _ = writeln!(s, "    {key} {value}");
    }
    s.push_str("</IfModule>\n");
    Ok(s)
}

fn render_security(desired: &DesiredState) -> Result<String, TemplateError> {
    let kind = FragmentKind::Security;
    let sec = &desired.security;

    let protocol = require(&sec.ssl_protocol, kind, "SSLProtocol")?;
    let cipher_suite = require(&sec.ssl_cipher_suite, kind, "SSLCipherSuite")?;
    let honor_order = require(&sec.ssl_honor_cipher_order, kind, "SSLHonorCipherOrder")?;
    let hsts = require(&sec.strict_transport_security, kind, "StrictTransportSecurity")?;

    let mut s = String::new();
    s.push_str("<IfModule mod_ssl.c>\n");
    let _ = writeln!(s, "    SSLProtocol {protocol}");
    let _ = writeln!(s, "    SSLCipherSuite {cipher_suite}");
    let _ = writeln!(s, "    SSLHonorCipherOrder {honor_order}");
    s.push_str("</IfModule>\n");
    s.push('\n');
    s.push_str("<IfModule mod_headers.c>\n");
    let _ = writeln!(
        s,
        "    Header always set Strict-Transport-Security \"{}\"",
        hsts.trim().trim_matches('"')
    );
    for line in sec.header_rules.values() {
        let _ = writeln!(s, "    {}", line.trim());
    }
    s.push_str("</IfModule>\n");
    Ok(s)
}

fn render_php(desired: &DesiredState) -> Result<String, TemplateError> {
    let expose = require(&desired.php_exposure, FragmentKind::Php, "expose_php")?;
    Ok(format!("expose_php {}\n", OnOff::from_bool(*expose)))
}
