//! Debian apache2 tooling behind [`HostControl`].
//!
//! Enabled modules come from the `mods-enabled` directory (`<name>.load`
//! entries), which uses the same names `a2enmod`/`a2dismod` accept. The active
//! concurrency model comes from the `Server MPM:` line of `apache2ctl -V`.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::{HostControl, HostControlError, HostQueryError};

/// Programs and paths used to drive one host. Nothing is hard-coded in the
/// engine; `Default` only mirrors a stock Debian/Ubuntu install.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostCommands {
    pub host_id: String,
    pub ctl: String,
    pub enmod: String,
    pub dismod: String,
    pub service_manager: String,
    pub service: String,
    pub mods_enabled_dir: PathBuf,
    /// Prefix mutating commands with `sudo`.
    pub use_sudo: bool,
}

impl Default for HostCommands {
    fn default() -> Self {
        Self {
            host_id: "localhost".to_string(),
            ctl: "apache2ctl".to_string(),
            enmod: "a2enmod".to_string(),
            dismod: "a2dismod".to_string(),
            service_manager: "systemctl".to_string(),
            service: "apache2".to_string(),
            mods_enabled_dir: PathBuf::from("/etc/apache2/mods-enabled"),
            use_sudo: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CommandHost {
    commands: HostCommands,
}

impl CommandHost {
    pub fn new(commands: HostCommands) -> Self {
        Self { commands }
    }

    pub fn commands(&self) -> &HostCommands {
        &self.commands
    }

    fn run(
        &self,
        op: &str,
        program: &str,
        args: &[&str],
        privileged: bool,
    ) -> Result<String, HostControlError> {
        let mut cmd = if privileged && self.commands.use_sudo {
            let mut c = Command::new("sudo");
            c.arg(program);
            c
        } else {
            Command::new(program)
        };
        cmd.args(args);

        tracing::debug!(host = %self.commands.host_id, program, ?args, "running host command");

        let out = cmd
            .output()
            .map_err(|e| HostControlError::new(op, format!("{program}: {e}")))?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            return Err(HostControlError::new(
                op,
                format!("{program} exited with {}: {stderr}", out.status),
            ));
        }

        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }
}

impl HostControl for CommandHost {
    fn host_id(&self) -> &str {
        &self.commands.host_id
    }

    fn list_active_concurrency_model(&self) -> Result<Option<String>, HostControlError> {
        let op = "list_active_concurrency_model";
        let stdout = self.run(op, &self.commands.ctl, &["-V"], false)?;
        parse_server_mpm(&stdout).map_err(|e| HostControlError::new(op, e.to_string()))
    }

    fn list_enabled_modules(&self) -> Result<BTreeSet<String>, HostControlError> {
        parse_enabled_modules_dir(&self.commands.mods_enabled_dir)
    }

    fn enable_module(&self, name: &str) -> Result<(), HostControlError> {
        let op = format!("enable_module({name})");
        self.run(&op, &self.commands.enmod, &["-q", name], true)?;
        Ok(())
    }

    fn disable_module(&self, name: &str) -> Result<(), HostControlError> {
        let op = format!("disable_module({name})");
        self.run(&op, &self.commands.dismod, &["-q", name], true)?;
        Ok(())
    }

    fn restart_service(&self) -> Result<(), HostControlError> {
        let service = self.commands.service.clone();
        self.run(
            "restart_service",
            &self.commands.service_manager,
            &["restart", &service],
            true,
        )?;
        Ok(())
    }
}

/// Extract the active concurrency model from `apache2ctl -V` output.
///
/// Output that is not a `-V` listing at all (no `Server version:` line) is a
/// parse error. A listing without a usable `Server MPM:` value yields `None`.
pub fn parse_server_mpm(stdout: &str) -> Result<Option<String>, HostQueryError> {
    let mut saw_version = false;
    let mut mpm = None;

    for line in stdout.lines().map(str::trim) {
        if line.starts_with("Server version:") {
            saw_version = true;
        } else if let Some(rest) = line.strip_prefix("Server MPM:") {
            let value = rest.trim().to_lowercase();
            if !value.is_empty() {
                mpm = Some(value);
            }
        }
    }

    if !saw_version {
        return Err(HostQueryError::Parse {
            what: "apache2ctl -V".to_string(),
            detail: "missing `Server version:` line".to_string(),
        });
    }

    Ok(mpm)
}

/// Enabled modules are the `<name>.load` entries of `mods-enabled`.
pub fn parse_enabled_modules_dir(dir: &Path) -> Result<BTreeSet<String>, HostControlError> {
    let op = "list_enabled_modules";
    let entries = fs::read_dir(dir)
        .map_err(|e| HostControlError::new(op, format!("read {}: {e}", dir.display())))?;

    let mut out = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| HostControlError::new(op, e.to_string()))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("load") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            out.insert(stem.to_string());
        }
    }
    Ok(out)
}
