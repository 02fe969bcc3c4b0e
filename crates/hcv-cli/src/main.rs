use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hcv_config::{LoadedDocument, UnusedKeyPolicy};
use hcv_exec::{ReconciliationReport, ReportStatus};
use hcv_host::{CommandHost, HostCommands};
use hcv_model::{DesiredState, HostState};
use hcv_plan::ActionPlan;
use hcv_runtime::EngineSettings;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "hcv")]
#[command(about = "httpd-converge: reconcile Apache modules and config fragments", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered document hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> site -> host...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Compute the action plan without touching the host
    Plan {
        /// Desired-state documents in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Plan against a captured HostState JSON instead of the live host
        #[arg(long = "assume-host")]
        assume_host: Option<PathBuf>,

        /// Treat unknown document keys as an error
        #[arg(long = "strict-keys", default_value_t = false)]
        strict_keys: bool,

        /// Print the plan as JSON
        #[arg(long, default_value_t = false)]
        json: bool,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Run one reconciliation cycle against the host
    Apply {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Stop starting new actions after this many seconds
        #[arg(long = "timeout-secs")]
        timeout_secs: Option<u64>,

        #[arg(long = "strict-keys", default_value_t = false)]
        strict_keys: bool,

        #[arg(long, default_value_t = false)]
        json: bool,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Print the host's current modules, concurrency model and fragments
    HostState {
        #[arg(long, default_value_t = false)]
        json: bool,

        #[command(flatten)]
        target: TargetArgs,
    },
}

/// Where and how to reach the managed installation.
#[derive(Args, Clone)]
struct TargetArgs {
    #[arg(long = "host-id", default_value = "localhost")]
    host_id: String,

    #[arg(long = "fragment-dir", default_value = "/etc/apache2/conf-available")]
    fragment_dir: PathBuf,

    #[arg(long = "main-config", default_value = "/etc/apache2/apache2.conf")]
    main_config: PathBuf,

    #[arg(long = "mods-enabled-dir", default_value = "/etc/apache2/mods-enabled")]
    mods_enabled_dir: PathBuf,

    #[arg(long, default_value = "apache2ctl")]
    ctl: String,

    #[arg(long, default_value = "a2enmod")]
    enmod: String,

    #[arg(long, default_value = "a2dismod")]
    dismod: String,

    #[arg(long = "service-manager", default_value = "systemctl")]
    service_manager: String,

    #[arg(long, default_value = "apache2")]
    service: String,

    /// Prefix mutating commands with sudo
    #[arg(long, default_value_t = false)]
    sudo: bool,

    /// Site-specific module the engine may manage (repeatable)
    #[arg(long = "extra-module")]
    extra_modules: Vec<String>,
}

impl TargetArgs {
    fn host(&self) -> CommandHost {
        CommandHost::new(HostCommands {
            host_id: self.host_id.clone(),
            ctl: self.ctl.clone(),
            enmod: self.enmod.clone(),
            dismod: self.dismod.clone(),
            service_manager: self.service_manager.clone(),
            service: self.service.clone(),
            mods_enabled_dir: self.mods_enabled_dir.clone(),
            use_sudo: self.sudo,
        })
    }

    fn settings(&self, timeout: Option<Duration>) -> EngineSettings {
        EngineSettings {
            fragment_dir: self.fragment_dir.clone(),
            main_config: self.main_config.clone(),
            extra_modules: self.extra_modules.clone(),
            timeout,
        }
    }
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let loaded = hcv_config::load_layered_yaml(paths.as_slice())?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Plan {
            config_paths,
            assume_host,
            strict_keys,
            json,
            target,
        } => {
            let (loaded, desired) = load_desired(&config_paths, strict_keys)?;
            let settings = target.settings(None);
            let registry = settings.registry();

            let p = match assume_host {
                Some(path) => {
                    let actual = hcv_config::load_host_snapshot(&path)?;
                    hcv_plan::plan(&desired, &actual, &registry)?
                }
                None => {
                    let host = target.host();
                    let (_, p) =
                        hcv_runtime::plan_cycle(&desired, &host, &settings.store(), &registry)?;
                    p
                }
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&p)?);
            } else {
                println!("config_hash={}", loaded.config_hash);
                print_plan(&p);
            }
        }

        Commands::Apply {
            config_paths,
            timeout_secs,
            strict_keys,
            json,
            target,
        } => {
            let (loaded, desired) = load_desired(&config_paths, strict_keys)?;
            let settings = target.settings(timeout_secs.map(Duration::from_secs));
            let host = target.host();

            let report = hcv_runtime::run_cycle(
                &desired,
                &host,
                &settings.store(),
                &settings.registry(),
                &settings.apply_options(),
            )?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("config_hash={}", loaded.config_hash);
                print_report(&report);
            }

            if !report.is_success() {
                anyhow::bail!(
                    "RECONCILIATION INCOMPLETE on host {} (failed or unattempted actions):\n{}",
                    report.host_id,
                    report.failure_listing()
                );
            }
        }

        Commands::HostState { json, target } => {
            let settings = target.settings(None);
            let host = target.host();
            let state = hcv_runtime::capture_host_state(&host, &settings.store())?;

            if json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                print_host_state(&target.host_id, &state);
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    // stdout carries the key=value output; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_desired(paths: &[String], strict_keys: bool) -> Result<(LoadedDocument, DesiredState)> {
    let loaded = hcv_config::load_layered_yaml(paths)?;

    let policy = if strict_keys {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let unused = hcv_config::report_unused_keys(&loaded.config_json, policy)?;
    for pointer in &unused.unused_leaf_pointers {
        tracing::warn!(pointer = %pointer, "document key is not used by the engine");
    }

    let desired = hcv_config::desired_state_from_json(&loaded.config_json)
        .context("desired-state document rejected")?;
    Ok((loaded, desired))
}

fn print_plan(p: &ActionPlan) {
    println!("actions={}", p.len());
    for (i, a) in p.iter().enumerate() {
        println!("action.{}={}", i, a);
    }
    for (kind, err) in &p.render_failures {
        println!("render_failure.{}={}", kind, err);
    }
}

fn print_report(r: &ReconciliationReport) {
    println!("cycle_id={}", r.cycle_id);
    println!("host_id={}", r.host_id);
    println!("started_at_utc={}", r.started_at_utc.to_rfc3339());
    println!("finished_at_utc={}", r.finished_at_utc.to_rfc3339());
    println!("status={}", status_str(r.status()));
    println!("plan_fatal={}", r.plan_fatal);
    for (i, rec) in r.records.iter().enumerate() {
        println!("record.{}={} {}", i, rec.action, rec.outcome);
    }
}

fn print_host_state(host_id: &str, s: &HostState) {
    println!("host_id={}", host_id);
    println!(
        "active_concurrency_model={}",
        s.active_concurrency_model.as_deref().unwrap_or("UNKNOWN")
    );
    println!(
        "enabled_modules={}",
        s.enabled_modules.iter().cloned().collect::<Vec<_>>().join(",")
    );
    for (kind, content) in &s.fragments {
        let registered = s.registered_includes.contains(kind);
        println!(
            "fragment.{}=bytes:{} registered:{}",
            kind,
            content.len(),
            registered
        );
    }
}

fn status_str(s: ReportStatus) -> String {
    match s {
        ReportStatus::NoOp => "noop".to_string(),
        ReportStatus::Applied => "applied".to_string(),
        ReportStatus::Incomplete { skipped } => format!("incomplete skipped={}", skipped),
        ReportStatus::Partial { failures } => format!("partial failures={}", failures),
    }
}
