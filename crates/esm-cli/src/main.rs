#![deny(unsafe_code)]

//! esm CLI: runs the daemon and talks to it.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use esm_config::{ConfigNode, EsmConfig};
use esm_core::build_info;
use esm_core::logging::{self, LogSink};
use esm_core::singleton::{ProbePolicy, wait_until_ready};
use esm_core::{Daemon, DaemonClient, RunOutcome};

/// esm: module resolution daemon and client.
#[derive(Debug, Parser)]
#[command(name = "esm", version, about, long_about = None)]
struct Cli {
    /// Path to the settings file [default: ~/.esm/esm-server/esm.toml].
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the daemon in the foreground.
    Daemon,

    /// Start the daemon in the background unless one is running, then
    /// wait until it has loaded.
    Ensure,

    /// Show daemon status.
    Status,

    /// Print a module's module.yml, or one value of it.
    Get {
        /// Module directory.
        module: PathBuf,
        /// Dotted path of a single value, e.g. `commands.build`.
        #[arg(long)]
        key: Option<String>,
    },

    /// Set a value in a module's module.yml.
    Set {
        /// Module directory.
        module: PathBuf,
        /// Dotted path; `x` appends to a sequence.
        key: String,
        /// JSON value; anything that is not valid JSON is stored as a string.
        value: String,
    },

    /// Link a module into a project's es-modules directory.
    Link { from: PathBuf, to: PathBuf },

    /// Validate and display the settings.
    Config {
        /// Show the resolved settings.
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(EsmConfig::default_path);
    let settings = EsmConfig::load_or_default(&config_path)
        .await
        .with_context(|| format!("failed to load settings from '{}'", config_path.display()))?;

    let sink = match &cli.log_file {
        Some(path) => LogSink::File(path.clone()),
        None => LogSink::from_config(&settings.logging),
    };
    logging::init(&settings.logging.level, cli.verbose, &sink)?;
    debug!(path = %config_path.display(), "settings loaded");

    match &cli.command {
        Commands::Daemon => cmd_daemon(settings).await,
        Commands::Ensure => cmd_ensure(&settings, cli.config.as_deref(), cli.verbose).await,
        Commands::Status => cmd_status(&settings).await,
        Commands::Get { module, key } => cmd_get(&settings, module, key.as_deref()).await,
        Commands::Set { module, key, value } => cmd_set(&settings, module, key, value).await,
        Commands::Link { from, to } => cmd_link(&settings, from, to).await,
        Commands::Config { show } => cmd_config(&settings, &config_path, *show),
    }
}

async fn cmd_daemon(settings: EsmConfig) -> Result<()> {
    match Daemon::new(settings).run().await? {
        RunOutcome::Stopped => info!("daemon exited"),
        RunOutcome::HandedOff(status) => {
            info!(version = status.version, "daemon already running, nothing to do");
        }
    }
    Ok(())
}

async fn cmd_ensure(settings: &EsmConfig, config: Option<&Path>, verbose: u8) -> Result<()> {
    let client = DaemonClient::connect(settings).await?;
    match client.status().await {
        Ok(status) if status.is_esm() && status.loaded => {
            println!("esm daemon is running at {}", client.base_url());
            return Ok(());
        }
        Ok(status) if !status.is_esm() => {
            bail!(
                "{} is served by `{}`, not by an esm daemon",
                client.base_url(),
                status.server
            );
        }
        Ok(_) => debug!("daemon is loading"),
        Err(e) => {
            debug!(error = %e, "no daemon answering, starting one");
            spawn_daemon(config, &settings.default_log_file(), verbose)?;
        }
    }

    let status = wait_until_ready(&client, &ProbePolicy::from(&settings.probe)).await?;
    println!(
        "esm daemon is running at {} (protocol {})",
        client.base_url(),
        status.version
    );
    Ok(())
}

/// Start `esm daemon` detached from this process and its terminal.
fn spawn_daemon(config: Option<&Path>, log_file: &Path, verbose: u8) -> Result<()> {
    let exe = std::env::current_exe().context("cannot locate the esm executable")?;
    let mut command = Command::new(exe);
    if let Some(config) = config {
        command.arg("--config").arg(config);
    }
    command.arg("--log-file").arg(log_file);
    if verbose > 0 {
        command.arg(format!("-{}", "v".repeat(verbose.into())));
    }
    command
        .arg("daemon")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let child = command.spawn().context("failed to start the esm daemon")?;
    info!(pid = child.id(), log = %log_file.display(), "started esm daemon");
    Ok(())
}

async fn cmd_status(settings: &EsmConfig) -> Result<()> {
    let client = DaemonClient::connect(settings).await?;
    let status = match client.status().await {
        Ok(status) => status,
        Err(e) if e.is_unreachable() => bail!("esm daemon is not running at {}", client.base_url()),
        Err(e) => return Err(e.into()),
    };

    println!("Client:   {}", client_build());
    println!("Server:   {}", status.server);
    println!("URL:      {}", client.base_url());
    println!("Protocol: {}", status.version);
    println!("Loaded:   {}", status.loaded);
    if status.loaded {
        let app = client.application_status().await?;
        println!("Status:   {}", app.status);
        println!("Started:  {}", app.started);
        println!("Uptime:   {}s", app.uptime);
        println!("Build:    {}", app.build);
    }
    Ok(())
}

async fn cmd_get(settings: &EsmConfig, module: &Path, key: Option<&str>) -> Result<()> {
    let client = DaemonClient::connect(settings).await?;
    let module = absolute(module)?;
    let data = client.module_data(&module, key).await?;
    let shown = match key {
        Some(_) => data.get("value").cloned().unwrap_or(serde_json::Value::Null),
        None => data,
    };
    println!("{}", serde_json::to_string_pretty(&shown)?);
    Ok(())
}

async fn cmd_set(settings: &EsmConfig, module: &Path, key: &str, value: &str) -> Result<()> {
    let client = DaemonClient::connect(settings).await?;
    let module = absolute(module)?;
    let updated = client.set_module_value(&module, key, parse_value(value)).await?;
    println!("{} = {}", updated.key, serde_json::to_string(&updated.value)?);
    Ok(())
}

async fn cmd_link(settings: &EsmConfig, from: &Path, to: &Path) -> Result<()> {
    let client = DaemonClient::connect(settings).await?;
    let outcome = client.link(&absolute(from)?, &absolute(to)?).await?;
    if outcome.created {
        println!("{} -> {}", outcome.link.display(), outcome.source.display());
    } else {
        println!("{} already links {}", outcome.link.display(), outcome.source.display());
    }
    Ok(())
}

fn cmd_config(settings: &EsmConfig, path: &Path, show: bool) -> Result<()> {
    if show {
        let toml_str = toml::to_string_pretty(settings).context("failed to render settings")?;
        println!("{toml_str}");
    } else if path.exists() {
        println!("Settings at '{}' are valid.", path.display());
    } else {
        println!("No settings at '{}', using defaults.", path.display());
    }
    Ok(())
}

/// This binary's version, with its build time when known.
fn client_build() -> String {
    match build_info::built_at() {
        Some(at) => format!(
            "{}, built {}",
            build_info::version_string(),
            at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        ),
        None => build_info::version_string(),
    }
}

/// Interpret a command-line value as JSON, falling back to a plain string.
fn parse_value(raw: &str) -> ConfigNode {
    serde_json::from_str(raw).unwrap_or_else(|_| ConfigNode::from(raw))
}

/// The daemon resolves paths itself, so send them absolute.
fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("invalid path '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use esm_config::Scalar;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("2.0.0"), ConfigNode::from("2.0.0"));
        assert_eq!(parse_value("true"), ConfigNode::Scalar(Scalar::Bool(true)));
        assert_eq!(parse_value("42"), ConfigNode::Scalar(Scalar::Integer(42)));
        assert_eq!(
            parse_value(r#"["a", "b"]"#),
            ConfigNode::Sequence(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn test_client_build_includes_build_time() {
        let line = client_build();
        assert!(line.starts_with(build_info::VERSION));
        assert!(line.contains(", built "));
        assert!(line.ends_with('Z'));
    }

    #[test]
    fn test_cli_parses_set() {
        let cli = Cli::try_parse_from(["esm", "-v", "set", "./mod", "npm.x", "left-pad"]).unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Set { module, key, value } => {
                assert_eq!(module, PathBuf::from("./mod"));
                assert_eq!(key, "npm.x");
                assert_eq!(value, "left-pad");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["esm", "status", "--config", "/etc/esm.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/esm.toml")));
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn test_cli_get_key() {
        let cli = Cli::try_parse_from(["esm", "get", ".", "--key", "name"]).unwrap();
        assert!(matches!(cli.command, Commands::Get { key: Some(ref k), .. } if k == "name"));
    }
}
