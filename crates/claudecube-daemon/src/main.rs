//! ClaudeCube CLI entrypoint.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use claudecube_core::config::{self, CubeConfig};
use claudecube_daemon::{installer, DaemonPaths};

/// ClaudeCube — permission mediation for an automated coding agent.
#[derive(Parser, Debug)]
#[command(name = "claudecube", version, about)]
struct Cli {
    /// Install the hook bridge into the agent settings file.
    #[arg(long)]
    install: bool,

    /// Remove ClaudeCube hooks from the agent settings file.
    #[arg(long)]
    uninstall: bool,

    /// Query a running daemon and print its sessions.
    #[arg(long)]
    status: bool,

    /// Port to listen on (overrides config).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the orchestrator config file.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Path to the rules file.
    #[arg(long, short = 'r')]
    rules: Option<PathBuf>,

    /// Verbose logging.
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // All logging goes to stderr; stdout is reserved for CLI output.
    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let config_path = cli.config.unwrap_or_else(config::default_config_path);
    let mut config = CubeConfig::load(&config_path)?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    if cli.install {
        installer::install(
            &config::default_settings_path(),
            &config::home_base_dir(),
            config.server.port,
        )?;
        println!("ClaudeCube hooks installed.");
        return Ok(());
    }
    if cli.uninstall {
        installer::uninstall(&config::default_settings_path())?;
        println!("ClaudeCube hooks removed.");
        return Ok(());
    }
    if cli.status {
        return print_status(config.server.port).await;
    }

    let mut paths = DaemonPaths::from_home();
    if let Some(rules) = cli.rules {
        paths.rules = rules;
    }
    claudecube_daemon::run(config, paths).await
}

async fn print_status(port: u16) -> Result<()> {
    let url = format!("http://127.0.0.1:{port}/status");
    let resp = match reqwest::get(&url).await {
        Ok(r) => r,
        Err(_) => {
            println!("Daemon not reachable on port {port}.");
            return Ok(());
        }
    };
    let status: serde_json::Value = resp.json().await?;
    let count = status.get("count").and_then(|v| v.as_u64()).unwrap_or(0);
    println!("Daemon running; {count} session(s) tracked.");
    if let Some(sessions) = status.get("sessions").and_then(|v| v.as_array()) {
        for session in sessions {
            let label = session.get("label").and_then(|v| v.as_str()).unwrap_or("?");
            let state = session.get("state").and_then(|v| v.as_str()).unwrap_or("?");
            let cwd = session.get("cwd").and_then(|v| v.as_str()).unwrap_or("?");
            println!("  {label:<20} {state:<20} {cwd}");
        }
    }
    Ok(())
}
