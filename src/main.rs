//! AutonomousTrust node supervisor - main entry point.
//!
//! Loads `<root>/etc/at/subsystems.cfg.json`, starts every registered
//! subsystem and runs until SIGINT/SIGTERM/SIGQUIT.

use autonomous_trust_core::registry::ImplementationTable;
use autonomous_trust_core::shutdown::spawn_signal_listener;
use autonomous_trust_core::supervisor::Supervisor;
use autonomous_trust_core::types::ROOT_ENV_VAR;
use autonomous_trust_core::Config;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "at-supervisor", version, about = "Run an AutonomousTrust node")]
struct Args {
    /// Root directory (config in etc/at, data in var/at).
    #[arg(long, env = ROOT_ENV_VAR)]
    root: Option<PathBuf>,

    /// Fallback log level when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit JSON logs.
    #[arg(long)]
    json_logs: bool,

    /// Monitoring cadence, e.g. "500ms".
    #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
    cadence: Option<Duration>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let mut config = match args.root {
        Some(root) => Config::with_root(root),
        None => Config::from_env(),
    };
    config.observability.log_level = args.log_level;
    config.observability.json_logs = args.json_logs;
    if let Some(cadence) = args.cadence {
        config.supervisor.cadence = cadence;
        config.runtime.cadence = cadence;
    }

    // Initialize observability
    autonomous_trust_core::observability::init_tracing_with(&config.observability);

    let shutdown = CancellationToken::new();
    let listener = spawn_signal_listener(shutdown.clone());

    let supervisor = Supervisor::new(config, ImplementationTable::builtin());
    let report = supervisor.run(shutdown.clone()).await?;

    shutdown.cancel();
    let _ = listener.await;

    for child in &report.children {
        tracing::info!(
            "subsystem_summary: category={}, implementation={}, exit={}",
            child.category,
            child.implementation,
            child.exit
        );
    }
    std::process::exit(report.exit_code);
}
