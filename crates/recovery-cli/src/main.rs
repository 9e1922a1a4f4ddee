//! recovery - OTA package installer for recovery mode

use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use recovery_core::RecoveryConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

use recovery_cli::ops::{self, RebootTarget, RecoveryContext};
use recovery_cli::ui::{ConsoleOperator, ConsoleReporter};
use recovery_cli::Cli;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("recovery: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = RecoveryConfig::resolve(cli.config.as_deref())
        .context("Failed to load recovery configuration")?;

    let earlier_log = std::fs::metadata(config.temporary_log()).map_or(0, |m| m.len());
    init_logging(&config);
    info!(
        "Starting recovery {} on {}",
        env!("RECOVERY_VERSION"),
        chrono::Local::now().format("%a %b %e %H:%M:%S %Y")
    );

    let reporter = Arc::new(ConsoleReporter::new(cli.show_text));
    let operator = Box::new(ConsoleOperator::stdin());
    let mut ctx = RecoveryContext::new(config, reporter, operator)
        .context("Failed to set up recovery")?;
    ctx.resume_log_at(earlier_log);

    let outcome = ops::run(&mut ctx, cli.argv());
    match &outcome.reboot {
        RebootTarget::System => info!("Ready to boot main system"),
        RebootTarget::Firmware(kind) => info!("Ready to reboot into {kind} firmware update"),
    }
    Ok(ExitCode::from(outcome.exit_code()))
}

/// Log to the temporary log file so `finish_recovery` can copy it to the
/// cache; stderr if the file can't be opened.
fn init_logging(config: &RecoveryConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let path = config.temporary_log();
    let file = std::fs::create_dir_all(&config.tmp_dir)
        .and_then(|()| OpenOptions::new().create(true).append(true).open(&path));

    match file {
        Ok(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init(),
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            tracing::warn!("Can't open {}: {e}", path.display());
        }
    }
}
