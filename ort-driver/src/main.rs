//! OpenRideTelemetry driver
//!
//! Command line entry point: runs sessions, records demo rides and prints the
//! effective configuration.

use anyhow::{Context, Result};
use clap::Parser;
use ort_driver::cli::{Cli, Command};
use ort_driver::config::DriverConfig;
use ort_driver::runner;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays clean for the stdout sink
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = DriverConfig::load(cli.config.as_deref()).context("failed to load config")?;

    match cli.command {
        Command::Run(args) => {
            let options = args.into_options(&mut config);
            config.validate().context("invalid command line overrides")?;

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, stopping sessions");
                    on_signal.cancel();
                }
            });

            info!("Starting {} run", options.model);
            let report = runner::run(options, config, cancel).await?;
            for (sink, written) in &report.written {
                info!("Sink {}: {} records", sink, written);
            }
            let failed: Vec<_> = report
                .sessions
                .iter()
                .filter_map(|s| s.failure.as_ref().map(|f| format!("{}: {}", s.id, f)))
                .collect();
            if !failed.is_empty() {
                anyhow::bail!("{} session(s) failed:\n{}", failed.len(), failed.join("\n"));
            }
            info!(
                "Run complete: {} sessions, {} steps",
                report.sessions.len(),
                report.total_steps()
            );
        }
        Command::RecordDemo(args) => {
            let options = args.into_options(&mut config);
            config.validate().context("invalid command line overrides")?;
            let (path, count) = runner::record_demo(&options, &config)?;
            println!("{} ({} frames)", path.display(), count);
        }
        Command::PrintConfig => {
            print!("{}", config.to_toml().context("failed to render config")?);
        }
    }

    Ok(())
}
