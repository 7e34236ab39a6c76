//! GreyNoise IP Check CLI.

use anyhow::{Context, Result};
use clap::Parser;
use greynoise_ip_check::setup::ERROR_CANNOT_CONNECT;
use greynoise_ip_check::{
    CheckSource, Config, FlowResult, GreyNoiseFetcher, InMemoryEntryStore, IpCheckIntegration,
    RefreshEvent, SetupFlow,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "greynoise-ip-check")]
#[command(about = "GreyNoise IP Check - periodically check whether your public IP is flagged as internet noise")]
#[command(version)]
struct Args {
    /// Path to configuration file (defaults apply when it does not exist)
    #[arg(short, long, default_value = "greynoise-ip-check.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: String,

    /// Print example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Run a single check, print the result as JSON and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --print-config
    if args.print_config {
        println!("{}", Config::example());
        return Ok(());
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Load configuration
    info!(config = %args.config.display(), "Loading configuration");
    let config = Config::load_or_default(&args.config)
        .with_context(|| format!("Invalid configuration: {}", args.config.display()))?;

    // Handle --validate
    if args.validate {
        info!("Configuration is valid");
        return Ok(());
    }

    let fetcher = Arc::new(
        GreyNoiseFetcher::new(&config.api).context("Failed to create HTTP client")?,
    );

    // Handle --once
    if args.once {
        let result = fetcher.probe().await.context("GreyNoise check failed")?;
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let store = InMemoryEntryStore::new();
    let entry = match SetupFlow::new(&*fetcher, &store).step_user(true).await {
        FlowResult::CreateEntry(entry) => entry,
        FlowResult::Abort { reason } => anyhow::bail!("Setup aborted: {}", reason),
        other => match other.base_error() {
            Some(ERROR_CANNOT_CONNECT) => {
                anyhow::bail!("Setup failed: cannot connect to {}", fetcher.url())
            }
            Some(code) => anyhow::bail!("Setup failed: {}", code),
            None => anyhow::bail!("Setup did not complete"),
        },
    };

    let integration = IpCheckIntegration::setup(
        entry,
        fetcher.clone(),
        config.settings.scan_interval(),
    )
    .await;

    let sensor = integration.sensor().clone();
    let mut events = integration.coordinator().subscribe();
    let log_updates = config.settings.log_updates;

    let snapshot = sensor.snapshot();
    info!(
        state = %snapshot.state,
        available = snapshot.available,
        attributes = %serde_json::to_string(&snapshot.attributes)?,
        "Initial sensor state"
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            event = events.recv() => match event {
                Ok(RefreshEvent::Updated(result)) => {
                    if log_updates {
                        info!(
                            state = %sensor.state(),
                            ip = ?result.ip,
                            status = ?result.status,
                            classification = ?result.classification,
                            last_checked = %result.last_checked.to_rfc3339(),
                            "GreyNoise check updated"
                        );
                    }
                }
                Ok(RefreshEvent::UpdateFailed { kind, message }) => {
                    if log_updates {
                        warn!(kind = %kind, error = %message, state = %sensor.state(), "GreyNoise check update failed");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed refresh notifications");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    integration.unload().await;

    Ok(())
}
