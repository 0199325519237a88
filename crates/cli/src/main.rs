//! Exports Azure Event Hubs consumer group lag and ownership as metrics.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod error;
mod exporters;
mod targets;

use error::Result;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use ehm_collector::{Collector, RunSummary};
use ehm_config::{CONFIG_PATH_ENV, Config, DEFAULT_CONFIG_PATH, LogConfig, LogFormat, LogLevel};
use ehm_metrics::{MetricRegistry, MetricsService};
use ehm_providers::{CheckpointStores, HubDirectory, StorageListing};
use ehm_providers_azure::{AzureBlobStorage, AzureHubDirectory};
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(long, env = CONFIG_PATH_ENV, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Collect once and exit, ignoring the configured interval
    #[arg(long)]
    once: bool,
}

fn init_tracing(log: &LogConfig) -> Result<()> {
    let level = match log.level {
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warn => Level::WARN,
        LogLevel::Error => Level::ERROR,
    };

    let builder = tracing_subscriber::fmt().with_max_level(level);
    match log.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            let _ = init_tracing(&LogConfig::default());
            error!(path = %args.config.display(), error = %e, "failed to load config");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_tracing(&config.log) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    info!(version = env!("CARGO_PKG_VERSION"), "service starting");

    match run(&args, config).await {
        Ok(()) => {
            debug!("service stopping");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "service failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args, config: Config) -> Result<()> {
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            info!("shutting down");
            shutdown.cancel();
        }
    });

    let registry = MetricRegistry::standard();
    let exporters = exporters::build(&config.exporter, &registry)?;
    let server = exporters.server;
    if let Some(server) = &server {
        server.start().await?;
    }

    let metrics = MetricsService::new(exporters.recorder);
    let tokens = targets::token_provider(&config.auth);
    let storage = AzureBlobStorage::new(tokens.clone());

    let collector = Collector::new(
        AzureHubDirectory::new(tokens),
        storage.clone(),
        storage,
        metrics.clone(),
        targets::collector_options(&config.collector)?,
    )
    .with_namespaces(targets::namespace_targets(&config.namespaces)?)
    .with_storage_accounts(targets::storage_accounts(&config.storage_accounts)?);

    let interval = if args.once {
        None
    } else {
        config.collector.interval
    };

    let result = collect(&collector, &metrics, interval, &shutdown).await;

    if let Some(server) = &server {
        server.shutdown().await;
    }

    result
}

/// Runs the collector until the interval is unset or shutdown is requested.
///
/// With an interval, failed runs are logged and retried on the next tick.
/// A failed flush always ends the loop.
async fn collect<H, L, C>(
    collector: &Collector<H, L, C>,
    metrics: &MetricsService,
    interval: Option<Duration>,
    shutdown: &CancellationToken,
) -> Result<()>
where
    H: HubDirectory,
    L: StorageListing,
    C: CheckpointStores,
{
    loop {
        let started = Instant::now();
        info!("starting metrics collector");

        match collector.run_once(shutdown).await {
            Ok(RunSummary {
                namespaces,
                hubs,
                consumer_groups,
                skipped_consumer_groups,
            }) => {
                metrics.flush().await?;
                info!(
                    elapsed = ?started.elapsed(),
                    namespaces,
                    hubs,
                    consumer_groups,
                    skipped_consumer_groups,
                    "metrics collector finished"
                );
            }
            Err(_) if shutdown.is_cancelled() => return Ok(()),
            Err(e) if interval.is_some() => {
                error!(
                    error = %e,
                    auth = e.is_auth(),
                    elapsed = ?started.elapsed(),
                    "metrics collection failed"
                );
            }
            Err(e) => return Err(e.into()),
        }

        let Some(interval) = interval else {
            return Ok(());
        };

        debug!(?interval, "waiting for next iteration");
        tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            () = tokio::time::sleep(interval) => {}
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
