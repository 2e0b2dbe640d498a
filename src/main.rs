//! Nightshift entry point

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use nightshift::infrastructure::config::ConfigLoader;
use nightshift::infrastructure::metrics::Metrics;
use nightshift::infrastructure::scanners::ScannerRegistry;
use nightshift::infrastructure::{kubernetes, logging, triggers, web};
use nightshift::services::Agent;

#[derive(Parser)]
#[command(name = "nightshift", version, about = "Cron-driven workload autoscaler")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "nightshift.yaml", env = "NIGHTSHIFT_CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load(&cli.config).context("Failed to load configuration")?;
    logging::init(&config.logging).context("Failed to initialize logging")?;
    info!(config = %cli.config.display(), "nightshift starting");

    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);

    // The only fatal failure: without a cluster client nothing can run.
    let client = kubernetes::client(config.kubeconfig.as_deref())
        .await
        .context("Failed to construct cluster client")?;

    let registry = ScannerRegistry::builtin();
    let scanners = config
        .scanners
        .iter()
        .map(|entry| registry.create(client.clone(), entry.clone()))
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to create scanners")?;
    if scanners.is_empty() {
        warn!("no scanners configured, nothing will be managed");
    }

    let trigger_registry =
        Arc::new(triggers::build_registry(&config.triggers).context("Failed to create triggers")?);

    let agent = Agent::new(
        scanners,
        trigger_registry,
        metrics.clone(),
        config.resync_interval(),
        config.scale_interval(),
    );

    let (shutdown_tx, _) = broadcast::channel(1);
    let mut handles = agent.spawn(&shutdown_tx);

    if config.web.enabled {
        let listen_addr = config.web.listen_addr.clone();
        let web_metrics = metrics.clone();
        let web_shutdown = shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move {
            if let Err(err) = web::serve(listen_addr, web_metrics, web_shutdown).await {
                error!(error = %err, "web server exited");
            }
        }));
    }

    wait_for_signal().await?;

    info!("shutting down");
    let _ = shutdown_tx.send(());
    for handle in handles {
        let _ = handle.await;
    }
    info!("shutdown complete");
    Ok(())
}

/// Block until SIGINT or SIGTERM arrives.
async fn wait_for_signal() -> Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to wait for SIGINT")?;
            info!("received SIGINT");
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM");
        }
    }
    Ok(())
}
