//! # Command Line Interface
//!
//! The process surface: one binary with a subcommand per controller. Both
//! subcommands share the reconcile-loop flags; the rotator additionally
//! gates upstream key deletion, the sync controller optionally takes a
//! kubeconfig path.

use crate::clients::{GoogleSecretManager, KubeClusterClient, SecretStore};
use crate::config::{ConfigAgent, CronScheduler};
use crate::provision::{known_kind_tags, ProvisionerRegistry, ServiceAccountKeyProvisioner};
use crate::rotation::RotationController;
use crate::scheduler::Scheduler;
use crate::sync::SyncController;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "keywheel")]
#[command(about = "Rotates Secret Manager credentials and syncs them into cluster secrets")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Emit JSON log lines instead of human-readable output
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the rotation controller
    Rotator {
        /// Path to the configuration file
        #[arg(long)]
        config_path: String,

        /// Resync period in milliseconds
        #[arg(long, default_value = "1000")]
        period: u64,

        /// Run a single pass and exit
        #[arg(long)]
        run_once: bool,

        /// Actually delete superseded upstream credentials instead of
        /// logging what would be deleted
        #[arg(long)]
        enable_deletion: bool,
    },

    /// Run the sync controller
    Sync {
        /// Path to the configuration file
        #[arg(long)]
        config_path: String,

        /// Resync period in milliseconds
        #[arg(long, default_value = "1000")]
        period: u64,

        /// Run a single pass and exit
        #[arg(long)]
        run_once: bool,

        /// Path to a kubeconfig file; in-cluster configuration otherwise
        #[arg(long)]
        kubeconfig: Option<String>,
    },
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    crate::observability::init_logging(cli.json_logs)?;

    info!(app_name = crate::APP_NAME, version = crate::VERSION, "Starting keywheel");

    match cli.command {
        Commands::Rotator { config_path, period, run_once, enable_deletion } => {
            run_rotator(config_path, period, run_once, enable_deletion).await
        }
        Commands::Sync { config_path, period, run_once, kubeconfig } => {
            run_sync(config_path, period, run_once, kubeconfig.as_deref()).await
        }
    }
}

async fn run_rotator(
    config_path: String,
    period: u64,
    run_once: bool,
    enable_deletion: bool,
) -> anyhow::Result<()> {
    let mut registry = ProvisionerRegistry::new();
    registry.register(Arc::new(ServiceAccountKeyProvisioner::new(enable_deletion).await?));
    let registry = Arc::new(registry);

    let cron = Arc::new(CronScheduler::new());
    let agent = Arc::new(ConfigAgent::new(Arc::clone(&cron), registry.kind_tags()));
    let watch = agent.watch(&config_path)?;

    let cancel = CancellationToken::new();
    cron.start();
    let watch_task = tokio::spawn(watch.run(cancel.clone()));
    spawn_shutdown_listener(cancel.clone());

    let store: Arc<dyn SecretStore> = Arc::new(GoogleSecretManager::new().await?);
    let controller =
        Arc::new(RotationController::new(store, Arc::clone(&agent), Arc::clone(&registry)));

    Scheduler::new(Duration::from_millis(period), run_once)
        .run(controller, cancel.clone())
        .await;

    cancel.cancel();
    cron.stop();
    let _ = watch_task.await;
    Ok(())
}

async fn run_sync(
    config_path: String,
    period: u64,
    run_once: bool,
    kubeconfig: Option<&str>,
) -> anyhow::Result<()> {
    let cron = Arc::new(CronScheduler::new());
    let agent = Arc::new(ConfigAgent::new(Arc::clone(&cron), known_kind_tags()));
    let watch = agent.watch(&config_path)?;

    let cancel = CancellationToken::new();
    let watch_task = tokio::spawn(watch.run(cancel.clone()));
    spawn_shutdown_listener(cancel.clone());

    let store: Arc<dyn SecretStore> = Arc::new(GoogleSecretManager::new().await?);
    let cluster = Arc::new(KubeClusterClient::new(kubeconfig).await?);
    let controller = Arc::new(SyncController::new(store, cluster, Arc::clone(&agent)));

    Scheduler::new(Duration::from_millis(period), run_once)
        .run(controller, cancel.clone())
        .await;

    cancel.cancel();
    let _ = watch_task.await;
    Ok(())
}

/// Cancel the token on SIGINT or SIGTERM.
fn spawn_shutdown_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            let _ = tokio::signal::ctrl_c().await;
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(_) => std::future::pending::<()>().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }

        info!("Shutdown signal received");
        cancel.cancel();
    });
}
