//! sift-server - sensitive image classification service
//!
//! Serves predictions from the active model, stores user feedback, and
//! retrains the model from feedback that disagreed with it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sift_common::config::{self, ServiceConfig};
use sift_common::db::init_database_with_timeout;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sift_server::db::SqliteFeedbackStore;
use sift_server::model::{ModelRegistry, OnnxLoader};
use sift_server::retraining::{CommandTrainer, RetrainingSettings};
use sift_server::{build_router, scheduler, AppState};

/// Command-line arguments for sift-server
#[derive(Parser, Debug)]
#[command(name = "sift-server")]
#[command(about = "Sensitive image classification and feedback retraining service")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "SIFT_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder for the database, models and work files
    #[arg(short, long, env = "SIFT_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Run one retraining cycle and exit
    Retrain,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref());
    config::ensure_root_folder(&root_folder).context("Failed to initialize root folder")?;
    let config = ServiceConfig::load(args.config.as_deref(), &root_folder)
        .context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        built = env!("BUILD_TIMESTAMP"),
        profile = env!("BUILD_PROFILE"),
        "Starting sift-server"
    );
    info!("Root folder: {}", root_folder.display());
    info!("Database: {}", config.database.path.display());
    info!("Models root: {}", config.model.models_root.display());

    let pool = init_database_with_timeout(&config.database.path, config.database.max_lock_wait_ms)
        .await
        .context("Failed to open feedback database")?;
    let store = Arc::new(SqliteFeedbackStore::new(
        pool,
        config.database.max_lock_wait_ms,
    ));

    let loader = Arc::new(OnnxLoader::new(
        config.model.default_input_width,
        config.model.default_input_height,
    ));
    let registry = Arc::new(
        ModelRegistry::open(
            &config.model.models_root,
            loader,
            config.model.initial_model_dir.as_deref(),
        )
        .await
        .context("Failed to load active model")?,
    );

    let trainer = Arc::new(
        CommandTrainer::new(config.retraining.trainer_command.clone())
            .context("Invalid trainer command")?,
    );
    let settings = RetrainingSettings::from_config(&config.retraining, config.model.sensitive_class);
    let mut state = AppState::new(store, registry, trainer, settings);
    state.max_body_bytes = config.server.max_body_bytes;

    if args.command == Some(Command::Retrain) {
        let outcome = state
            .orchestrator
            .run_cycle()
            .await
            .context("Retraining cycle failed")?;
        info!(outcome = ?outcome, "Retraining cycle complete");
        return Ok(());
    }

    let _scheduler = scheduler::start(state.orchestrator.clone(), &config.retraining).await;

    let app = build_router(state);
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
