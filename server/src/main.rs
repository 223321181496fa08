// Copyright (c) 2026 CampusPay Contributors. MIT License.
// See LICENSE for details.

//! # CampusPay Server
//!
//! Entry point for the `campuspay-server` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the ledger store, wires the
//! core services, and serves the REST API.
//!
//! The binary supports three subcommands:
//!
//! - `run`     — start the API server
//! - `init`    — initialize the data directory and ledger database
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use campuspay_core::audit::AuditLog;
use campuspay_core::clock::{Clock, SystemClock};
use campuspay_core::directory::Directory;
use campuspay_core::engine::TransferEngine;
use campuspay_core::identity::IdentityVerifier;
use campuspay_core::ledger::store::LedgerStore;
use campuspay_core::requests::RequestWorkflow;
use campuspay_core::rules::RuleEvaluator;

use cli::{CampusPayCli, Commands};
use logging::LogFormat;
use metrics::PlatformMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CampusPayCli::parse();

    match cli.command {
        Commands::Run(args) => run_server(args).await,
        Commands::Init(args) => init_data_dir(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the API server and the metrics endpoint.
async fn run_server(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "campuspay_server=info,campuspay_core=info,tower_http=debug",
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        "starting campuspay-server"
    );

    // --- Persistent storage ---
    let db_path = args.data_dir.join("ledger");
    std::fs::create_dir_all(&args.data_dir)
        .with_context(|| format!("failed to create data directory: {}", args.data_dir.display()))?;
    let store = Arc::new(
        LedgerStore::open(&db_path)
            .with_context(|| format!("failed to open ledger at {}", db_path.display()))?,
    );
    tracing::info!(path = %db_path.display(), "ledger store opened");

    // --- Core services ---
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let audit = Arc::new(AuditLog::new(Arc::clone(&store), Arc::clone(&clock)));
    let directory = Arc::new(
        Directory::open(Arc::clone(&store), Arc::clone(&audit), Arc::clone(&clock))
            .context("failed to open directory trees")?,
    );
    let identity = Arc::new(IdentityVerifier::new(Arc::clone(&clock)));
    let engine = Arc::new(TransferEngine::new(
        Arc::clone(&store),
        RuleEvaluator::new(Arc::clone(&store)),
        identity,
        Arc::clone(&directory),
        Arc::clone(&audit),
        Arc::clone(&clock),
    ));
    let requests = Arc::new(RequestWorkflow::new(
        Arc::clone(&store),
        Arc::clone(&directory),
        Arc::clone(&engine),
        Arc::clone(&clock),
    ));

    // --- Metrics ---
    let platform_metrics = Arc::new(PlatformMetrics::new());

    // --- Application state ---
    let app_state = api::AppState {
        engine,
        store: Arc::clone(&store),
        directory,
        requests,
        audit,
        metrics: Arc::clone(&platform_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {api_addr}"))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&platform_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {metrics_addr}"))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    store.flush().context("final ledger flush failed")?;
    tracing::info!("campuspay-server stopped");
    Ok(())
}

/// Initializes the data directory and creates an empty ledger database.
fn init_data_dir(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("campuspay_server=info", LogFormat::Pretty);

    let data_dir = &args.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let db_path = data_dir.join("ledger");
    let store = LedgerStore::open(&db_path)
        .with_context(|| format!("failed to create ledger at {}", db_path.display()))?;
    store.flush().context("initial flush failed")?;

    println!("Data directory initialized.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Ledger database: {}", db_path.display());

    Ok(())
}

fn print_version() {
    println!("campuspay-server {}", env!("CARGO_PKG_VERSION"));
}

/// Resolves when the process receives SIGINT (ctrl-c) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
