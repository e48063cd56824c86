//! # Music Transcription Service - Main Application Entry Point
//!
//! HTTP service that turns uploaded `.wav` recordings into MusicXML by running
//! an external transcription tool.
//!
//! ## Application Architecture:
//! - **config**: configuration from defaults, config file and environment
//! - **limiter**: slot pool capping concurrent transcriber processes
//! - **transcription**: command template, process runner, conversion worker
//! - **storage**: temp files for uploads and results, with guaranteed cleanup
//! - **state**: shared application state and metrics
//! - **handlers** / **health**: HTTP endpoints
//! - **middleware**: request logging and metrics
//! - **error**: HTTP error responses

mod config;
mod error;
mod handlers;
mod health;
mod limiter;
mod middleware;
mod state;
mod storage;
mod transcription;

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use crate::config::AppConfig;
use crate::limiter::SlotLimiter;
use crate::state::AppState;
use crate::storage::TempSaver;
use crate::transcription::Worker;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const BANNER: &str = r#"
     __  ___           _
    /  |/  /_  _______(_)____
   / /|_/ / / / / ___/ / ___/
  / /  / / /_/ (__  ) / /__
 /_/  /_/\__,_/____/_/\___/
   __                                  _ __
  / /__________ _____  _______________(_) /_  ___  _____
 / __/ ___/ __ `/ __ \/ ___/ ___/ ___/ / __ \/ _ \/ ___/
/ /_/ /  / /_/ / / / (__  ) /__/ /  / / /_/ /  __/ /
\__/_/   \__,_/_/ /_/____/\___/_/  /_/_.___/\___/_/"#;

/// Startup sequence:
/// 1. Load `.env`, set up tracing
/// 2. Load and validate configuration
/// 3. Build the temp file saver, transcriber worker and slot limiter
/// 4. Serve HTTP until SIGINT/SIGTERM, then stop gracefully
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load().context("can't load configuration")?;
    config.validate().context("invalid configuration")?;

    print_banner();

    let saver = TempSaver::new(&config.storage.temp_dir).context("can't init file saver")?;
    info!(temp_dir = %saver.dir().display(), "Temp dir");
    let worker = Worker::new(&config.transcriber.command, config.transcriber_timeout())
        .context("can't init transcriber wrapper")?;
    let limiter = SlotLimiter::new(config.limiter.max_concurrent, config.limiter_wait_timeout())
        .context("can't init rate limiter")?;
    info!(
        max_concurrent = limiter.capacity(),
        wait_timeout_ms = config.limiter.wait_timeout_ms,
        "Slot limiter ready"
    );

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let request_timeout = config.request_timeout();
    let app_state = AppState::new(config, limiter, Arc::new(saver), Arc::new(worker));

    info!("Starting HTTP music transcription service on {}", bind_addr);
    info!("Routes:");
    for (method, path) in handlers::ROUTES {
        info!("  {} {}", method, path);
    }

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .configure(handlers::configure)
    })
    .client_request_timeout(request_timeout)
    .keep_alive(request_timeout)
    .disable_signals()
    .bind(&bind_addr)
    .with_context(|| format!("can't bind {}", bind_addr))?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Structured logging to stdout. `RUST_LOG` overrides the default filter.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "music_transcription_service=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("can't init tracing")?;

    Ok(())
}

fn print_banner() {
    println!("{} v: {}\n", BANNER, env!("CARGO_PKG_VERSION"));
    println!("{}", "_".repeat(56));
}

/// Resolves on SIGINT (Ctrl+C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
