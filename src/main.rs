//! # Voice Call Bridge - Main Application Entry Point
//!
//! Connects a telephony provider's live call audio to speech recognition, a
//! chat model and speech synthesis, so callers can hold a spoken conversation
//! with an assistant.
//!
//! ## Key Rust Concepts Used:
//! - **async/await**: every socket and upstream call is non-blocking
//! - **modules**: one module per concern (mod statements below)
//! - **Result<T, E>**: startup errors propagate with `?` and stop the process
//! - **Trait objects**: the per-call pipeline talks to its upstreams through traits
//!
//! ## Application Architecture:
//! - **config**: layered configuration (defaults, TOML file, environment)
//! - **state**: shared application state and call metrics
//! - **health**: health and metrics endpoints
//! - **handlers**: call-setup webhook, outbound calls, config view
//! - **websocket**: the media stream actor, one per call
//! - **pipeline**: per-call session, turn orchestration
//! - **recognition / generation / synthesis**: upstream service clients
//! - **audio**: frames, WAV container handling, transcoding, debug capture
//! - **telephony**: provider markup, REST client, media envelope
//! - **error**: HTTP errors and the call pipeline error taxonomy

mod audio;
mod config;
mod error;
mod generation;
mod handlers;
mod health;
mod pipeline;
mod recognition;
mod state;
mod synthesis;
mod telephony;
mod websocket;

use actix_web::{web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use pipeline::PipelineServices;
use state::{AppState, SharedMetrics};
use std::sync::atomic::{AtomicBool, Ordering};
use telephony::TwilioClient;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Set once SIGINT or SIGTERM arrives.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// ## Startup order:
/// 1. `.env`, then tracing
/// 2. configuration, validated before anything connects anywhere
/// 3. upstream clients (one set, shared by all calls)
/// 4. HTTP server with the webhook, outbound-call, media-stream and health routes
/// 5. wait for the server to exit or a shutdown signal
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting voice-call-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);
    for missing in config.missing_credentials() {
        warn!(credential = missing, "Credential not configured");
    }
    if config.server.public_url.is_empty() {
        warn!("server.public_url is not set; stream URLs will use the request Host header");
    }
    if config.debug.capture_audio {
        info!(dir = %config.debug.capture_dir, "Debug audio capture enabled");
    }

    let metrics = SharedMetrics::default();
    let services = PipelineServices::from_config(&config, metrics)?;
    let twilio = TwilioClient::from_config(&config.telephony)?;
    let stream_path = config.telephony.stream_path.clone();
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let app_state = AppState::new(config, services, twilio);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(TracingLogger::default())
            .route("/voice-response", web::post().to(handlers::voice_response))
            .route("/call-user", web::post().to(handlers::call_user))
            .route(&stream_path, web::get().to(websocket::media_stream))
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config)),
            )
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize tracing.
///
/// ## Environment Variables:
/// - `RUST_LOG`: filter directives; defaults to
///   `voice_call_bridge=debug,actix_web=info`
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_call_bridge=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Listen for SIGTERM and SIGINT and raise the shutdown flag.
///
/// Falls back to Ctrl+C alone if the Unix handlers cannot be installed.
fn setup_signal_handlers() {
    tokio::spawn(async {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Unix signal handlers unavailable, waiting for Ctrl+C");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "Failed to listen for Ctrl+C");
                    return;
                }
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Poll the shutdown flag every 100ms.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
