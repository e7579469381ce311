//! Main Entrypoint for the Conversation Coach API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading the scenario catalog.
//! 3. Choosing the speech backend (local tools or a remote speech service).
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use coach_api::{
    config::{Config, SpeechBackend},
    engine::LocalSpeechEngine,
    router::create_router,
    state::AppState,
};
use coach_core::{HttpSpeechClient, ScenarioCatalog, SpeechSynthesizer, Transcriber};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 2. Load Scenarios ---
    let catalog = ScenarioCatalog::load_dir(&config.scenarios_path).with_context(|| {
        format!(
            "Failed to load scenarios from {}",
            config.scenarios_path.display()
        )
    })?;
    info!(count = catalog.len(), "Scenario catalog loaded.");

    // --- 3. Initialize Speech Backend ---
    let (synthesizer, transcriber): (Arc<dyn SpeechSynthesizer>, Arc<dyn Transcriber>) =
        match &config.speech_backend {
            SpeechBackend::Local => {
                info!("Using local speech tools.");
                let engine = Arc::new(LocalSpeechEngine::new(config.engine.clone()));
                (engine.clone(), engine)
            }
            SpeechBackend::Remote { url } => {
                info!(%url, "Using remote speech service.");
                let client = Arc::new(HttpSpeechClient::new(url.clone()));
                (client.clone(), client)
            }
        };

    let app_state = Arc::new(AppState {
        catalog: Arc::new(catalog),
        synthesizer,
        transcriber,
        config: Arc::new(config.clone()),
    });

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    info!(
        backend = ?config.speech_backend,
        threshold = config.match_threshold,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
