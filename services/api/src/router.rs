//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoint, static front-end files and
//! OpenAPI documentation.

use crate::{
    handlers,
    models::{
        ErrorResponse, ExchangeBody, ScenarioDetail, ScenarioListing, SttResponse, SttUpload,
        TtsRequest,
    },
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use coach_core::speech::MAX_SAMPLE_BYTES;
use std::sync::Arc;
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Room for multipart framing on top of the audio itself.
const UPLOAD_OVERHEAD: usize = 64 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::tts,
        handlers::stt,
        handlers::list_scenarios,
        handlers::get_scenario,
    ),
    components(
        schemas(TtsRequest, SttUpload, SttResponse, ScenarioListing, ScenarioDetail, ExchangeBody, ErrorResponse)
    ),
    tags(
        (name = "Coach API", description = "Speech endpoints and practice scenarios for the conversation coach")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let static_dir = app_state.config.static_dir.clone();

    let api_router = Router::new()
        .route("/api/tts", post(handlers::tts))
        .route(
            "/api/stt",
            post(handlers::stt).layer(DefaultBodyLimit::max(MAX_SAMPLE_BYTES + UPLOAD_OVERHEAD)),
        )
        .route("/api/scenarios", get(handlers::list_scenarios))
        .route("/api/scenarios/{id}", get(handlers::get_scenario))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    let router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router);

    match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_every_endpoint() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/tts",
            "/api/stt",
            "/api/scenarios",
            "/api/scenarios/{id}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
