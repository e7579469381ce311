//! Axum Handlers for the REST API
//!
//! Speech endpoints used by the browser client and the scenario listing.
//! It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use coach_core::{AudioSample, SpeechError, speech::MAX_SAMPLE_BYTES};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    models::{ErrorResponse, ScenarioDetail, ScenarioListing, SttResponse, SttUpload, TtsRequest},
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    PayloadTooLarge(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::PayloadTooLarge(message) => {
                (StatusCode::PAYLOAD_TOO_LARGE, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

fn speech_failure(err: SpeechError) -> ApiError {
    match err {
        SpeechError::InvalidInput(message) => ApiError::BadRequest(message),
        SpeechError::EmptyResult => ApiError::BadRequest("No audio uploaded".to_string()),
        err @ SpeechError::TooLarge { .. } => ApiError::PayloadTooLarge(err.to_string()),
        err => ApiError::InternalServerError(err.into()),
    }
}

/// Synthesize speech for a line of text.
#[utoipa::path(
    post,
    path = "/api/tts",
    request_body = TtsRequest,
    responses(
        (status = 200, description = "WAV audio of the spoken text", content_type = "audio/wav"),
        (status = 400, description = "Text is missing", body = ErrorResponse),
        (status = 500, description = "Synthesis failed", body = ErrorResponse)
    )
)]
pub async fn tts(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TtsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let text = payload
        .text
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Text is required".to_string()))?;

    let clip = state
        .synthesizer
        .synthesize(&text)
        .await
        .map_err(speech_failure)?;
    info!(bytes = clip.bytes.len(), "TTS request served");
    Ok(([(header::CONTENT_TYPE, clip.mime)], clip.bytes))
}

/// Transcribe an uploaded recording.
#[utoipa::path(
    post,
    path = "/api/stt",
    request_body(content = SttUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Transcript of the recording", body = SttResponse),
        (status = 400, description = "No audio uploaded", body = ErrorResponse),
        (status = 413, description = "Upload exceeds 10 MiB", body = ErrorResponse),
        (status = 500, description = "Transcription failed", body = ErrorResponse)
    )
)]
pub async fn stt(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<SttResponse>, ApiError> {
    let too_large = || ApiError::PayloadTooLarge(format!("Upload exceeds {MAX_SAMPLE_BYTES} bytes"));
    let mut sample = None;
    loop {
        let field = multipart.next_field().await.map_err(|e| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                too_large()
            } else {
                ApiError::BadRequest(e.body_text())
            }
        })?;
        let Some(field) = field else { break };
        if field.name() != Some("audio") {
            continue;
        }
        let mime = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await.map_err(|e| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                too_large()
            } else {
                ApiError::BadRequest(e.body_text())
            }
        })?;
        sample = Some(AudioSample::new(bytes.to_vec(), mime));
        break;
    }

    let sample = sample.ok_or_else(|| ApiError::BadRequest("No audio uploaded".to_string()))?;
    if sample.bytes.len() > MAX_SAMPLE_BYTES {
        warn!(bytes = sample.bytes.len(), "Rejecting oversized upload");
        return Err(too_large());
    }

    let transcript = state
        .transcriber
        .transcribe(sample)
        .await
        .map_err(speech_failure)?;
    info!(chars = transcript.len(), "STT request served");
    Ok(Json(SttResponse { transcript }))
}

/// List the available practice scenarios.
#[utoipa::path(
    get,
    path = "/api/scenarios",
    responses(
        (status = 200, description = "Scenario summaries ordered by id", body = [ScenarioListing])
    )
)]
pub async fn list_scenarios(State(state): State<Arc<AppState>>) -> Json<Vec<ScenarioListing>> {
    Json(
        state
            .catalog
            .summaries()
            .into_iter()
            .map(ScenarioListing::from)
            .collect(),
    )
}

/// Get the full script of one scenario.
#[utoipa::path(
    get,
    path = "/api/scenarios/{id}",
    responses(
        (status = 200, description = "Scenario script", body = ScenarioDetail),
        (status = 404, description = "Scenario not found", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Scenario id")
    )
)]
pub async fn get_scenario(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ScenarioDetail>, ApiError> {
    let scenario = state
        .catalog
        .get(&id)
        .ok_or_else(|| ApiError::NotFound(format!("Scenario with id '{}' not found", id)))?;
    Ok(Json(ScenarioDetail::new(&id, &scenario)))
}

#[cfg(test)]
mod tests {
    use crate::router::create_router;
    use crate::state::testing::test_state;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{Value, json};
    use tower::util::ServiceExt;

    const BOUNDARY: &str = "coach-test-boundary";

    fn multipart_body(field: &str, mime: &str, data: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"response.webm\"\r\nContent-Type: {mime}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn stt_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/stt")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_tts_returns_wav() {
        let app = create_router(test_state());
        let request = Request::builder()
            .method("POST")
            .uri("/api/tts")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "text": "Excuse me, Madam." }).to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "audio/wav");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"Excuse me, Madam.");
    }

    #[tokio::test]
    async fn test_tts_requires_text() {
        let app = create_router(test_state());
        let request = Request::builder()
            .method("POST")
            .uri("/api/tts")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "text": "  " }).to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["message"], "Text is required");
    }

    #[tokio::test]
    async fn test_tts_failure_is_internal_error() {
        let app = create_router(test_state());
        let request = Request::builder()
            .method("POST")
            .uri("/api/tts")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "text": "fail" }).to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_stt_transcribes_audio_field() {
        let app = create_router(test_state());
        let response = app
            .oneshot(stt_request(multipart_body(
                "audio",
                "audio/webm",
                b"yes please",
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "transcript": "yes please" }));
    }

    #[tokio::test]
    async fn test_stt_without_audio_field_is_bad_request() {
        let app = create_router(test_state());
        let response = app
            .oneshot(stt_request(multipart_body("file", "audio/webm", b"data")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["message"], "No audio uploaded");
    }

    #[tokio::test]
    async fn test_stt_rejects_oversized_upload() {
        let app = create_router(test_state());
        let huge = vec![b'a'; coach_core::speech::MAX_SAMPLE_BYTES + 1];
        let response = app
            .oneshot(stt_request(multipart_body("audio", "audio/webm", &huge)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_scenarios_are_listed_and_fetched() {
        let app = create_router(test_state());
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/scenarios")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let listing = json_body(response).await;
        assert_eq!(listing[0]["id"], "train");
        assert_eq!(listing[0]["exchanges"], 2);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/scenarios/train")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await["exchanges"][0]["prompt"],
            "Excuse me, Madam."
        );

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/scenarios/moon")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
