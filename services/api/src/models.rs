//! API Models
//!
//! Request and response bodies of the REST API, annotated for OpenAPI
//! generation with `utoipa`.

use coach_core::{Scenario, ScenarioSummary};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema, Debug)]
pub struct TtsRequest {
    #[schema(example = "Excuse me, Madam.")]
    #[serde(default)]
    pub text: Option<String>,
}

/// Multipart upload accepted by `/api/stt`.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct SttUpload {
    /// Recorded reply, at most 10 MiB.
    #[schema(value_type = String, format = Binary)]
    pub audio: Vec<u8>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct SttResponse {
    #[schema(example = "yes please")]
    pub transcript: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ScenarioListing {
    #[schema(example = "train")]
    pub id: String,
    #[schema(example = "Scenario 1 – Train Inquiry")]
    pub title: String,
    pub description: String,
    /// Number of exchanges in the scenario.
    pub exchanges: usize,
}

impl From<ScenarioSummary> for ScenarioListing {
    fn from(summary: ScenarioSummary) -> Self {
        Self {
            id: summary.id,
            title: summary.title,
            description: summary.description,
            exchanges: summary.exchanges,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ExchangeBody {
    pub prompt: String,
    pub response: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ScenarioDetail {
    pub id: String,
    pub title: String,
    pub description: String,
    pub exchanges: Vec<ExchangeBody>,
    pub closings: Vec<String>,
}

impl ScenarioDetail {
    pub fn new(id: &str, scenario: &Scenario) -> Self {
        Self {
            id: id.to_string(),
            title: scenario.title.clone(),
            description: scenario.description.clone(),
            exchanges: scenario
                .exchanges
                .iter()
                .map(|e| ExchangeBody {
                    prompt: e.prompt.clone(),
                    response: e.response.clone(),
                })
                .collect(),
            closings: scenario.closings.clone(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
