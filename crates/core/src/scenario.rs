//! Scenario content: the scripted exchanges a learner practices.
//!
//! Scenarios are injected configuration. The catalog loads them from a
//! directory of JSON documents, one scenario per `<id>.json` file, so the
//! turn controller and scorer never depend on any particular script.

use crate::error::ScenarioError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// One prompt the coach speaks and the reply the learner is expected to give.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub prompt: String,
    pub response: String,
}

impl Exchange {
    pub fn new(prompt: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            response: response.into(),
        }
    }
}

/// An ordered script of exchanges followed by closing lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub exchanges: Vec<Exchange>,
    /// Lines spoken once every exchange has been answered.
    #[serde(default)]
    pub closings: Vec<String>,
}

impl Scenario {
    fn validate(&self, id: &str) -> Result<(), ScenarioError> {
        if self.title.trim().is_empty() {
            return Err(ScenarioError::Invalid {
                id: id.to_string(),
                reason: "title must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Short listing entry used by scenario pickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub exchanges: usize,
}

/// The set of scenarios available to a session, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ScenarioCatalog {
    scenarios: BTreeMap<String, Arc<Scenario>>,
}

impl ScenarioCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every `*.json` file in `dir`; the file stem becomes the id.
    pub fn load_dir(dir: &Path) -> Result<Self, ScenarioError> {
        let io_err = |source| ScenarioError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut catalog = Self::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let raw = std::fs::read_to_string(&path).map_err(|source| ScenarioError::Io {
                path: path.clone(),
                source,
            })?;
            let scenario: Scenario =
                serde_json::from_str(&raw).map_err(|source| ScenarioError::Parse {
                    path: path.clone(),
                    source,
                })?;
            debug!(id, exchanges = scenario.exchanges.len(), "Loaded scenario");
            catalog.insert(id, scenario)?;
        }

        info!(count = catalog.len(), path = %dir.display(), "Scenario catalog loaded");
        Ok(catalog)
    }

    /// Adds or replaces a scenario.
    pub fn insert(
        &mut self,
        id: impl Into<String>,
        scenario: Scenario,
    ) -> Result<(), ScenarioError> {
        let id = id.into();
        scenario.validate(&id)?;
        self.scenarios.insert(id, Arc::new(scenario));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<Scenario>> {
        self.scenarios.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn summaries(&self) -> Vec<ScenarioSummary> {
        self.scenarios
            .iter()
            .map(|(id, scenario)| ScenarioSummary {
                id: id.clone(),
                title: scenario.title.clone(),
                description: scenario.description.clone(),
                exchanges: scenario.exchanges.len(),
            })
            .collect()
    }
}
