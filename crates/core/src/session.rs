//! The mutable practice session owned by the turn controller.

use crate::scenario::{Exchange, Scenario};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default minimum normalized score for accepting a reply.
pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// One accepted turn, kept in the in-memory conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub prompt: String,
    pub transcript: String,
    pub score: u8,
    pub recorded_at: DateTime<Utc>,
}

/// Progress through one scenario.
///
/// `exchange_index` only moves forward while a scenario is active and is
/// reset to zero whenever a scenario is (re)selected. A `pending_exchange`
/// means a prompt has been spoken and its reply has not been scored yet.
#[derive(Debug, Clone)]
pub struct Session {
    scenario: Option<(String, Arc<Scenario>)>,
    exchange_index: usize,
    pending_exchange: Option<Exchange>,
    threshold: f64,
    last_transcript: String,
    log: Vec<TurnRecord>,
}

impl Session {
    /// Creates an empty session. `threshold` is clamped into `[0, 1]`.
    pub fn new(threshold: f64) -> Self {
        Self {
            scenario: None,
            exchange_index: 0,
            pending_exchange: None,
            threshold: threshold.clamp(0.0, 1.0),
            last_transcript: String::new(),
            log: Vec::new(),
        }
    }

    /// Makes `scenario` active (or none) and clears all progress.
    pub fn select(&mut self, scenario: Option<(String, Arc<Scenario>)>) {
        self.scenario = scenario;
        self.restart();
        self.last_transcript.clear();
    }

    /// Rewinds the active scenario to its first exchange.
    pub fn restart(&mut self) {
        self.exchange_index = 0;
        self.pending_exchange = None;
        self.log.clear();
    }

    pub fn scenario(&self) -> Option<&Arc<Scenario>> {
        self.scenario.as_ref().map(|(_, s)| s)
    }

    pub fn scenario_id(&self) -> Option<&str> {
        self.scenario.as_ref().map(|(id, _)| id.as_str())
    }

    pub fn exchange_index(&self) -> usize {
        self.exchange_index
    }

    pub fn total_exchanges(&self) -> usize {
        self.scenario().map_or(0, |s| s.exchanges.len())
    }

    /// The exchange at the current position, if any remain.
    pub fn current_exchange(&self) -> Option<&Exchange> {
        self.scenario()?.exchanges.get(self.exchange_index)
    }

    pub fn is_complete(&self) -> bool {
        self.scenario.is_some() && self.exchange_index >= self.total_exchanges()
    }

    pub fn pending_exchange(&self) -> Option<&Exchange> {
        self.pending_exchange.as_ref()
    }

    /// Marks the current exchange as spoken and awaiting a reply.
    pub fn mark_pending(&mut self) -> Option<&Exchange> {
        self.pending_exchange = self.current_exchange().cloned();
        self.pending_exchange.as_ref()
    }

    pub fn clear_pending(&mut self) {
        self.pending_exchange = None;
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Whether `score` (0–100) meets the acceptance threshold.
    pub fn accepts(&self, score: u8) -> bool {
        f64::from(score) >= self.threshold * 100.0
    }

    pub fn last_transcript(&self) -> &str {
        &self.last_transcript
    }

    pub fn set_last_transcript(&mut self, transcript: impl Into<String>) {
        self.last_transcript = transcript.into();
    }

    pub fn log(&self) -> &[TurnRecord] {
        &self.log
    }

    /// Logs the accepted reply to the pending exchange and moves to the next
    /// one. Returns `None` (and changes nothing) if nothing was pending.
    pub fn accept(&mut self, transcript: &str, score: u8) -> Option<TurnRecord> {
        let exchange = self.pending_exchange.take()?;
        let record = TurnRecord {
            prompt: exchange.prompt,
            transcript: transcript.to_string(),
            score,
            recorded_at: Utc::now(),
        };
        self.log.push(record.clone());
        self.exchange_index = (self.exchange_index + 1).min(self.total_exchanges());
        Some(record)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_step() -> (String, Arc<Scenario>) {
        (
            "train".to_string(),
            Arc::new(Scenario {
                title: "Train Inquiry".into(),
                description: String::new(),
                exchanges: vec![
                    Exchange::new("Excuse me, Madam.", "Yes, Please."),
                    Exchange::new("What time is the next train?", "At 6.45pm."),
                ],
                closings: vec![],
            }),
        )
    }

    #[test]
    fn test_accept_logs_and_advances() {
        let mut session = Session::default();
        session.select(Some(two_step()));
        assert_eq!(session.mark_pending().unwrap().prompt, "Excuse me, Madam.");

        let record = session.accept("Yes please", 100).unwrap();
        assert_eq!(record.prompt, "Excuse me, Madam.");
        assert_eq!(session.exchange_index(), 1);
        assert!(session.pending_exchange().is_none());
        assert_eq!(session.log().len(), 1);
        assert!(!session.is_complete());

        session.mark_pending();
        session.accept("six forty five", 90).unwrap();
        assert!(session.is_complete());
        assert!(session.current_exchange().is_none());
    }

    #[test]
    fn test_accept_without_pending_is_a_no_op() {
        let mut session = Session::default();
        session.select(Some(two_step()));
        assert!(session.accept("Yes please", 100).is_none());
        assert_eq!(session.exchange_index(), 0);
        assert!(session.log().is_empty());
    }

    #[test]
    fn test_select_resets_everything() {
        let mut session = Session::default();
        session.select(Some(two_step()));
        session.mark_pending();
        session.accept("Yes please", 100);
        session.mark_pending();
        session.set_last_transcript("At six");

        session.select(Some(two_step()));
        assert_eq!(session.exchange_index(), 0);
        assert!(session.pending_exchange().is_none());
        assert!(session.log().is_empty());
        assert_eq!(session.last_transcript(), "");

        session.select(None);
        assert!(session.scenario().is_none());
        assert!(!session.is_complete());
        assert_eq!(session.total_exchanges(), 0);
    }

    #[test]
    fn test_threshold_boundaries() {
        let session = Session::default();
        assert!(session.accepts(80));
        assert!(!session.accepts(79));

        assert_eq!(Session::new(1.7).threshold(), 1.0);
        assert!(Session::new(-0.2).accepts(0));
    }
}
