//! Record of visited nodes and choices made, used for save/resume and for
//! catching a choice node that gets entered twice.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JourneyError {
    #[error("node '{node}' already recorded choice '{existing}', refusing '{attempted}'")]
    DuplicateChoice {
        node: String,
        existing: String,
        attempted: String,
    },
}

/// Append-only visit sequence plus a write-once map of node id to chosen
/// option id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneyRecorder {
    visited: Vec<String>,
    choices: BTreeMap<String, String>,
}

impl JourneyRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always appends; loops show up as repeated ids.
    pub fn record_visit(&mut self, node_id: &str) {
        self.visited.push(node_id.to_string());
    }

    /// Insert-if-absent. A second choice at the same node is an error and
    /// leaves the map untouched.
    pub fn record_choice(&mut self, node_id: &str, option_id: &str) -> Result<(), JourneyError> {
        if let Some(existing) = self.choices.get(node_id) {
            return Err(JourneyError::DuplicateChoice {
                node: node_id.to_string(),
                existing: existing.clone(),
                attempted: option_id.to_string(),
            });
        }
        self.choices
            .insert(node_id.to_string(), option_id.to_string());
        Ok(())
    }

    pub fn visited(&self) -> &[String] {
        &self.visited
    }

    pub fn choices(&self) -> &BTreeMap<String, String> {
        &self.choices
    }

    pub fn choice_at(&self, node_id: &str) -> Option<&str> {
        self.choices.get(node_id).map(String::as_str)
    }

    pub fn has_visited(&self, node_id: &str) -> bool {
        self.visited.iter().any(|id| id == node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visits_are_never_deduplicated() {
        let mut journey = JourneyRecorder::new();
        journey.record_visit("a");
        journey.record_visit("b");
        journey.record_visit("a");
        assert_eq!(journey.visited(), &["a", "b", "a"]);
        assert!(journey.has_visited("b"));
        assert!(!journey.has_visited("c"));
    }

    #[test]
    fn duplicate_choice_is_rejected() {
        let mut journey = JourneyRecorder::new();
        journey.record_choice("q1", "yes").unwrap();
        let err = journey.record_choice("q1", "no").unwrap_err();
        assert_eq!(
            err,
            JourneyError::DuplicateChoice {
                node: "q1".to_string(),
                existing: "yes".to_string(),
                attempted: "no".to_string(),
            }
        );
        assert_eq!(journey.choice_at("q1"), Some("yes"));
        assert_eq!(journey.choices().len(), 1);
    }
}
