//! Serializable playback position and the codec that builds and restores it.
//!
//! A snapshot carries asset names only, never resource handles, so it can be
//! written anywhere and read back in a fresh process.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::core::graph::ScriptGraph;
use crate::core::history::HistoryEntry;
use crate::core::journey::JourneyRecorder;
use crate::schema::node::{Directive, Slot};
use crate::schema::value::MetaValue;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot points at node '{0}', which is not in the chapter")]
    NodeNotFound(String),
    #[error("snapshot belongs to chapter '{found}', expected '{expected}'")]
    ChapterMismatch { expected: String, found: String },
    #[error("snapshot version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("RON serialization error: {0}")]
    RonEncode(#[from] ron::Error),
}

/// Everything needed to put a player back where they were.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub chapter_id: String,
    pub current_node_id: String,
    pub journey: JourneyRecorder,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub stage: BTreeMap<Slot, String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, MetaValue>,
}

/// State recovered from a snapshot, ready to be installed in an engine.
#[derive(Debug, Clone)]
pub struct Restored {
    pub node_id: String,
    pub journey: JourneyRecorder,
    pub history: Vec<HistoryEntry>,
    /// One directive per slot: show the saved asset, or clear the slot.
    pub stage_plan: Vec<(Slot, Directive)>,
}

pub struct SnapshotCodec;

impl SnapshotCodec {
    pub fn build(
        chapter_id: &str,
        current_node_id: &str,
        journey: &JourneyRecorder,
        history: Vec<HistoryEntry>,
        stage: BTreeMap<Slot, String>,
        metadata: BTreeMap<String, MetaValue>,
    ) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            chapter_id: chapter_id.to_string(),
            current_node_id: current_node_id.to_string(),
            journey: journey.clone(),
            history,
            stage,
            metadata,
        }
    }

    /// Check a snapshot against the graph it is being restored into.
    ///
    /// The stage plan covers every slot so that resuming shows exactly the
    /// saved stage, independent of whatever was displayed before.
    pub fn restore(snapshot: &Snapshot, graph: &ScriptGraph) -> Result<Restored, SnapshotError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                found: snapshot.version,
            });
        }
        if snapshot.chapter_id != graph.chapter_id() {
            return Err(SnapshotError::ChapterMismatch {
                expected: graph.chapter_id().to_string(),
                found: snapshot.chapter_id.clone(),
            });
        }
        if !graph.contains(&snapshot.current_node_id) {
            return Err(SnapshotError::NodeNotFound(
                snapshot.current_node_id.clone(),
            ));
        }

        let stage_plan = Slot::ALL
            .iter()
            .map(|slot| {
                let directive = match snapshot.stage.get(slot) {
                    Some(name) => Directive::show(name.clone()),
                    None => Directive::Clear,
                };
                (*slot, directive)
            })
            .collect();

        Ok(Restored {
            node_id: snapshot.current_node_id.clone(),
            journey: snapshot.journey.clone(),
            history: snapshot.history.clone(),
            stage_plan,
        })
    }

    pub fn to_json(snapshot: &Snapshot) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(snapshot)?)
    }

    pub fn from_json(input: &str) -> Result<Snapshot, SnapshotError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn to_ron(snapshot: &Snapshot) -> Result<String, SnapshotError> {
        Ok(ron::ser::to_string_pretty(
            snapshot,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    pub fn from_ron(input: &str) -> Result<Snapshot, SnapshotError> {
        Ok(ron::from_str(input)?)
    }
}
