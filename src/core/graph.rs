//! Chapter graph: loading, referential validation, and lint checks.

use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::schema::node::{is_terminal_id, Chapter, DialogueNode};

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON deserialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("chapter '{0}' has no dialogue nodes")]
    EmptyChapter(String),
    #[error("dialogue node at index {0} has an empty id")]
    EmptyNodeId(usize),
    #[error("duplicate dialogue node id '{0}'")]
    DuplicateNode(String),
    #[error("node '{node}' offers option '{option}' more than once")]
    DuplicateOption { node: String, option: String },
    #[error("node '{from}' references missing node '{to}'")]
    DanglingReference { from: String, to: String },
}

/// A non-fatal authoring problem reported by [`ScriptGraph::lint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LintWarning {
    /// No path from the entry node reaches this node.
    Unreachable(String),
    /// The node has options, so its `nextId` is never followed.
    SuccessorShadowed(String),
    /// An option with no label text.
    UnlabeledOption { node: String, option: String },
}

impl fmt::Display for LintWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable(id) => write!(f, "node '{}' is unreachable from the entry node", id),
            Self::SuccessorShadowed(id) => write!(
                f,
                "node '{}' has options and a nextId; the nextId is ignored",
                id
            ),
            Self::UnlabeledOption { node, option } => {
                write!(f, "option '{}' on node '{}' has no label text", option, node)
            }
        }
    }
}

/// Immutable, validated representation of one chapter.
///
/// Every successor and option target that is not the terminal sentinel is
/// guaranteed to resolve to a node in the graph.
#[derive(Debug, Clone)]
pub struct ScriptGraph {
    chapter_id: String,
    chapter_name: String,
    nodes: FxHashMap<String, DialogueNode>,
    order: Vec<String>,
}

impl ScriptGraph {
    /// Build and validate a graph from a parsed chapter document.
    pub fn from_chapter(chapter: Chapter) -> Result<ScriptGraph, GraphError> {
        if chapter.dialogues.is_empty() {
            return Err(GraphError::EmptyChapter(chapter.chapter_id));
        }

        let mut nodes = FxHashMap::default();
        let mut order = Vec::with_capacity(chapter.dialogues.len());

        for (index, node) in chapter.dialogues.into_iter().enumerate() {
            if node.id.is_empty() {
                return Err(GraphError::EmptyNodeId(index));
            }
            let mut seen_options = FxHashSet::default();
            for option in &node.options {
                if !seen_options.insert(option.id.as_str()) {
                    return Err(GraphError::DuplicateOption {
                        node: node.id.clone(),
                        option: option.id.clone(),
                    });
                }
            }
            if nodes.contains_key(&node.id) {
                return Err(GraphError::DuplicateNode(node.id));
            }
            order.push(node.id.clone());
            nodes.insert(node.id.clone(), node);
        }

        let graph = ScriptGraph {
            chapter_id: chapter.chapter_id,
            chapter_name: chapter.chapter_name,
            nodes,
            order,
        };
        graph.validate_references()?;
        debug!(chapter_id = %graph.chapter_id, nodes = graph.nodes.len(), "chapter_loaded");
        Ok(graph)
    }

    /// Parse a chapter from a JSON string.
    pub fn parse_json(input: &str) -> Result<ScriptGraph, GraphError> {
        let chapter: Chapter = serde_json::from_str(input)?;
        Self::from_chapter(chapter)
    }

    /// Parse a chapter from a RON string.
    pub fn parse_ron(input: &str) -> Result<ScriptGraph, GraphError> {
        let chapter: Chapter = ron::from_str(input)?;
        Self::from_chapter(chapter)
    }

    /// Load a chapter file. `.ron` files are read as RON, everything else
    /// as JSON.
    pub fn load_from_path(path: &Path) -> Result<ScriptGraph, GraphError> {
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|s| s.to_str()) {
            Some("ron") => Self::parse_ron(&contents),
            _ => Self::parse_json(&contents),
        }
    }

    fn validate_references(&self) -> Result<(), GraphError> {
        for id in &self.order {
            let node = &self.nodes[id];
            let targets = node
                .successor()
                .into_iter()
                .chain(node.options.iter().map(|o| o.target_id.as_str()))
                .filter(|t| !is_terminal_id(t));
            for target in targets {
                if !self.nodes.contains_key(target) {
                    return Err(GraphError::DanglingReference {
                        from: id.clone(),
                        to: target.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn chapter_id(&self) -> &str {
        &self.chapter_id
    }

    pub fn chapter_name(&self) -> &str {
        &self.chapter_name
    }

    /// The first node in document order.
    pub fn entry(&self) -> &str {
        // from_chapter rejects empty chapters
        &self.order[0]
    }

    pub fn node(&self, id: &str) -> Option<&DialogueNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in document order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Ids of every node reachable from `start` (inclusive).
    pub fn reachable_from(&self, start: &str) -> FxHashSet<String> {
        let mut seen = FxHashSet::default();
        let mut stack = vec![start.to_string()];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if !seen.insert(id) {
                continue;
            }
            if node.has_options() {
                for option in &node.options {
                    stack.push(option.target_id.clone());
                }
            } else if let Some(next) = node.successor() {
                stack.push(next.to_string());
            }
        }
        seen
    }

    /// Authoring checks that do not prevent playback.
    pub fn lint(&self) -> Vec<LintWarning> {
        let mut warnings = Vec::new();
        let reachable = self.reachable_from(self.entry());

        for id in &self.order {
            let node = &self.nodes[id];
            if !reachable.contains(id) {
                warnings.push(LintWarning::Unreachable(id.clone()));
            }
            if node.has_options() && node.successor().is_some() {
                warnings.push(LintWarning::SuccessorShadowed(id.clone()));
            }
            for option in &node.options {
                if option.text.trim().is_empty() {
                    warnings.push(LintWarning::UnlabeledOption {
                        node: id.clone(),
                        option: option.id.clone(),
                    });
                }
            }
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_JSON: &str = r#"{
        "chapterId": "ch01",
        "chapterName": "Morning",
        "dialogues": [
            { "id": "line_01", "speaker": "Alice", "content": "Hi",
              "background": "bg_school",
              "options": [ { "id": "o1", "text": "Wave back", "targetId": "line_02" } ] },
            { "id": "line_02", "speaker": "Alice", "content": "Bye", "nextId": "END" }
        ]
    }"#;

    #[test]
    fn parse_json_chapter() {
        let graph = ScriptGraph::parse_json(SAMPLE_JSON).unwrap();
        assert_eq!(graph.chapter_id(), "ch01");
        assert_eq!(graph.chapter_name(), "Morning");
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.entry(), "line_01");
        assert!(graph.contains("line_02"));
        assert_eq!(graph.node_ids().collect::<Vec<_>>(), vec!["line_01", "line_02"]);
    }

    #[test]
    fn parse_ron_chapter() {
        let ron = r#"#![enable(implicit_some)]
        (
            chapterId: "ch01",
            dialogues: [
                (id: "a", speaker: "Bob", content: "First", nextId: "b"),
                (id: "b", content: "Second", charLeft: "bob_neutral"),
            ],
        )"#;
        let graph = ScriptGraph::parse_ron(ron).unwrap();
        assert_eq!(graph.entry(), "a");
        assert_eq!(graph.node("b").unwrap().char_left.as_deref(), Some("bob_neutral"));
        assert_eq!(graph.node("b").unwrap().successor(), None);
    }

    #[test]
    fn dangling_successor_is_load_error() {
        let json = r#"{ "chapterId": "c", "dialogues": [
            { "id": "a", "content": "x", "nextId": "missing" }
        ] }"#;
        match ScriptGraph::parse_json(json) {
            Err(GraphError::DanglingReference { from, to }) => {
                assert_eq!(from, "a");
                assert_eq!(to, "missing");
            }
            other => panic!("expected dangling reference, got {:?}", other),
        }
    }

    #[test]
    fn dangling_option_target_is_load_error() {
        let json = r#"{ "chapterId": "c", "dialogues": [
            { "id": "a", "content": "x",
              "options": [ { "id": "o", "text": "go", "targetId": "nowhere" } ] }
        ] }"#;
        assert!(matches!(
            ScriptGraph::parse_json(json),
            Err(GraphError::DanglingReference { .. })
        ));
    }

    #[test]
    fn option_targeting_end_is_allowed() {
        let json = r#"{ "chapterId": "c", "dialogues": [
            { "id": "a", "content": "x",
              "options": [ { "id": "quit", "text": "Stop", "targetId": "END" } ] }
        ] }"#;
        assert!(ScriptGraph::parse_json(json).is_ok());
    }

    #[test]
    fn duplicate_node_rejected() {
        let json = r#"{ "chapterId": "c", "dialogues": [
            { "id": "a", "content": "x" },
            { "id": "a", "content": "y" }
        ] }"#;
        assert!(matches!(
            ScriptGraph::parse_json(json),
            Err(GraphError::DuplicateNode(id)) if id == "a"
        ));
    }

    #[test]
    fn duplicate_option_rejected() {
        let json = r#"{ "chapterId": "c", "dialogues": [
            { "id": "a", "content": "x", "options": [
                { "id": "o", "text": "one", "targetId": "a" },
                { "id": "o", "text": "two", "targetId": "a" }
            ] }
        ] }"#;
        assert!(matches!(
            ScriptGraph::parse_json(json),
            Err(GraphError::DuplicateOption { .. })
        ));
    }

    #[test]
    fn empty_id_and_empty_chapter_rejected() {
        let empty_id = r#"{ "chapterId": "c", "dialogues": [ { "id": "", "content": "x" } ] }"#;
        assert!(matches!(
            ScriptGraph::parse_json(empty_id),
            Err(GraphError::EmptyNodeId(0))
        ));

        let empty = r#"{ "chapterId": "c", "dialogues": [] }"#;
        assert!(matches!(
            ScriptGraph::parse_json(empty),
            Err(GraphError::EmptyChapter(_))
        ));
    }

    #[test]
    fn lint_reports_unreachable_and_shadowed() {
        let json = r#"{ "chapterId": "c", "dialogues": [
            { "id": "a", "content": "x", "nextId": "b",
              "options": [ { "id": "o", "text": "", "targetId": "c" } ] },
            { "id": "b", "content": "never" },
            { "id": "c", "content": "end" }
        ] }"#;
        let graph = ScriptGraph::parse_json(json).unwrap();
        let warnings = graph.lint();
        assert!(warnings.contains(&LintWarning::Unreachable("b".to_string())));
        assert!(warnings.contains(&LintWarning::SuccessorShadowed("a".to_string())));
        assert!(warnings.contains(&LintWarning::UnlabeledOption {
            node: "a".to_string(),
            option: "o".to_string(),
        }));
        assert!(!warnings.contains(&LintWarning::Unreachable("c".to_string())));
    }

    #[test]
    fn every_reference_resolves_after_load() {
        let graph = ScriptGraph::parse_json(SAMPLE_JSON).unwrap();
        for id in graph.node_ids() {
            let node = graph.node(id).unwrap();
            if let Some(next) = node.successor() {
                assert!(graph.contains(next));
            }
            for option in &node.options {
                assert!(graph.contains(&option.target_id));
            }
        }
    }
}
