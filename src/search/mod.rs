//! Beam search over a tree of generated thoughts.
//!
//! The tree is never materialized up front: every level is produced by an
//! [`ExpansionOracle`] that proposes and scores children for a node. The
//! explorer keeps the best `beam_width` candidates per depth, tolerates
//! individual oracle failures, and falls back to cloning the frontier forward
//! when a whole level fails.

mod beam;

pub use beam::*;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Configuration for beam search runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum depth explored below the root
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Maximum number of nodes kept per depth
    #[serde(default = "default_beam_width")]
    pub beam_width: usize,
    /// Lower bound for the beam width when failures shrink it
    #[serde(default = "default_min_beam_width")]
    pub min_beam_width: usize,
    /// Optional cumulative cost ceiling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_budget: Option<f64>,
    /// Children requested from the oracle per expansion
    #[serde(default = "default_branching")]
    pub branching: usize,
}

fn default_max_depth() -> usize {
    3
}

fn default_beam_width() -> usize {
    3
}

fn default_min_beam_width() -> usize {
    1
}

fn default_branching() -> usize {
    3
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            beam_width: default_beam_width(),
            min_beam_width: default_min_beam_width(),
            cost_budget: None,
            branching: default_branching(),
        }
    }
}

/// Free-form metadata attached to a thought.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThoughtMetadata {
    /// Pipeline stage that produced the thought (e.g. "root", "expansion").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Position among the siblings produced by the same expansion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineage_index: Option<usize>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A unit of reasoning content. The content is opaque to the explorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub metadata: ThoughtMetadata,
}

impl Thought {
    /// Create a thought with the given content
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            score: None,
            confidence: None,
            evidence: Vec::new(),
            metadata: ThoughtMetadata::default(),
        }
    }

    /// Set score
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    /// Set confidence (clamped to 0.0-1.0)
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    /// Add a piece of evidence
    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence.push(evidence.into());
        self
    }

    /// Set stage tag
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.metadata.stage = Some(stage.into());
        self
    }

    /// Set lineage index
    pub fn with_lineage_index(mut self, index: usize) -> Self {
        self.metadata.lineage_index = Some(index);
        self
    }
}

/// A point in the search tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node<T> {
    pub id: String,
    pub payload: T,
    /// Search priority; higher is better.
    pub score: f64,
    /// Distance from the root (root = 0).
    pub depth: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Set on clones advanced in place of failed expansions.
    #[serde(default)]
    pub is_fallback: bool,
}

impl<T> Node<T> {
    /// Create a root node at depth 0
    pub fn root(payload: T, score: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            payload,
            score,
            depth: 0,
            parent_id: None,
            is_fallback: false,
        }
    }

    /// Create a child of `parent` one level deeper
    pub fn child_of<P>(parent: &Node<P>, payload: T, score: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            payload,
            score,
            depth: parent.depth + 1,
            parent_id: Some(parent.id.clone()),
            is_fallback: false,
        }
    }

    /// Whether this node is the root of its tree
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

impl<T: Clone> Node<T> {
    /// Clone `parent` one level forward, flagged as a fallback.
    pub fn fallback_from(parent: &Node<T>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            payload: parent.payload.clone(),
            score: parent.score,
            depth: parent.depth + 1,
            parent_id: Some(parent.id.clone()),
            is_fallback: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_config_default() {
        let config = SearchConfig::default();
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.beam_width, 3);
        assert_eq!(config.min_beam_width, 1);
        assert!(config.cost_budget.is_none());
        assert_eq!(config.branching, 3);
    }

    #[test]
    fn test_search_config_deserialize_partial() {
        let config: SearchConfig = serde_json::from_str(r#"{"beam_width": 5}"#).unwrap();
        assert_eq!(config.beam_width, 5);
        assert_eq!(config.max_depth, 3);
    }

    #[test]
    fn test_thought_builder() {
        let thought = Thought::new("idea")
            .with_score(7.5)
            .with_confidence(1.4)
            .with_evidence("source A")
            .with_stage("expansion")
            .with_lineage_index(2);
        assert_eq!(thought.content, "idea");
        assert_eq!(thought.score, Some(7.5));
        assert_eq!(thought.confidence, Some(1.0));
        assert_eq!(thought.evidence, vec!["source A".to_string()]);
        assert_eq!(thought.metadata.stage.as_deref(), Some("expansion"));
        assert_eq!(thought.metadata.lineage_index, Some(2));
    }

    #[test]
    fn test_thought_metadata_keeps_extra_fields() {
        let json = r#"{"content": "x", "metadata": {"stage": "root", "origin": "user"}}"#;
        let thought: Thought = serde_json::from_str(json).unwrap();
        assert_eq!(thought.metadata.stage.as_deref(), Some("root"));
        assert_eq!(thought.metadata.extra["origin"], "user");
    }

    #[test]
    fn test_node_lineage() {
        let root = Node::root(Thought::new("root"), 5.0);
        assert!(root.is_root());
        assert_eq!(root.depth, 0);

        let child = Node::child_of(&root, Thought::new("child"), 8.0);
        assert_eq!(child.depth, 1);
        assert_eq!(child.parent_id.as_deref(), Some(root.id.as_str()));
        assert!(!child.is_fallback);

        let fallback = Node::fallback_from(&child);
        assert_eq!(fallback.depth, 2);
        assert_eq!(fallback.parent_id.as_deref(), Some(child.id.as_str()));
        assert_eq!(fallback.payload, child.payload);
        assert!(fallback.is_fallback);
        assert_ne!(fallback.id, child.id);
    }
}
