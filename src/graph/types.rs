use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Upper bound of the node score scale.
pub const MAX_NODE_SCORE: f64 = 10.0;

/// A thought placed in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThoughtGraphNode {
    pub id: String,
    pub content: String,
    /// Quality score (0.0-10.0).
    pub score: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl ThoughtGraphNode {
    /// Create a node with a fresh id and a zero score
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            score: 0.0,
            metadata: Map::new(),
            created_at: Utc::now(),
        }
    }

    /// Set score (clamped to 0.0-10.0)
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score.clamp(0.0, MAX_NODE_SCORE);
        self
    }

    /// Set a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the creation timestamp
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Node materializing a synthesized thought.
    ///
    /// Scored `confidence * 10`; metadata links back to the source nodes.
    pub fn from_synthesis(thought: &SynthesizedThought) -> Self {
        Self {
            id: thought.id.clone(),
            content: thought.content.clone(),
            score: (thought.confidence * MAX_NODE_SCORE).clamp(0.0, MAX_NODE_SCORE),
            metadata: Map::new(),
            created_at: thought.created_at,
        }
        .with_metadata("stage", "synthesized")
        .with_metadata("source_node_ids", json!(thought.source_node_ids))
    }

    /// Stage tag from metadata, if any
    pub fn stage(&self) -> Option<&str> {
        self.metadata.get("stage").and_then(Value::as_str)
    }
}

/// A weighted, reinforceable association between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConnection {
    pub id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    /// Association strength (0.0-1.0).
    pub strength: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activated: DateTime<Utc>,
    /// Reinforcement events seen, starting at 1.
    pub activation_count: u32,
}

impl NodeConnection {
    /// Create a connection with activation count 1, stamped now
    pub fn new(
        source_node_id: impl Into<String>,
        target_node_id: impl Into<String>,
        strength: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            source_node_id: source_node_id.into(),
            target_node_id: target_node_id.into(),
            strength: clamp_strength(strength),
            reasoning: None,
            created_at: now,
            last_activated: now,
            activation_count: 1,
        }
    }

    /// Set reasoning
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// Set the last activation time
    pub fn with_last_activated(mut self, at: DateTime<Utc>) -> Self {
        self.last_activated = at;
        self
    }

    /// Whether the connection touches `node_id`
    pub fn touches(&self, node_id: &str) -> bool {
        self.source_node_id == node_id || self.target_node_id == node_id
    }

    /// The endpoint opposite `node_id`, if the connection touches it
    pub fn other_end(&self, node_id: &str) -> Option<&str> {
        if self.source_node_id == node_id {
            Some(&self.target_node_id)
        } else if self.target_node_id == node_id {
            Some(&self.source_node_id)
        } else {
            None
        }
    }

    /// Direction-independent endpoint key
    pub fn endpoint_key(&self) -> (String, String) {
        endpoint_key(&self.source_node_id, &self.target_node_id)
    }
}

/// Direction-independent key for a pair of node ids.
pub fn endpoint_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Clamp a strength into 0.0-1.0, mapping non-finite values to 0.0.
pub fn clamp_strength(strength: f64) -> f64 {
    if strength.is_finite() {
        strength.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// A thought produced by merging two or more existing thoughts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedThought {
    pub id: String,
    /// Ordered, de-duplicated source node ids (at least two).
    pub source_node_ids: Vec<String>,
    pub content: String,
    /// Confidence (0.0-1.0).
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

/// Aggregate metrics over a set of nodes and connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkState {
    pub node_count: usize,
    pub connection_count: usize,
    pub average_strength: f64,
    pub average_score: f64,
    pub connection_density: f64,
    pub timestamp: DateTime<Utc>,
}

/// A connection as proposed by a relation proposer, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedConnection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source_node_id: String,
    pub target_node_id: String,
    #[serde(default = "default_proposed_strength")]
    pub strength: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

fn default_proposed_strength() -> f64 {
    0.5
}

impl ProposedConnection {
    /// Propose a connection between two nodes
    pub fn new(source: impl Into<String>, target: impl Into<String>, strength: f64) -> Self {
        Self {
            id: None,
            source_node_id: source.into(),
            target_node_id: target.into(),
            strength,
            reasoning: None,
        }
    }

    /// Set reasoning
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

/// A merge of existing nodes as proposed by a relation proposer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedSynthesis {
    pub source_node_ids: Vec<String>,
    pub content: String,
    #[serde(default = "default_proposed_confidence")]
    pub confidence: f64,
}

fn default_proposed_confidence() -> f64 {
    0.7
}

impl ProposedSynthesis {
    /// Propose a synthesis of the given nodes
    pub fn new(source_node_ids: Vec<String>, content: impl Into<String>, confidence: f64) -> Self {
        Self {
            source_node_ids,
            content: content.into(),
            confidence,
        }
    }
}

/// Everything a relation proposer suggests for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationProposal {
    #[serde(default)]
    pub connections: Vec<ProposedConnection>,
    #[serde(default)]
    pub synthesized_thoughts: Vec<ProposedSynthesis>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_score_is_clamped() {
        assert_eq!(ThoughtGraphNode::new("a").with_score(12.0).score, 10.0);
        assert_eq!(ThoughtGraphNode::new("a").with_score(-1.0).score, 0.0);
    }

    #[test]
    fn test_node_from_synthesis() {
        let synth = SynthesizedThought {
            id: "syn-1".to_string(),
            source_node_ids: vec!["a".to_string(), "b".to_string()],
            content: "merged".to_string(),
            confidence: 0.85,
            created_at: Utc::now(),
        };
        let node = ThoughtGraphNode::from_synthesis(&synth);
        assert_eq!(node.id, "syn-1");
        assert!((node.score - 8.5).abs() < 1e-9);
        assert_eq!(node.stage(), Some("synthesized"));
        assert_eq!(node.metadata["source_node_ids"], json!(["a", "b"]));
    }

    #[test]
    fn test_connection_defaults() {
        let conn = NodeConnection::new("a", "b", 1.7);
        assert_eq!(conn.strength, 1.0);
        assert_eq!(conn.activation_count, 1);
        assert_eq!(conn.created_at, conn.last_activated);
        assert!(conn.touches("a"));
        assert_eq!(conn.other_end("b"), Some("a"));
        assert_eq!(conn.other_end("c"), None);
    }

    #[test]
    fn test_endpoint_key_is_direction_independent() {
        assert_eq!(endpoint_key("x", "a"), endpoint_key("a", "x"));
        let conn = NodeConnection::new("z", "m", 0.3);
        assert_eq!(conn.endpoint_key(), ("m".to_string(), "z".to_string()));
    }

    #[test]
    fn test_clamp_strength_non_finite() {
        assert_eq!(clamp_strength(f64::NAN), 0.0);
        assert_eq!(clamp_strength(f64::INFINITY), 0.0);
        assert_eq!(clamp_strength(0.4), 0.4);
    }

    #[test]
    fn test_relation_proposal_deserialize_defaults() {
        let json = r#"{
            "connections": [{"source_node_id": "a", "target_node_id": "b"}],
            "synthesized_thoughts": [{"source_node_ids": ["a", "b"], "content": "ab"}]
        }"#;
        let proposal: RelationProposal = serde_json::from_str(json).unwrap();
        assert_eq!(proposal.connections[0].strength, 0.5);
        assert!(proposal.connections[0].id.is_none());
        assert!((proposal.synthesized_thoughts[0].confidence - 0.7).abs() < f64::EPSILON);

        let empty: RelationProposal = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, RelationProposal::default());
    }
}
