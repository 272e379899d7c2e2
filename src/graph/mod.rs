//! Thought graph: data model, reinforcement and pruning rules, and the
//! multi-cycle aggregation engine.
//!
//! - [`types`]: nodes, connections, synthesized thoughts and network metrics
//! - [`rules`]: Hebbian reinforcement, decay-based pruning, activity and
//!   network-state computation
//! - [`GraphAggregationEngine`]: folds relation proposals into the graph once
//!   per cycle, threading opaque state between cycles

mod aggregation;
pub mod rules;
pub mod types;

pub use aggregation::*;
pub use rules::*;
pub use types::*;

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Configuration for graph reinforcement and pruning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Hebbian learning rate
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Strength below which inactive connections are pruned
    #[serde(default = "default_pruning_threshold")]
    pub pruning_threshold: f64,
    /// Inactivity window for pruning, in seconds
    #[serde(default = "default_inactivity_window_secs")]
    pub inactivity_window_secs: i64,
    /// Decay factor for node activity
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f64,
    /// Score given to freshly created nodes (0.0-10.0)
    #[serde(default = "default_node_score")]
    pub default_node_score: f64,
}

fn default_learning_rate() -> f64 {
    DEFAULT_LEARNING_RATE
}

fn default_pruning_threshold() -> f64 {
    DEFAULT_PRUNING_THRESHOLD
}

fn default_inactivity_window_secs() -> i64 {
    DEFAULT_INACTIVITY_WINDOW_SECS
}

fn default_decay_factor() -> f64 {
    DEFAULT_DECAY_FACTOR
}

fn default_node_score() -> f64 {
    5.0
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            pruning_threshold: default_pruning_threshold(),
            inactivity_window_secs: default_inactivity_window_secs(),
            decay_factor: default_decay_factor(),
            default_node_score: default_node_score(),
        }
    }
}

impl GraphConfig {
    /// Inactivity window as a duration
    pub fn inactivity_window(&self) -> Duration {
        Duration::seconds(self.inactivity_window_secs)
    }
}
