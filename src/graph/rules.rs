//! Reinforcement, pruning and metric rules for the thought graph.
//!
//! All functions are pure: they take the current records and return new
//! ones. Variants suffixed `_at` take an explicit clock reading.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use super::types::{clamp_strength, NetworkState, NodeConnection, ThoughtGraphNode, MAX_NODE_SCORE};

/// Default Hebbian learning rate.
pub const DEFAULT_LEARNING_RATE: f64 = 0.1;
/// Connections weaker than this are pruning candidates.
pub const DEFAULT_PRUNING_THRESHOLD: f64 = 0.2;
/// Inactivity after which weak connections are pruned (7 days).
pub const DEFAULT_INACTIVITY_WINDOW_SECS: i64 = 7 * 24 * 60 * 60;
/// Default activity decay factor.
pub const DEFAULT_DECAY_FACTOR: f64 = 0.9;

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Reinforce a connection by the product of its endpoints' activities.
///
/// `strength' = min(1, strength + learning_rate * source * target)`; the
/// activation time is refreshed and `activation_count` goes up by one.
/// Activities are clamped to 0.0-1.0, so strength never decreases.
pub fn update_connection_strength_hebbian(
    connection: &NodeConnection,
    source_activity: f64,
    target_activity: f64,
    learning_rate: f64,
) -> NodeConnection {
    update_connection_strength_hebbian_at(
        connection,
        source_activity,
        target_activity,
        learning_rate,
        Utc::now(),
    )
}

/// [`update_connection_strength_hebbian`] with an explicit clock.
pub fn update_connection_strength_hebbian_at(
    connection: &NodeConnection,
    source_activity: f64,
    target_activity: f64,
    learning_rate: f64,
    now: DateTime<Utc>,
) -> NodeConnection {
    let rate = if learning_rate.is_finite() {
        learning_rate.max(0.0)
    } else {
        0.0
    };
    let delta = rate * unit(source_activity) * unit(target_activity);
    let current = clamp_strength(connection.strength);

    NodeConnection {
        strength: (current + delta).min(1.0),
        last_activated: now,
        activation_count: connection.activation_count.saturating_add(1),
        ..connection.clone()
    }
}

/// Drop connections that are both weak and inactive.
///
/// A connection goes iff `strength < threshold` and it was last activated
/// more than `inactivity_window` ago. Idempotent for a fixed clock.
pub fn prune_connections(
    connections: &[NodeConnection],
    pruning_threshold: f64,
    inactivity_window: Duration,
) -> Vec<NodeConnection> {
    prune_connections_at(connections, pruning_threshold, inactivity_window, Utc::now())
}

/// [`prune_connections`] with an explicit clock.
pub fn prune_connections_at(
    connections: &[NodeConnection],
    pruning_threshold: f64,
    inactivity_window: Duration,
    now: DateTime<Utc>,
) -> Vec<NodeConnection> {
    connections
        .iter()
        .filter(|c| {
            let weak = c.strength < pruning_threshold;
            let stale = now - c.last_activated > inactivity_window;
            !(weak && stale)
        })
        .cloned()
        .collect()
}

/// Scalar activity of a node given its neighbourhood.
///
/// Isolated nodes report their normalized score (`score / 10`) unchanged.
/// Connected nodes blend that base with the mean incident strength and the
/// mean strength-weighted neighbour score, then apply `decay_factor`.
pub fn calculate_node_activity(
    node: &ThoughtGraphNode,
    connections: &[NodeConnection],
    all_nodes: &[ThoughtGraphNode],
    decay_factor: f64,
) -> f64 {
    let base = node.score / MAX_NODE_SCORE;
    let incident: Vec<&NodeConnection> = connections.iter().filter(|c| c.touches(&node.id)).collect();
    if incident.is_empty() {
        return base;
    }

    let scores: HashMap<&str, f64> = all_nodes.iter().map(|n| (n.id.as_str(), n.score)).collect();
    let count = incident.len() as f64;

    let avg_strength = incident.iter().map(|c| c.strength).sum::<f64>() / count;
    let avg_neighbor = incident
        .iter()
        .map(|c| {
            let neighbor_score = c
                .other_end(&node.id)
                .and_then(|id| scores.get(id))
                .copied()
                .unwrap_or(0.0);
            (neighbor_score / MAX_NODE_SCORE) * c.strength
        })
        .sum::<f64>()
        / count;

    decay_factor * (0.4 * base + 0.3 * avg_strength + 0.3 * avg_neighbor)
}

/// Aggregate metrics for a node/connection set. Empty input yields zeros.
pub fn calculate_network_state(
    nodes: &[ThoughtGraphNode],
    connections: &[NodeConnection],
) -> NetworkState {
    let node_count = nodes.len();
    let connection_count = connections.len();

    let average_strength = if connection_count > 0 {
        connections.iter().map(|c| c.strength).sum::<f64>() / connection_count as f64
    } else {
        0.0
    };
    let average_score = if node_count > 0 {
        nodes.iter().map(|n| n.score).sum::<f64>() / node_count as f64
    } else {
        0.0
    };
    let connection_density = if node_count > 1 {
        let possible = (node_count * (node_count - 1)) as f64 / 2.0;
        connection_count as f64 / possible
    } else {
        0.0
    };

    NetworkState {
        node_count,
        connection_count,
        average_strength,
        average_score,
        connection_density,
        timestamp: Utc::now(),
    }
}
