use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::rules::{
    calculate_network_state, calculate_node_activity, prune_connections_at,
    update_connection_strength_hebbian_at,
};
use super::types::{
    clamp_strength, endpoint_key, NetworkState, NodeConnection, ProposedConnection,
    ProposedSynthesis, RelationProposal, SynthesizedThought, ThoughtGraphNode,
};
use super::GraphConfig;
use crate::error::CollaboratorResult;

#[cfg(test)]
#[path = "aggregation_tests.rs"]
mod aggregation_tests;

/// Proposes connections and syntheses over a batch of graph nodes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelationProposer: Send + Sync {
    /// Propose relations for `nodes` given the query and the prior connections.
    async fn propose(
        &self,
        nodes: &[ThoughtGraphNode],
        query: &str,
        prior_connections: &[NodeConnection],
    ) -> CollaboratorResult<RelationProposal>;
}

/// State carried between cycles. Opaque to callers: thread it back unchanged.
///
/// Grows with every distinct thought and accepted synthesis a session sees.
/// Callers that run long sessions should start a fresh session to reset it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistentState {
    /// Every node seen so far, synthesized nodes included.
    #[serde(default)]
    pub known_nodes: Vec<ThoughtGraphNode>,
    /// Every accepted synthesis so far.
    #[serde(default)]
    pub synthesized_thoughts: Vec<SynthesizedThought>,
}

impl PersistentState {
    /// Known nodes keyed by content. The earliest node wins on duplicate content.
    fn content_index(&self) -> HashMap<&str, &ThoughtGraphNode> {
        let mut index = HashMap::with_capacity(self.known_nodes.len());
        for node in &self.known_nodes {
            index.entry(node.content.as_str()).or_insert(node);
        }
        index
    }

    fn remember(&mut self, nodes: &[ThoughtGraphNode]) {
        let mut positions: HashMap<String, usize> = self
            .known_nodes
            .iter()
            .enumerate()
            .map(|(i, k)| (k.id.clone(), i))
            .collect();
        for node in nodes {
            match positions.get(&node.id) {
                Some(&i) => self.known_nodes[i] = node.clone(),
                None => {
                    positions.insert(node.id.clone(), self.known_nodes.len());
                    self.known_nodes.push(node.clone());
                }
            }
        }
    }
}

/// Outcome of one aggregation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationResult {
    /// Input nodes followed by nodes materialized from syntheses.
    pub nodes: Vec<ThoughtGraphNode>,
    pub connections: Vec<NodeConnection>,
    /// Syntheses accepted during this cycle.
    pub synthesized_thoughts: Vec<SynthesizedThought>,
    pub network_state: NetworkState,
    /// Cycle counter to pass into the next cycle.
    pub cycle_count: u64,
    /// State to pass into the next cycle.
    pub persistent_state: PersistentState,
    /// Set when the relation proposer failed and prior state was returned.
    pub degraded: bool,
}

/// Folds relation proposals into a thought graph, one cycle per call.
///
/// The engine is stateless: prior connections, the cycle counter and the
/// persistent state come in as arguments and go out in the result.
#[derive(Clone)]
pub struct GraphAggregationEngine {
    proposer: Arc<dyn RelationProposer>,
    config: GraphConfig,
}

impl GraphAggregationEngine {
    /// Create an engine over a relation proposer
    pub fn new(proposer: Arc<dyn RelationProposer>, config: GraphConfig) -> Self {
        Self { proposer, config }
    }

    /// Engine configuration
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Run one aggregation cycle.
    ///
    /// Fewer than two distinct thoughts produce an empty graph and still
    /// advance the cycle counter. A proposer failure returns the prior
    /// connections and state untouched with `degraded` set, so the caller
    /// can retry the cycle from the same baseline.
    pub async fn run_cycle(
        &self,
        thoughts: &[String],
        query: &str,
        prior_connections: Vec<NodeConnection>,
        cycle_count: u64,
        prior_state: PersistentState,
    ) -> AggregationResult {
        let start = Instant::now();
        let now = Utc::now();
        let nodes = self.build_nodes(thoughts, &prior_state, now);

        debug!(
            cycle = cycle_count,
            thoughts = thoughts.len(),
            nodes = nodes.len(),
            prior_connections = prior_connections.len(),
            "Starting aggregation cycle"
        );

        if nodes.len() < 2 {
            debug!(nodes = nodes.len(), "Too few nodes to connect, skipping proposer");
            let network_state = calculate_network_state(&nodes, &[]);
            let mut persistent_state = prior_state;
            persistent_state.remember(&nodes);
            return AggregationResult {
                nodes,
                connections: Vec::new(),
                synthesized_thoughts: Vec::new(),
                network_state,
                cycle_count: cycle_count + 1,
                persistent_state,
                degraded: false,
            };
        }

        let proposal = match self.proposer.propose(&nodes, query, &prior_connections).await {
            Ok(proposal) => proposal,
            Err(e) => {
                warn!(
                    cycle = cycle_count,
                    error = %e,
                    prior_connections = prior_connections.len(),
                    "Relation proposer failed, returning prior graph state"
                );
                let network_state = calculate_network_state(&nodes, &prior_connections);
                return AggregationResult {
                    nodes,
                    connections: prior_connections,
                    synthesized_thoughts: Vec::new(),
                    network_state,
                    cycle_count,
                    persistent_state: prior_state,
                    degraded: true,
                };
            }
        };

        let snapshot = snapshot_nodes(&prior_state.known_nodes, &nodes);
        let activities: HashMap<&str, f64> = snapshot
            .iter()
            .map(|n| {
                let activity =
                    calculate_node_activity(n, &prior_connections, &snapshot, self.config.decay_factor);
                (n.id.as_str(), activity)
            })
            .collect();
        let valid_ids: HashSet<&str> = snapshot.iter().map(|n| n.id.as_str()).collect();

        let merged = self.merge_connections(
            &prior_connections,
            proposal.connections,
            &activities,
            &valid_ids,
            now,
        );
        let synthesized = normalize_syntheses(proposal.synthesized_thoughts, &valid_ids, now);

        let connections = prune_connections_at(
            &merged,
            self.config.pruning_threshold,
            self.config.inactivity_window(),
            now,
        );
        log_connection_changes(&prior_connections, &connections);

        let synth_nodes: Vec<ThoughtGraphNode> = synthesized
            .iter()
            .map(ThoughtGraphNode::from_synthesis)
            .collect();
        let mut result_nodes = nodes;
        result_nodes.extend(synth_nodes);

        let network_state = calculate_network_state(&result_nodes, &connections);

        let mut persistent_state = prior_state;
        persistent_state.remember(&result_nodes);
        persistent_state
            .synthesized_thoughts
            .extend(synthesized.iter().cloned());

        info!(
            cycle = cycle_count + 1,
            nodes = network_state.node_count,
            connections = network_state.connection_count,
            synthesized = synthesized.len(),
            density = network_state.connection_density,
            latency_ms = start.elapsed().as_millis(),
            "Aggregation cycle completed"
        );

        AggregationResult {
            nodes: result_nodes,
            connections,
            synthesized_thoughts: synthesized,
            network_state,
            cycle_count: cycle_count + 1,
            persistent_state,
            degraded: false,
        }
    }

    /// One node per distinct non-blank thought, reusing known nodes by content.
    fn build_nodes(
        &self,
        thoughts: &[String],
        state: &PersistentState,
        now: DateTime<Utc>,
    ) -> Vec<ThoughtGraphNode> {
        let known = state.content_index();
        let mut seen = HashSet::new();
        thoughts
            .iter()
            .filter(|t| !t.trim().is_empty())
            .filter(|&t| seen.insert(t.as_str()))
            .map(|content| match known.get(content.as_str()) {
                Some(&node) => node.clone(),
                None => ThoughtGraphNode::new(content.clone())
                    .with_score(self.config.default_node_score)
                    .with_metadata("stage", "initial")
                    .with_created_at(now),
            })
            .collect()
    }

    fn merge_connections(
        &self,
        prior: &[NodeConnection],
        proposed: Vec<ProposedConnection>,
        activities: &HashMap<&str, f64>,
        valid_ids: &HashSet<&str>,
        now: DateTime<Utc>,
    ) -> Vec<NodeConnection> {
        let mut merged = prior.to_vec();
        let mut index: HashMap<(String, String), usize> = merged
            .iter()
            .enumerate()
            .map(|(i, c)| (c.endpoint_key(), i))
            .collect();
        let mut taken_ids: HashSet<String> = merged.iter().map(|c| c.id.clone()).collect();
        let mut touched = HashSet::new();

        for p in proposed {
            if p.source_node_id == p.target_node_id {
                debug!(node_id = %p.source_node_id, "Dropping self-loop proposal");
                continue;
            }
            if !valid_ids.contains(p.source_node_id.as_str())
                || !valid_ids.contains(p.target_node_id.as_str())
            {
                warn!(
                    source = %p.source_node_id,
                    target = %p.target_node_id,
                    "Dropping connection proposal with unknown endpoint"
                );
                continue;
            }

            let key = endpoint_key(&p.source_node_id, &p.target_node_id);
            if !touched.insert(key.clone()) {
                continue;
            }

            match index.get(&key) {
                Some(&i) => {
                    let existing = &merged[i];
                    let source = activity_of(activities, &existing.source_node_id);
                    let target = activity_of(activities, &existing.target_node_id);
                    let mut reinforced = update_connection_strength_hebbian_at(
                        existing,
                        source,
                        target,
                        self.config.learning_rate,
                        now,
                    );
                    if p.reasoning.is_some() {
                        reinforced.reasoning = p.reasoning;
                    }
                    merged[i] = reinforced;
                }
                None => {
                    let id = unique_connection_id(p.id, &mut taken_ids);
                    index.insert(key, merged.len());
                    merged.push(NodeConnection {
                        id,
                        source_node_id: p.source_node_id,
                        target_node_id: p.target_node_id,
                        strength: clamp_strength(p.strength),
                        reasoning: p.reasoning,
                        created_at: now,
                        last_activated: now,
                        activation_count: 1,
                    });
                }
            }
        }

        merged
    }
}

/// Keep a proposed id only when it is non-blank and unused; otherwise mint one.
fn unique_connection_id(proposed: Option<String>, taken: &mut HashSet<String>) -> String {
    let id = match proposed {
        Some(id) if !id.trim().is_empty() && !taken.contains(&id) => id,
        Some(id) => {
            debug!(proposed_id = %id, "Proposed connection id collides, assigning a fresh one");
            Uuid::new_v4().to_string()
        }
        None => Uuid::new_v4().to_string(),
    };
    taken.insert(id.clone());
    id
}

fn activity_of(activities: &HashMap<&str, f64>, id: &str) -> f64 {
    activities.get(id).copied().unwrap_or(0.0)
}

/// Known nodes with the current batch overriding entries by id.
fn snapshot_nodes(known: &[ThoughtGraphNode], current: &[ThoughtGraphNode]) -> Vec<ThoughtGraphNode> {
    let current_ids: HashSet<&str> = current.iter().map(|n| n.id.as_str()).collect();
    known
        .iter()
        .filter(|n| !current_ids.contains(n.id.as_str()))
        .chain(current.iter())
        .cloned()
        .collect()
}

fn normalize_syntheses(
    proposed: Vec<ProposedSynthesis>,
    valid_ids: &HashSet<&str>,
    now: DateTime<Utc>,
) -> Vec<SynthesizedThought> {
    proposed
        .into_iter()
        .filter_map(|p| {
            let mut seen = HashSet::new();
            let sources: Vec<String> = p
                .source_node_ids
                .into_iter()
                .filter(|id| valid_ids.contains(id.as_str()))
                .filter(|id| seen.insert(id.clone()))
                .collect();

            if sources.len() < 2 || p.content.trim().is_empty() {
                warn!(
                    sources = sources.len(),
                    "Dropping synthesis without two known sources or content"
                );
                return None;
            }

            Some(SynthesizedThought {
                id: Uuid::new_v4().to_string(),
                source_node_ids: sources,
                content: p.content,
                confidence: clamp_strength(p.confidence),
                created_at: now,
            })
        })
        .collect()
}

fn log_connection_changes(before: &[NodeConnection], after: &[NodeConnection]) {
    let prior: HashMap<&str, &NodeConnection> = before.iter().map(|c| (c.id.as_str(), c)).collect();

    for conn in after {
        if let Some(old) = prior.get(conn.id.as_str()) {
            if conn.activation_count > old.activation_count {
                info!(
                    connection_id = %conn.id,
                    source = %conn.source_node_id,
                    target = %conn.target_node_id,
                    activation_count = conn.activation_count,
                    strength_delta = conn.strength - old.strength,
                    "Connection reinforced"
                );
            }
        }
    }

    let remaining: HashSet<&str> = after.iter().map(|c| c.id.as_str()).collect();
    for conn in before.iter().filter(|c| !remaining.contains(c.id.as_str())) {
        info!(
            connection_id = %conn.id,
            strength = conn.strength,
            last_activated = %conn.last_activated,
            "Connection pruned"
        );
    }
}
