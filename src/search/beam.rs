use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Node, SearchConfig};
use crate::error::CollaboratorResult;

#[cfg(test)]
#[path = "beam_tests.rs"]
mod beam_tests;

/// Proposes and scores follow-on nodes for a node.
///
/// Implementations may fail; the explorer isolates failures per call.
/// Returned children are re-parented onto the expanded node, so an oracle
/// does not need to get `depth` or `parent_id` right. Ids that repeat an
/// earlier node's id are replaced.
#[async_trait]
pub trait ExpansionOracle<T: Send + Sync>: Send + Sync {
    /// Expand a node into scored children.
    async fn expand(&self, node: &Node<T>) -> CollaboratorResult<Vec<Node<T>>>;
}

/// Adapter turning an async closure into an [`ExpansionOracle`].
pub struct FnOracle<F>(F);

/// Wrap `f` as an expansion oracle. The closure receives an owned copy of the node.
pub fn oracle_fn<T, F, Fut>(f: F) -> FnOracle<F>
where
    F: Fn(Node<T>) -> Fut + Send + Sync,
    Fut: Future<Output = CollaboratorResult<Vec<Node<T>>>> + Send,
{
    FnOracle(f)
}

#[async_trait]
impl<T, F, Fut> ExpansionOracle<T> for FnOracle<F>
where
    T: Clone + Send + Sync,
    F: Fn(Node<T>) -> Fut + Send + Sync,
    Fut: Future<Output = CollaboratorResult<Vec<Node<T>>>> + Send,
{
    async fn expand(&self, node: &Node<T>) -> CollaboratorResult<Vec<Node<T>>> {
        (self.0)(node.clone()).await
    }
}

/// Progress report emitted once per depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchProgress {
    pub current_depth: usize,
    pub max_depth: usize,
    pub frontier_size: usize,
    pub explored_count: usize,
}

/// Callback receiving [`SearchProgress`] updates.
pub type ProgressCallback = Arc<dyn Fn(SearchProgress) + Send + Sync>;

/// Cost of advancing one frontier node, given its depth and score.
pub type CostModel = Arc<dyn Fn(usize, f64) -> f64 + Send + Sync>;

/// Options for a beam search run.
#[derive(Clone)]
pub struct BeamSearchOptions {
    pub max_depth: usize,
    pub beam_width: usize,
    /// Stop once cumulative cost exceeds this value.
    pub cost_budget: Option<f64>,
    /// Lower bound on the beam width after failure-driven shrinking (default 1).
    pub min_beam_width: Option<usize>,
    /// Cost of each advanced node. Defaults to 1.0 per node.
    pub cost_model: Option<CostModel>,
    pub progress: Option<ProgressCallback>,
}

impl fmt::Debug for BeamSearchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeamSearchOptions")
            .field("max_depth", &self.max_depth)
            .field("beam_width", &self.beam_width)
            .field("cost_budget", &self.cost_budget)
            .field("min_beam_width", &self.min_beam_width)
            .field("cost_model", &self.cost_model.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl BeamSearchOptions {
    /// Create options with the given depth and width bounds
    pub fn new(max_depth: usize, beam_width: usize) -> Self {
        Self {
            max_depth,
            beam_width,
            cost_budget: None,
            min_beam_width: None,
            cost_model: None,
            progress: None,
        }
    }

    /// Build options from search configuration
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            cost_budget: config.cost_budget,
            min_beam_width: Some(config.min_beam_width),
            ..Self::new(config.max_depth, config.beam_width)
        }
    }

    /// Set cost budget
    pub fn with_cost_budget(mut self, budget: f64) -> Self {
        self.cost_budget = Some(budget);
        self
    }

    /// Set minimum beam width
    pub fn with_min_beam_width(mut self, width: usize) -> Self {
        self.min_beam_width = Some(width);
        self
    }

    /// Set cost model
    pub fn with_cost_model(mut self, model: impl Fn(usize, f64) -> f64 + Send + Sync + 'static) -> Self {
        self.cost_model = Some(Arc::new(model));
        self
    }

    /// Set progress callback
    pub fn with_progress(mut self, callback: impl Fn(SearchProgress) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }

    fn node_cost(&self, depth: usize, score: f64) -> f64 {
        match &self.cost_model {
            Some(model) => model(depth, score),
            None => 1.0,
        }
    }
}

/// What happened at one depth of the search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthStats {
    pub depth: usize,
    /// Frontier nodes expanded at this depth.
    pub expanded: usize,
    /// Expansions that failed.
    pub failures: usize,
    /// Candidates before truncation.
    pub candidates: usize,
    /// Beam width applied after failure shrinking.
    pub effective_width: usize,
    /// Nodes kept as the new frontier.
    pub kept: usize,
    /// Whether the kept nodes are fallback clones.
    pub used_fallback: bool,
}

/// Why the search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// `max_depth` reached.
    MaxDepth,
    /// No candidates were produced.
    EmptyFrontier,
    /// Cumulative cost exceeded the budget.
    BudgetExceeded,
    /// `max_depth` or `beam_width` was zero.
    Trivial,
}

/// Full result of a beam search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeamSearchReport<T> {
    /// Every explored node, root included, sorted by score descending.
    pub nodes: Vec<Node<T>>,
    pub depths: Vec<DepthStats>,
    pub cost_spent: f64,
    pub stop_reason: StopReason,
}

/// Run a beam search and return every explored node sorted by score.
///
/// Equal scores keep their discovery order. Oracle failures never surface
/// as errors; see [`explore`] for per-depth diagnostics.
pub async fn beam_search<T, O>(
    oracle: &O,
    root_payload: T,
    initial_score: f64,
    options: &BeamSearchOptions,
) -> Vec<Node<T>>
where
    T: Clone + Send + Sync,
    O: ExpansionOracle<T> + ?Sized,
{
    explore(oracle, root_payload, initial_score, options)
        .await
        .nodes
}

/// Beam width for a depth where `failures` of `attempted` expansions failed.
///
/// Scales `beam_width` by the success ratio (rounded down), never below
/// `min_width` and never above `beam_width`.
pub fn effective_beam_width(
    beam_width: usize,
    min_width: usize,
    attempted: usize,
    failures: usize,
) -> usize {
    if failures == 0 || attempted == 0 {
        return beam_width;
    }
    let succeeded = attempted.saturating_sub(failures);
    let scaled = beam_width * succeeded / attempted;
    scaled.max(min_width).min(beam_width)
}

/// Run a beam search and return the explored nodes with diagnostics.
pub async fn explore<T, O>(
    oracle: &O,
    root_payload: T,
    initial_score: f64,
    options: &BeamSearchOptions,
) -> BeamSearchReport<T>
where
    T: Clone + Send + Sync,
    O: ExpansionOracle<T> + ?Sized,
{
    let start = Instant::now();
    let root = Node::root(root_payload, initial_score);
    let mut explored = vec![root.clone()];
    let mut taken_ids: HashSet<String> = HashSet::from([root.id.clone()]);
    let mut depths = Vec::new();
    let mut cost_spent = 0.0;

    if options.max_depth == 0 || options.beam_width == 0 {
        debug!(
            max_depth = options.max_depth,
            beam_width = options.beam_width,
            "Beam search bounds are zero, returning root only"
        );
        return BeamSearchReport {
            nodes: explored,
            depths,
            cost_spent,
            stop_reason: StopReason::Trivial,
        };
    }

    let min_width = options
        .min_beam_width
        .unwrap_or(1)
        .min(options.beam_width);
    let mut frontier = vec![root];
    let mut stop_reason = StopReason::MaxDepth;

    for depth in 1..=options.max_depth {
        let outcomes = join_all(frontier.iter().map(|node| oracle.expand(node))).await;

        let mut pool = Vec::new();
        let mut failures = 0;
        for (parent, outcome) in frontier.iter().zip(outcomes) {
            match outcome {
                Ok(children) => {
                    pool.extend(
                        children
                            .into_iter()
                            .map(|child| adopt(parent, child, &mut taken_ids)),
                    );
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        depth,
                        node_id = %parent.id,
                        error = %e,
                        "Expansion failed, excluding node from candidate pool"
                    );
                }
            }
        }

        let used_fallback = failures == frontier.len();
        if used_fallback {
            warn!(
                depth,
                frontier = frontier.len(),
                "Every expansion failed, advancing fallback clones of the frontier"
            );
            pool = frontier.iter().map(Node::fallback_from).collect();
            taken_ids.extend(pool.iter().map(|n| n.id.clone()));
        }

        let candidates = pool.len();
        pool.sort_by(|a, b| b.score.total_cmp(&a.score));

        let width = effective_beam_width(options.beam_width, min_width, frontier.len(), failures);
        if width < options.beam_width {
            debug!(
                depth,
                failures,
                beam_width = options.beam_width,
                effective_width = width,
                "Beam narrowed after expansion failures"
            );
        }
        pool.truncate(width);

        cost_spent += pool
            .iter()
            .map(|n| options.node_cost(n.depth, n.score))
            .sum::<f64>();
        explored.extend(pool.iter().cloned());

        depths.push(DepthStats {
            depth,
            expanded: frontier.len(),
            failures,
            candidates,
            effective_width: width,
            kept: pool.len(),
            used_fallback,
        });

        frontier = pool;

        if let Some(progress) = &options.progress {
            progress(SearchProgress {
                current_depth: depth,
                max_depth: options.max_depth,
                frontier_size: frontier.len(),
                explored_count: explored.len(),
            });
        }

        debug!(
            depth,
            frontier = frontier.len(),
            explored = explored.len(),
            cost_spent,
            "Beam search depth complete"
        );

        if frontier.is_empty() {
            stop_reason = StopReason::EmptyFrontier;
            break;
        }
        if let Some(budget) = options.cost_budget {
            if cost_spent > budget && depth < options.max_depth {
                info!(depth, cost_spent, budget, "Cost budget exceeded, stopping search");
                stop_reason = StopReason::BudgetExceeded;
                break;
            }
        }
    }

    explored.sort_by(|a, b| b.score.total_cmp(&a.score));

    info!(
        explored = explored.len(),
        depths = depths.len(),
        stop_reason = ?stop_reason,
        latency_ms = start.elapsed().as_millis(),
        "Beam search completed"
    );

    BeamSearchReport {
        nodes: explored,
        depths,
        cost_spent,
        stop_reason,
    }
}

/// Re-parent an oracle-produced child onto the node it was expanded from.
///
/// A blank id, or one already used by the search, is replaced with a fresh one.
fn adopt<T>(parent: &Node<T>, mut child: Node<T>, taken_ids: &mut HashSet<String>) -> Node<T> {
    if child.depth != parent.depth + 1 || child.parent_id.as_deref() != Some(parent.id.as_str()) {
        debug!(
            parent_id = %parent.id,
            child_id = %child.id,
            "Correcting child lineage returned by oracle"
        );
    }
    if child.id.trim().is_empty() || taken_ids.contains(&child.id) {
        let fresh = Uuid::new_v4().to_string();
        debug!(
            parent_id = %parent.id,
            child_id = %child.id,
            fresh_id = %fresh,
            "Oracle child id already in use, assigning a fresh one"
        );
        child.id = fresh;
    }
    taken_ids.insert(child.id.clone());
    child.depth = parent.depth + 1;
    child.parent_id = Some(parent.id.clone());
    child
}
