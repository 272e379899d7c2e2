//! Collaborators backed by Langbase pipes.
//!
//! Each type implements one of the engine's collaborator traits by sending a
//! system prompt plus a JSON-bearing user message to a pipe and parsing the
//! completion.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Instant;
use tracing::{debug, warn};

use super::client::LangbaseClient;
use super::types::PipeRequest;
use crate::completion::{parse_completion, preview};
use crate::config::PipeConfig;
use crate::error::{CollaboratorError, CollaboratorResult};
use crate::graph::{NodeConnection, RelationProposal, RelationProposer, ThoughtGraphNode};
use crate::prompts::{
    ANALYZE_PROMPT, EXPAND_PROMPT, PLAN_PROMPT, RELATE_PROMPT, REPORT_PROMPT, SEARCH_PROMPT,
};
use crate::research::{AccumulatedState, ResearchCollaborator};
use crate::search::{ExpansionOracle, Node, Thought};

/// Run a pipe and return its completion text.
async fn run_pipe(
    client: &LangbaseClient,
    pipe: &str,
    system_prompt: &str,
    user_message: String,
) -> CollaboratorResult<String> {
    let start = Instant::now();
    let request = PipeRequest::prompted(pipe, system_prompt, user_message);
    let response = client.call_pipe(request).await?;
    debug!(
        pipe = %pipe,
        latency_ms = start.elapsed().as_millis(),
        completion_len = response.completion.len(),
        "Pipe completion received"
    );
    Ok(response.completion)
}

// ============================================================================
// Expansion
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
struct ContinuationResponse {
    continuations: Vec<ContinuationItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct ContinuationItem {
    thought: String,
    #[serde(default = "default_continuation_confidence")]
    confidence: f64,
    #[serde(default)]
    rationale: Option<String>,
}

fn default_continuation_confidence() -> f64 {
    0.5
}

impl ContinuationResponse {
    fn from_completion(completion: &str) -> (Self, bool) {
        match parse_completion::<ContinuationResponse>(completion) {
            Ok(parsed) => (parsed, false),
            Err(e) => {
                warn!(
                    error = %e,
                    completion_preview = %preview(completion, 200),
                    "Failed to parse expansion response, using fallback"
                );
                let fallback = Self {
                    continuations: vec![ContinuationItem {
                        thought: completion.trim().to_string(),
                        confidence: default_continuation_confidence(),
                        rationale: None,
                    }],
                };
                (fallback, true)
            }
        }
    }
}

/// [`ExpansionOracle`] that asks a pipe for follow-on thoughts.
///
/// Children are scored `confidence * 10` and tagged with stage "expansion".
#[derive(Clone)]
pub struct PipeExpansionOracle {
    client: LangbaseClient,
    pipe: String,
    branching: usize,
    problem: Option<String>,
}

impl PipeExpansionOracle {
    /// Create an oracle requesting `branching` children per expansion
    pub fn new(client: LangbaseClient, pipe: impl Into<String>, branching: usize) -> Self {
        Self {
            client,
            pipe: pipe.into(),
            branching: branching.max(1),
            problem: None,
        }
    }

    /// Attach the overall problem statement to every request
    pub fn with_problem(mut self, problem: impl Into<String>) -> Self {
        self.problem = Some(problem.into());
        self
    }

    fn build_message(&self, node: &Node<Thought>) -> String {
        let mut msg = format!(
            "Generate {} diverse continuations from this thought:\n\n\"{}\"",
            self.branching, node.payload.content
        );
        if let Some(problem) = &self.problem {
            msg.push_str(&format!("\n\nProblem context: {}", problem));
        }
        msg.push_str(&format!("\n\nCurrent depth: {}", node.depth));
        msg
    }
}

#[async_trait]
impl ExpansionOracle<Thought> for PipeExpansionOracle {
    async fn expand(&self, node: &Node<Thought>) -> CollaboratorResult<Vec<Node<Thought>>> {
        let completion = run_pipe(&self.client, &self.pipe, EXPAND_PROMPT, self.build_message(node))
            .await?;
        let (response, is_fallback) = ContinuationResponse::from_completion(&completion);

        let children = response
            .continuations
            .into_iter()
            .filter(|c| !c.thought.trim().is_empty())
            .take(self.branching)
            .enumerate()
            .map(|(i, c)| {
                let confidence = if c.confidence.is_finite() {
                    c.confidence.clamp(0.0, 1.0)
                } else {
                    default_continuation_confidence()
                };
                let score = confidence * 10.0;
                let mut thought = Thought::new(c.thought)
                    .with_score(score)
                    .with_confidence(confidence)
                    .with_stage("expansion")
                    .with_lineage_index(i);
                if let Some(rationale) = c.rationale {
                    thought = thought.with_evidence(rationale);
                }
                if is_fallback {
                    thought
                        .metadata
                        .extra
                        .insert("is_fallback".to_string(), json!(true));
                }
                Node::child_of(node, thought, score)
            })
            .collect();

        Ok(children)
    }
}

// ============================================================================
// Relations
// ============================================================================

#[derive(Serialize)]
struct RelateNode<'a> {
    id: &'a str,
    content: &'a str,
    score: f64,
}

#[derive(Serialize)]
struct RelateConnection<'a> {
    source_node_id: &'a str,
    target_node_id: &'a str,
    strength: f64,
}

/// [`RelationProposer`] backed by a pipe.
///
/// An unparseable completion is reported as [`CollaboratorError::Malformed`],
/// which makes the aggregation cycle degrade to the prior state.
#[derive(Clone)]
pub struct PipeRelationProposer {
    client: LangbaseClient,
    pipe: String,
}

impl PipeRelationProposer {
    /// Create a proposer over the given pipe
    pub fn new(client: LangbaseClient, pipe: impl Into<String>) -> Self {
        Self {
            client,
            pipe: pipe.into(),
        }
    }
}

fn relate_message(
    nodes: &[ThoughtGraphNode],
    query: &str,
    prior_connections: &[NodeConnection],
) -> String {
    let payload = json!({
        "query": query,
        "nodes": nodes
            .iter()
            .map(|n| RelateNode { id: &n.id, content: &n.content, score: n.score })
            .collect::<Vec<_>>(),
        "prior_connections": prior_connections
            .iter()
            .map(|c| RelateConnection {
                source_node_id: &c.source_node_id,
                target_node_id: &c.target_node_id,
                strength: c.strength,
            })
            .collect::<Vec<_>>(),
    });
    format!("Find relations and syntheses among these thoughts:\n\n{}", payload)
}

#[async_trait]
impl RelationProposer for PipeRelationProposer {
    async fn propose(
        &self,
        nodes: &[ThoughtGraphNode],
        query: &str,
        prior_connections: &[NodeConnection],
    ) -> CollaboratorResult<RelationProposal> {
        let completion = run_pipe(
            &self.client,
            &self.pipe,
            RELATE_PROMPT,
            relate_message(nodes, query, prior_connections),
        )
        .await?;

        parse_completion::<RelationProposal>(&completion).map_err(|e| {
            warn!(
                error = %e,
                completion_preview = %preview(&completion, 200),
                "Failed to parse relation proposal"
            );
            CollaboratorError::malformed("relate", e)
        })
    }
}

// ============================================================================
// Research
// ============================================================================

/// [`ResearchCollaborator`] that maps each step onto its own pipe.
#[derive(Clone)]
pub struct PipeResearcher {
    client: LangbaseClient,
    pipes: PipeConfig,
}

impl PipeResearcher {
    /// Create a researcher using the configured pipe names
    pub fn new(client: LangbaseClient, pipes: PipeConfig) -> Self {
        Self { client, pipes }
    }
}

fn state_context(state: &AccumulatedState) -> String {
    let findings: Vec<&str> = state.findings.iter().map(|f| f.content.as_str()).collect();
    let latest = state.analyses.last().map(|a| a.summary.as_str());
    json!({
        "research_question": state.query,
        "objective": state.plan.as_ref().map(|p| p.objective.as_str()),
        "findings": findings,
        "latest_analysis": latest,
        "searched": state.search_history,
    })
    .to_string()
}

#[async_trait]
impl ResearchCollaborator for PipeResearcher {
    async fn plan(&self, query: &str) -> CollaboratorResult<String> {
        run_pipe(
            &self.client,
            &self.pipes.plan,
            PLAN_PROMPT,
            format!("Research question: {}", query),
        )
        .await
    }

    async fn search(&self, query: &str, state: &AccumulatedState) -> CollaboratorResult<String> {
        run_pipe(
            &self.client,
            &self.pipes.search,
            SEARCH_PROMPT,
            format!("Search query: {}\n\nKnown so far:\n{}", query, state_context(state)),
        )
        .await
    }

    async fn analyze(&self, query: &str, state: &AccumulatedState) -> CollaboratorResult<String> {
        run_pipe(
            &self.client,
            &self.pipes.analyze,
            ANALYZE_PROMPT,
            format!("Research question: {}\n\nState:\n{}", query, state_context(state)),
        )
        .await
    }

    async fn generate_report(
        &self,
        query: &str,
        state: &AccumulatedState,
    ) -> CollaboratorResult<String> {
        run_pipe(
            &self.client,
            &self.pipes.report,
            REPORT_PROMPT,
            format!("Research question: {}\n\nState:\n{}", query, state_context(state)),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LangbaseConfig, RequestConfig};

    fn client() -> LangbaseClient {
        let config = LangbaseConfig {
            api_key: "k".to_string(),
            base_url: "http://localhost:1".to_string(),
        };
        LangbaseClient::new(&config, RequestConfig::default()).unwrap()
    }

    #[test]
    fn test_continuation_parse() {
        let (response, fallback) = ContinuationResponse::from_completion(
            r#"{"continuations": [{"thought": "a", "confidence": 0.9}, {"thought": "b"}]}"#,
        );
        assert!(!fallback);
        assert_eq!(response.continuations.len(), 2);
        assert_eq!(response.continuations[1].confidence, 0.5);
    }

    #[test]
    fn test_continuation_fallback_uses_raw_text() {
        let (response, fallback) = ContinuationResponse::from_completion("  just keep going  ");
        assert!(fallback);
        assert_eq!(response.continuations.len(), 1);
        assert_eq!(response.continuations[0].thought, "just keep going");
    }

    #[test]
    fn test_expand_message_mentions_branching_and_problem() {
        let oracle = PipeExpansionOracle::new(client(), "expand", 4).with_problem("why is the sky blue");
        let node = Node::root(Thought::new("light scatters"), 0.0);
        let msg = oracle.build_message(&node);
        assert!(msg.contains("Generate 4 diverse"));
        assert!(msg.contains("\"light scatters\""));
        assert!(msg.contains("Problem context: why is the sky blue"));
        assert!(msg.contains("Current depth: 0"));
    }

    #[test]
    fn test_branching_is_at_least_one() {
        let oracle = PipeExpansionOracle::new(client(), "expand", 0);
        assert_eq!(oracle.branching, 1);
    }

    #[test]
    fn test_relate_message_lists_ids() {
        let mut node = ThoughtGraphNode::new("alpha");
        node.id = "n-1".to_string();
        let conn = NodeConnection::new("n-1", "n-2", 0.4);
        let msg = relate_message(&[node], "query text", &[conn]);
        assert!(msg.contains("\"id\":\"n-1\""));
        assert!(msg.contains("\"query\":\"query text\""));
        assert!(msg.contains("\"target_node_id\":\"n-2\""));
    }

    #[test]
    fn test_state_context_includes_findings() {
        let mut state = AccumulatedState {
            query: "q".to_string(),
            ..AccumulatedState::default()
        };
        state.search_history.push("first".to_string());
        let ctx = state_context(&state);
        assert!(ctx.contains("\"research_question\":\"q\""));
        assert!(ctx.contains("\"searched\":[\"first\"]"));
    }
}
