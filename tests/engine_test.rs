//! End-to-end tests through the public API
//!
//! Exercises beam search, graph aggregation and the research loop with
//! in-process collaborators.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use thought_explorer::error::{CollaboratorError, CollaboratorResult};
use thought_explorer::graph::{
    GraphAggregationEngine, GraphConfig, NodeConnection, PersistentState, ProposedConnection,
    ProposedSynthesis, RelationProposal, RelationProposer, ThoughtGraphNode,
};
use thought_explorer::research::{
    AccumulatedState, IterativeResearchLoop, ResearchCollaborator, ResearchConfig, ResearchPhase,
};
use thought_explorer::retry::RetryPolicy;
use thought_explorer::search::{
    beam_search, explore, oracle_fn, BeamSearchOptions, Node, StopReason, Thought,
};
use thought_explorer::AppError;

#[cfg(test)]
mod beam_search_tests {
    use super::*;

    #[tokio::test]
    async fn test_each_depth_keeps_best_candidates() {
        let oracle = oracle_fn(|node: Node<Thought>| async move {
            let children = (0..3)
                .map(|i| {
                    let score = node.score - 1.0 + i as f64;
                    Node::child_of(
                        &node,
                        Thought::new(format!("{}.{}", node.payload.content, i)),
                        score,
                    )
                })
                .collect();
            Ok(children)
        });

        let nodes = beam_search(&oracle, Thought::new("r"), 5.0, &BeamSearchOptions::new(2, 2)).await;

        // root + 2 kept at depth 1 + 2 kept at depth 2
        assert_eq!(nodes.len(), 5);
        assert_eq!(nodes[0].payload.content, "r.2.2");
        assert_eq!(nodes[0].score, 7.0);
        assert!(nodes.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_budget_stops_early() {
        let oracle = oracle_fn(|node: Node<Thought>| async move {
            Ok(vec![Node::child_of(&node, Thought::new("next"), node.score)])
        });
        let options = BeamSearchOptions::new(5, 1).with_cost_budget(1.5);

        let report = explore(&oracle, Thought::new("r"), 5.0, &options).await;

        assert_eq!(report.stop_reason, StopReason::BudgetExceeded);
        assert_eq!(report.depths.len(), 2);
    }

    #[tokio::test]
    async fn test_total_failure_advances_fallbacks() {
        let oracle = oracle_fn(|_node: Node<Thought>| async move {
            Err(CollaboratorError::failed("expand", "boom"))
        });

        let report = explore(&oracle, Thought::new("r"), 5.0, &BeamSearchOptions::new(2, 3)).await;

        assert_eq!(report.nodes.len(), 3);
        assert!(report.depths.iter().all(|d| d.used_fallback));
        assert!(report.nodes.iter().all(|n| n.payload.content == "r"));
    }
}

/// Proposer that connects every node to the first and merges the first two.
struct HubProposer {
    calls: AtomicU32,
}

#[async_trait]
impl RelationProposer for HubProposer {
    async fn propose(
        &self,
        nodes: &[ThoughtGraphNode],
        _query: &str,
        _prior: &[NodeConnection],
    ) -> CollaboratorResult<RelationProposal> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let hub = &nodes[0].id;
        Ok(RelationProposal {
            connections: nodes[1..]
                .iter()
                .map(|n| ProposedConnection::new(hub, &n.id, 0.6).with_reasoning("hub"))
                .collect(),
            synthesized_thoughts: vec![ProposedSynthesis::new(
                vec![nodes[0].id.clone(), nodes[1].id.clone()],
                "merged",
                0.7,
            )],
        })
    }
}

#[cfg(test)]
mod aggregation_tests {
    use super::*;

    #[tokio::test]
    async fn test_cycles_carry_state() {
        let proposer = Arc::new(HubProposer {
            calls: AtomicU32::new(0),
        });
        let engine = GraphAggregationEngine::new(proposer.clone(), GraphConfig::default());
        let thoughts = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let first = engine
            .run_cycle(&thoughts, "q", Vec::new(), 0, PersistentState::default())
            .await;
        assert_eq!(first.cycle_count, 1);
        assert_eq!(first.connections.len(), 2);
        assert_eq!(first.synthesized_thoughts.len(), 1);
        assert_eq!(first.network_state.connection_count, 2);

        let second = engine
            .run_cycle(
                &thoughts,
                "q",
                first.connections.clone(),
                first.cycle_count,
                first.persistent_state.clone(),
            )
            .await;

        assert_eq!(second.cycle_count, 2);
        assert_eq!(second.connections.len(), 2);
        for before in &first.connections {
            let after = second
                .connections
                .iter()
                .find(|c| c.id == before.id)
                .expect("connection carried over");
            assert!(after.strength >= before.strength);
            assert_eq!(after.activation_count, 2);
        }
        assert_eq!(proposer.calls.load(Ordering::SeqCst), 2);
    }
}

/// Collaborator replaying fixed answers; analysis turns sufficient on the given call.
struct ScriptedResearcher {
    sufficient_on: u32,
    analyses: AtomicU32,
    searched: Mutex<Vec<String>>,
}

#[async_trait]
impl ResearchCollaborator for ScriptedResearcher {
    async fn plan(&self, _query: &str) -> CollaboratorResult<String> {
        Ok(r#"{"objective": "o", "search_queries": ["one", "two"]}"#.to_string())
    }

    async fn search(&self, query: &str, _state: &AccumulatedState) -> CollaboratorResult<String> {
        self.searched.lock().unwrap().push(query.to_string());
        Ok(format!(r#"{{"findings": [{{"content": "about {}"}}]}}"#, query))
    }

    async fn analyze(&self, _query: &str, _state: &AccumulatedState) -> CollaboratorResult<String> {
        let n = self.analyses.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!(
            r#"{{"summary": "pass {}", "is_information_sufficient": {}}}"#,
            n,
            n >= self.sufficient_on
        ))
    }

    async fn generate_report(
        &self,
        _query: &str,
        state: &AccumulatedState,
    ) -> CollaboratorResult<String> {
        Ok(format!("Plain text report over {} findings", state.findings.len()))
    }
}

#[cfg(test)]
mod research_tests {
    use super::*;

    fn researcher(sufficient_on: u32) -> Arc<ScriptedResearcher> {
        Arc::new(ScriptedResearcher {
            sufficient_on,
            analyses: AtomicU32::new(0),
            searched: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_run_stops_when_sufficient() {
        let collaborator = researcher(2);
        let research = IterativeResearchLoop::new(
            collaborator.clone(),
            ResearchConfig::default(),
            RetryPolicy::none(),
        );

        let outcome = research.run("topic").await.unwrap();

        assert_eq!(outcome.iterations.len(), 2);
        assert!(!outcome.forced_stop);
        assert_eq!(*collaborator.searched.lock().unwrap(), vec!["one", "two"]);
        let report = outcome.report.unwrap();
        assert!(report.is_fallback);
        assert!(report.summary.contains("2 findings"));
    }

    #[tokio::test]
    async fn test_run_forced_stop_at_ceiling() {
        let research = IterativeResearchLoop::new(
            researcher(u32::MAX),
            ResearchConfig {
                max_iterations: 2,
                generate_report: false,
            },
            RetryPolicy::none(),
        );

        let outcome = research.run("topic").await.unwrap();

        assert_eq!(outcome.iterations.len(), 2);
        assert!(outcome.forced_stop);
        assert!(outcome.report.is_none());
        assert_eq!(outcome.state.search_history, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_step_by_step_advance() {
        let research = IterativeResearchLoop::new(
            researcher(1),
            ResearchConfig::default(),
            RetryPolicy::none(),
        );
        let mut run = research.start("topic");

        assert_eq!(research.advance(&mut run).await, ResearchPhase::Searching);
        assert_eq!(research.advance(&mut run).await, ResearchPhase::Analyzing);
        assert_eq!(research.advance(&mut run).await, ResearchPhase::Reporting);
        assert_eq!(research.advance(&mut run).await, ResearchPhase::Done);
        assert_eq!(research.advance(&mut run).await, ResearchPhase::Done);
    }

    struct BrokenPlanner;

    #[async_trait]
    impl ResearchCollaborator for BrokenPlanner {
        async fn plan(&self, _query: &str) -> CollaboratorResult<String> {
            Err(CollaboratorError::rejected("plan", "forbidden"))
        }
        async fn search(&self, _q: &str, _s: &AccumulatedState) -> CollaboratorResult<String> {
            unreachable!()
        }
        async fn analyze(&self, _q: &str, _s: &AccumulatedState) -> CollaboratorResult<String> {
            unreachable!()
        }
        async fn generate_report(
            &self,
            _q: &str,
            _s: &AccumulatedState,
        ) -> CollaboratorResult<String> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_hard_failure_surfaces() {
        let research = IterativeResearchLoop::new(
            Arc::new(BrokenPlanner),
            ResearchConfig::default(),
            RetryPolicy::default(),
        );

        let result = research.run("topic").await;

        assert!(matches!(
            result,
            Err(AppError::Collaborator(CollaboratorError::Rejected { .. }))
        ));
    }
}
