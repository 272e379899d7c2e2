//! Unit tests for the research loop state machine.

use super::*;
use pretty_assertions::assert_eq;

const PLAN: &str = r#"{"objective": "understand the topic", "search_queries": ["first", "second"]}"#;
const FINDINGS: &str = r#"{"findings": [{"content": "a fact", "source": "web", "relevance": 0.8}]}"#;
const INSUFFICIENT: &str =
    r#"{"summary": "not yet", "is_information_sufficient": false, "confidence": 0.3}"#;
const SUFFICIENT: &str =
    r#"{"summary": "enough", "is_information_sufficient": true, "confidence": 0.9}"#;
const REPORT: &str = r#"{"title": "Findings", "summary": "all done", "sections": [{"heading": "A", "body": "B"}]}"#;

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        initial_delay_ms: 1,
        backoff_factor: 2.0,
        max_delay_ms: 2,
        attempt_timeout_ms: None,
    }
}

fn research_loop(mock: MockResearchCollaborator, max_iterations: u32, generate_report: bool) -> IterativeResearchLoop {
    IterativeResearchLoop::new(
        Arc::new(mock),
        ResearchConfig {
            max_iterations,
            generate_report,
        },
        fast_retry(),
    )
}

/// Collaborator whose analysis never reports sufficiency.
fn always_insufficient() -> MockResearchCollaborator {
    let mut mock = MockResearchCollaborator::new();
    mock.expect_plan().returning(|_| Ok(PLAN.to_string()));
    mock.expect_search().returning(|_, _| Ok(FINDINGS.to_string()));
    mock.expect_analyze().returning(|_, _| Ok(INSUFFICIENT.to_string()));
    mock.expect_generate_report().returning(|_, _| Ok(REPORT.to_string()));
    mock
}

// ============================================================================
// Stop conditions
// ============================================================================

#[tokio::test]
async fn test_max_iterations_forces_done() {
    let mut mock = MockResearchCollaborator::new();
    mock.expect_plan().times(1).returning(|_| Ok(PLAN.to_string()));
    mock.expect_search().times(3).returning(|_, _| Ok(FINDINGS.to_string()));
    mock.expect_analyze().times(3).returning(|_, _| Ok(INSUFFICIENT.to_string()));
    mock.expect_generate_report().times(1).returning(|_, _| Ok(REPORT.to_string()));

    let research = research_loop(mock, 3, true);
    let mut run = research.start("topic");
    while !run.phase.is_terminal() {
        research.advance(&mut run).await;
    }

    assert_eq!(run.phase, ResearchPhase::Done);
    assert_eq!(run.iterations.len(), 3);
    assert!(run.forced_stop);
    assert!(run.iterations.iter().all(|i| !i.is_information_sufficient));
    assert_eq!(
        run.iterations.iter().map(|i| i.iteration).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(run.iterations.iter().all(|i| i.max_iterations == 3));
    assert_eq!(run.state.findings.len(), 3);
    assert_eq!(run.report.as_ref().map(|r| r.title.as_str()), Some("Findings"));
}

#[tokio::test]
async fn test_sufficient_analysis_stops_early() {
    let mut mock = MockResearchCollaborator::new();
    mock.expect_plan().returning(|_| Ok(PLAN.to_string()));
    mock.expect_search().times(2).returning(|_, _| Ok(FINDINGS.to_string()));
    mock.expect_analyze()
        .times(2)
        .returning(|_, state| {
            if state.analyses.is_empty() {
                Ok(INSUFFICIENT.to_string())
            } else {
                Ok(SUFFICIENT.to_string())
            }
        });
    mock.expect_generate_report().never();

    let outcome = research_loop(mock, 5, false).run("topic").await.unwrap();

    assert_eq!(outcome.iterations.len(), 2);
    assert!(outcome.iterations[1].is_information_sufficient);
    assert!(!outcome.forced_stop);
    assert!(outcome.report.is_none());
}

#[tokio::test]
async fn test_zero_max_iterations_runs_once() {
    let outcome = research_loop(always_insufficient(), 0, false)
        .run("topic")
        .await
        .unwrap();
    assert_eq!(outcome.iterations.len(), 1);
    assert!(outcome.forced_stop);
}

// ============================================================================
// Query selection
// ============================================================================

#[tokio::test]
async fn test_search_queries_follow_plan_then_analysis() {
    let mut mock = MockResearchCollaborator::new();
    mock.expect_plan().returning(|_| Ok(PLAN.to_string()));
    mock.expect_search().returning(|_, _| Ok(FINDINGS.to_string()));
    mock.expect_analyze().returning(|_, state| {
        if state.analyses.is_empty() {
            Ok(r#"{"summary": "gap", "is_information_sufficient": false, "next_queries": ["follow-up"]}"#.to_string())
        } else {
            Ok(INSUFFICIENT.to_string())
        }
    });

    let outcome = research_loop(mock, 4, false).run("topic").await.unwrap();

    assert_eq!(
        outcome.state.search_history,
        vec!["first", "follow-up", "second", "topic"]
    );
}

// ============================================================================
// Failures and retries
// ============================================================================

#[tokio::test]
async fn test_non_retryable_error_fails_run() {
    let mut mock = MockResearchCollaborator::new();
    mock.expect_plan().returning(|_| Ok(PLAN.to_string()));
    mock.expect_search()
        .times(1)
        .returning(|_, _| Err(CollaboratorError::rejected("search", "invalid api key")));
    mock.expect_analyze().never();

    let research = research_loop(mock, 3, true);
    let mut run = research.start("topic");
    while !run.phase.is_terminal() {
        research.advance(&mut run).await;
    }

    assert_eq!(run.phase, ResearchPhase::Failed);
    assert!(matches!(run.failure, Some(CollaboratorError::Rejected { .. })));
    assert_eq!(research.advance(&mut run).await, ResearchPhase::Failed);
}

#[tokio::test]
async fn test_run_returns_error_on_failure() {
    let mut mock = MockResearchCollaborator::new();
    mock.expect_plan()
        .returning(|_| Err(CollaboratorError::rejected("plan", "bad request")));

    let err = research_loop(mock, 3, true).run("topic").await.unwrap_err();
    assert!(matches!(err, AppError::Collaborator(CollaboratorError::Rejected { .. })));
}

#[tokio::test]
async fn test_transient_error_is_retried() {
    let mut mock = MockResearchCollaborator::new();
    mock.expect_plan().returning(|_| Ok(PLAN.to_string()));
    let mut calls = 0;
    mock.expect_search().times(2).returning(move |_, _| {
        calls += 1;
        if calls == 1 {
            Err(CollaboratorError::failed("search", "HTTP 503: service overloaded"))
        } else {
            Ok(FINDINGS.to_string())
        }
    });
    mock.expect_analyze().returning(|_, _| Ok(SUFFICIENT.to_string()));

    let outcome = research_loop(mock, 3, false).run("topic").await.unwrap();
    assert_eq!(outcome.iterations.len(), 1);
    assert_eq!(outcome.state.findings.len(), 1);
}

#[tokio::test]
async fn test_exhausted_retries_fail_run() {
    let mut mock = MockResearchCollaborator::new();
    mock.expect_plan()
        .times(3)
        .returning(|_| Err(CollaboratorError::failed("plan", "rate limit exceeded")));

    let err = research_loop(mock, 3, true).run("topic").await.unwrap_err();
    match err {
        AppError::Collaborator(CollaboratorError::RetriesExhausted { attempts, .. }) => {
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

// ============================================================================
// Parse fallbacks
// ============================================================================

#[tokio::test]
async fn test_unparseable_responses_degrade_to_fallbacks() {
    let mut mock = MockResearchCollaborator::new();
    mock.expect_plan().returning(|_| Ok("Start broad, then narrow.".to_string()));
    mock.expect_search().returning(|_, _| Ok("Some prose about the topic.".to_string()));
    mock.expect_analyze().returning(|_, _| Ok("Looks promising.".to_string()));
    mock.expect_generate_report().returning(|_, _| Ok("Final words.".to_string()));

    let research = research_loop(mock, 2, true);
    let mut run = research.start("topic");
    while !run.phase.is_terminal() {
        research.advance(&mut run).await;
    }

    assert_eq!(run.phase, ResearchPhase::Done);
    assert_eq!(run.iterations.len(), 2);
    assert!(run.steps.iter().all(|s| s.is_fallback()));
    // plan + 2 searches + 2 analyses + report
    assert_eq!(run.state.fallback_count, 6);
    assert_eq!(run.state.search_history, vec!["topic", "topic"]);
    assert_eq!(run.state.findings[0].content, "Some prose about the topic.");
    assert!(run.report.map(|r| r.is_fallback).unwrap_or(false));
}

#[tokio::test]
async fn test_iteration_snapshots_accumulate() {
    let outcome = research_loop(always_insufficient(), 3, true)
        .run("topic")
        .await
        .unwrap();

    let sizes: Vec<usize> = outcome
        .iterations
        .iter()
        .map(|i| i.accumulated_state.analyses.len())
        .collect();
    assert_eq!(sizes, vec![1, 2, 3]);
    assert_eq!(outcome.state.fallback_count, 0);
}
