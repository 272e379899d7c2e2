use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use super::responses::{
    parse_step, AnalysisResult, Finding, GatheringResult, PlanningResult, ReportResult, StepKind,
    StepResult,
};
use super::ResearchConfig;
use crate::error::{AppError, AppResult, CollaboratorError, CollaboratorResult};
use crate::retry::{with_retry, RetryPolicy};

#[cfg(test)]
#[path = "runner_tests.rs"]
mod runner_tests;

/// External collaborators driving each research step.
///
/// Each call returns raw text expected to parse into the matching step
/// result; unparseable text is tolerated.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResearchCollaborator: Send + Sync {
    /// Draft a research plan for `query`.
    async fn plan(&self, query: &str) -> CollaboratorResult<String>;

    /// Gather information for one search query.
    async fn search(
        &self,
        query: &str,
        state: &AccumulatedState,
    ) -> CollaboratorResult<String>;

    /// Judge whether the accumulated information answers `query`.
    async fn analyze(
        &self,
        query: &str,
        state: &AccumulatedState,
    ) -> CollaboratorResult<String>;

    /// Write the final report.
    async fn generate_report(
        &self,
        query: &str,
        state: &AccumulatedState,
    ) -> CollaboratorResult<String>;
}

/// Loop phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchPhase {
    Planning,
    Searching,
    Analyzing,
    Reporting,
    Done,
    Failed,
}

impl ResearchPhase {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResearchPhase::Done | ResearchPhase::Failed)
    }
}

/// Everything learned so far in a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccumulatedState {
    pub query: String,
    pub plan: Option<PlanningResult>,
    pub findings: Vec<Finding>,
    pub analyses: Vec<AnalysisResult>,
    /// Search queries already issued, in order.
    pub search_history: Vec<String>,
    /// Step results that were parse fallbacks.
    pub fallback_count: u32,
}

impl AccumulatedState {
    fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            ..Self::default()
        }
    }

    /// Next search query: an unsearched follow-up from the latest analysis,
    /// then an unsearched planned query, then the original query.
    pub fn next_search_query(&self) -> String {
        let searched = |q: &&String| !self.search_history.contains(*q);
        self.analyses
            .last()
            .and_then(|a| a.next_queries.iter().find(searched))
            .or_else(|| {
                self.plan
                    .as_ref()
                    .and_then(|p| p.search_queries.iter().find(searched))
            })
            .cloned()
            .unwrap_or_else(|| self.query.clone())
    }

    fn record(&mut self, step: StepKind, is_fallback: bool) {
        if is_fallback {
            self.fallback_count += 1;
            debug!(step = step.as_str(), "Recorded fallback step result");
        }
    }
}

/// Per-iteration outcome, produced after each analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationResult {
    /// 1-based iteration number.
    pub iteration: u32,
    pub max_iterations: u32,
    /// Verdict of this iteration's analysis.
    pub is_information_sufficient: bool,
    pub accumulated_state: AccumulatedState,
}

/// In-flight state of one research run, advanced with [`IterativeResearchLoop::advance`].
#[derive(Debug, Clone)]
pub struct ResearchRun {
    pub phase: ResearchPhase,
    pub state: AccumulatedState,
    pub iterations: Vec<IterationResult>,
    /// Every parsed step result, in order.
    pub steps: Vec<StepResult>,
    pub report: Option<ReportResult>,
    pub failure: Option<CollaboratorError>,
    /// Set when the iteration ceiling ended the loop.
    pub forced_stop: bool,
}

/// Final outcome of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchOutcome {
    pub query: String,
    pub iterations: Vec<IterationResult>,
    pub report: Option<ReportResult>,
    pub state: AccumulatedState,
    pub forced_stop: bool,
}

/// Plan, then search and analyze until sufficient or out of iterations.
pub struct IterativeResearchLoop {
    collaborator: Arc<dyn ResearchCollaborator>,
    config: ResearchConfig,
    retry: RetryPolicy,
}

impl IterativeResearchLoop {
    /// Create a loop over a collaborator
    pub fn new(
        collaborator: Arc<dyn ResearchCollaborator>,
        config: ResearchConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            collaborator,
            config,
            retry,
        }
    }

    /// Begin a run in the planning phase
    pub fn start(&self, query: &str) -> ResearchRun {
        ResearchRun {
            phase: ResearchPhase::Planning,
            state: AccumulatedState::new(query),
            iterations: Vec::new(),
            steps: Vec::new(),
            report: None,
            failure: None,
            forced_stop: false,
        }
    }

    /// Perform one step and return the new phase.
    ///
    /// Terminal runs are left untouched. A hard collaborator failure moves
    /// the run to [`ResearchPhase::Failed`] and records the error.
    pub async fn advance(&self, run: &mut ResearchRun) -> ResearchPhase {
        let result = match run.phase {
            ResearchPhase::Planning => self.plan(run).await,
            ResearchPhase::Searching => self.search(run).await,
            ResearchPhase::Analyzing => self.analyze(run).await,
            ResearchPhase::Reporting => self.report(run).await,
            ResearchPhase::Done | ResearchPhase::Failed => return run.phase,
        };

        if let Err(e) = result {
            error!(
                phase = ?run.phase,
                operation = %e.operation(),
                error = %e,
                "Research step failed"
            );
            run.failure = Some(e);
            run.phase = ResearchPhase::Failed;
        }
        run.phase
    }

    /// Drive a run to completion.
    ///
    /// Returns the collaborator error if the run failed.
    pub async fn run(&self, query: &str) -> AppResult<ResearchOutcome> {
        let start = Instant::now();
        let mut run = self.start(query);

        info!(query = %query, max_iterations = self.max_iterations(), "Starting research");

        while !run.phase.is_terminal() {
            self.advance(&mut run).await;
        }

        if let Some(failure) = run.failure {
            return Err(AppError::Collaborator(failure));
        }

        info!(
            iterations = run.iterations.len(),
            findings = run.state.findings.len(),
            fallbacks = run.state.fallback_count,
            forced_stop = run.forced_stop,
            latency_ms = start.elapsed().as_millis(),
            "Research completed"
        );

        Ok(ResearchOutcome {
            query: query.to_string(),
            iterations: run.iterations,
            report: run.report,
            state: run.state,
            forced_stop: run.forced_stop,
        })
    }

    fn max_iterations(&self) -> u32 {
        self.config.effective_max_iterations()
    }

    async fn plan(&self, run: &mut ResearchRun) -> CollaboratorResult<()> {
        let query = run.state.query.clone();
        let raw = with_retry(&self.retry, "plan", || self.collaborator.plan(&query)).await?;

        let plan: PlanningResult = parse_step(&raw);
        run.state.record(StepKind::Planning, plan.is_fallback);
        debug!(queries = plan.search_queries.len(), "Research plan ready");

        run.steps.push(plan.clone().into());
        run.state.plan = Some(plan);
        run.phase = ResearchPhase::Searching;
        Ok(())
    }

    async fn search(&self, run: &mut ResearchRun) -> CollaboratorResult<()> {
        let search_query = run.state.next_search_query();
        let state = &run.state;
        let raw = with_retry(&self.retry, "search", || {
            self.collaborator.search(&search_query, state)
        })
        .await?;

        let gathered: GatheringResult = parse_step(&raw);
        run.state.record(StepKind::Gathering, gathered.is_fallback);
        debug!(
            search_query = %search_query,
            findings = gathered.findings.len(),
            "Search complete"
        );

        run.state.search_history.push(search_query);
        run.state.findings.extend(gathered.findings.iter().cloned());
        run.steps.push(gathered.into());
        run.phase = ResearchPhase::Analyzing;
        Ok(())
    }

    async fn analyze(&self, run: &mut ResearchRun) -> CollaboratorResult<()> {
        let query = run.state.query.clone();
        let state = &run.state;
        let raw = with_retry(&self.retry, "analyze", || {
            self.collaborator.analyze(&query, state)
        })
        .await?;

        let analysis: AnalysisResult = parse_step(&raw);
        run.state.record(StepKind::Analysis, analysis.is_fallback);
        let sufficient = analysis.is_information_sufficient;

        run.steps.push(analysis.clone().into());
        run.state.analyses.push(analysis);

        let iteration = run.iterations.len() as u32 + 1;
        let max_iterations = self.max_iterations();
        run.iterations.push(IterationResult {
            iteration,
            max_iterations,
            is_information_sufficient: sufficient,
            accumulated_state: run.state.clone(),
        });

        let stop = sufficient || iteration >= max_iterations;
        run.forced_stop = !sufficient && iteration >= max_iterations;

        info!(
            iteration,
            max_iterations,
            sufficient,
            forced_stop = run.forced_stop,
            "Research iteration complete"
        );

        run.phase = match (stop, self.config.generate_report) {
            (false, _) => ResearchPhase::Searching,
            (true, true) => ResearchPhase::Reporting,
            (true, false) => ResearchPhase::Done,
        };
        Ok(())
    }

    async fn report(&self, run: &mut ResearchRun) -> CollaboratorResult<()> {
        let query = run.state.query.clone();
        let state = &run.state;
        let raw = with_retry(&self.retry, "generate_report", || {
            self.collaborator.generate_report(&query, state)
        })
        .await?;

        let report: ReportResult = parse_step(&raw);
        run.state.record(StepKind::Report, report.is_fallback);

        run.steps.push(report.clone().into());
        run.report = Some(report);
        run.phase = ResearchPhase::Done;
        Ok(())
    }
}
