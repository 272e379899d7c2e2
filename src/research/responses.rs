use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::completion::{parse_completion, preview};

// ============================================================================
// Step kinds
// ============================================================================

/// Which research step produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Planning,
    Gathering,
    Analysis,
    Report,
}

impl StepKind {
    /// Step name as used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Planning => "planning",
            StepKind::Gathering => "gathering",
            StepKind::Analysis => "analysis",
            StepKind::Report => "report",
        }
    }
}

/// A typed step payload parsed from collaborator text.
pub trait StepPayload: DeserializeOwned {
    /// Step this payload belongs to.
    const STEP: StepKind;

    /// Deterministic substitute used when `raw` cannot be parsed.
    fn fallback(raw: &str) -> Self;
}

/// Parse a collaborator response, substituting a tagged fallback on failure.
pub fn parse_step<T: StepPayload>(raw: &str) -> T {
    match parse_completion::<T>(raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(
                step = T::STEP.as_str(),
                error = %e,
                completion_preview = %preview(raw, 200),
                "Failed to parse research step response, using fallback"
            );
            T::fallback(raw)
        }
    }
}

// ============================================================================
// Planning
// ============================================================================

/// Research plan: what to find out and where to start looking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningResult {
    pub objective: String,
    #[serde(default)]
    pub search_queries: Vec<String>,
    #[serde(default)]
    pub is_fallback: bool,
}

impl StepPayload for PlanningResult {
    const STEP: StepKind = StepKind::Planning;

    fn fallback(raw: &str) -> Self {
        Self {
            objective: raw.trim().to_string(),
            search_queries: Vec::new(),
            is_fallback: true,
        }
    }
}

// ============================================================================
// Gathering
// ============================================================================

/// A single piece of gathered information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Relevance to the query (0.0-1.0).
    #[serde(default = "default_relevance")]
    pub relevance: f64,
}

fn default_relevance() -> f64 {
    0.5
}

/// Findings returned by one search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatheringResult {
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub is_fallback: bool,
}

impl StepPayload for GatheringResult {
    const STEP: StepKind = StepKind::Gathering;

    /// Unparsed text becomes a single low-relevance finding.
    fn fallback(raw: &str) -> Self {
        let content = raw.trim();
        let findings = if content.is_empty() {
            Vec::new()
        } else {
            vec![Finding {
                content: content.to_string(),
                source: None,
                relevance: 0.3,
            }]
        };
        Self {
            findings,
            is_fallback: true,
        }
    }
}

// ============================================================================
// Analysis
// ============================================================================

/// Assessment of the information gathered so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    /// Stop signal: the loop ends when this is true.
    pub is_information_sufficient: bool,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub knowledge_gaps: Vec<String>,
    /// Follow-up queries for the next search.
    #[serde(default)]
    pub next_queries: Vec<String>,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub is_fallback: bool,
}

impl StepPayload for AnalysisResult {
    const STEP: StepKind = StepKind::Analysis;

    /// An unparsed analysis never claims sufficiency.
    fn fallback(raw: &str) -> Self {
        Self {
            summary: preview(raw.trim(), 500),
            is_information_sufficient: false,
            confidence: 0.0,
            knowledge_gaps: Vec::new(),
            next_queries: Vec::new(),
            insights: Vec::new(),
            is_fallback: true,
        }
    }
}

// ============================================================================
// Report
// ============================================================================

/// One report section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSection {
    pub heading: String,
    pub body: String,
}

/// Final research report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportResult {
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub sections: Vec<ReportSection>,
    #[serde(default)]
    pub is_fallback: bool,
}

impl StepPayload for ReportResult {
    const STEP: StepKind = StepKind::Report;

    fn fallback(raw: &str) -> Self {
        Self {
            title: "Research report".to_string(),
            summary: raw.trim().to_string(),
            sections: Vec::new(),
            is_fallback: true,
        }
    }
}

// ============================================================================
// Tagged union
// ============================================================================

/// Result of any research step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepResult {
    Planning(PlanningResult),
    Gathering(GatheringResult),
    Analysis(AnalysisResult),
    Report(ReportResult),
}

impl StepResult {
    /// Step that produced this result
    pub fn kind(&self) -> StepKind {
        match self {
            StepResult::Planning(_) => StepKind::Planning,
            StepResult::Gathering(_) => StepKind::Gathering,
            StepResult::Analysis(_) => StepKind::Analysis,
            StepResult::Report(_) => StepKind::Report,
        }
    }

    /// Whether the result is a parse fallback
    pub fn is_fallback(&self) -> bool {
        match self {
            StepResult::Planning(r) => r.is_fallback,
            StepResult::Gathering(r) => r.is_fallback,
            StepResult::Analysis(r) => r.is_fallback,
            StepResult::Report(r) => r.is_fallback,
        }
    }
}

impl From<PlanningResult> for StepResult {
    fn from(result: PlanningResult) -> Self {
        StepResult::Planning(result)
    }
}

impl From<GatheringResult> for StepResult {
    fn from(result: GatheringResult) -> Self {
        StepResult::Gathering(result)
    }
}

impl From<AnalysisResult> for StepResult {
    fn from(result: AnalysisResult) -> Self {
        StepResult::Analysis(result)
    }
}

impl From<ReportResult> for StepResult {
    fn from(result: ReportResult) -> Self {
        StepResult::Report(result)
    }
}
