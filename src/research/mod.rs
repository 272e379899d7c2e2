//! Iterative research loop.
//!
//! A small state machine that plans, then alternates search and analysis
//! until the analysis reports the gathered information sufficient or the
//! iteration ceiling is reached, and optionally writes a report. Every
//! collaborator call is retried under a [`RetryPolicy`](crate::retry::RetryPolicy);
//! unparseable responses degrade to fallback-tagged step results.

mod responses;
mod runner;

pub use responses::*;
pub use runner::*;

use serde::{Deserialize, Serialize};

/// Configuration for the research loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Hard ceiling on search/analysis iterations (at least 1)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Whether to generate a report once the loop stops
    #[serde(default = "default_generate_report")]
    pub generate_report: bool,
}

fn default_max_iterations() -> u32 {
    3
}

fn default_generate_report() -> bool {
    true
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            generate_report: default_generate_report(),
        }
    }
}

impl ResearchConfig {
    /// Iteration ceiling, never below 1
    pub fn effective_max_iterations(&self) -> u32 {
        self.max_iterations.max(1)
    }
}
