//! Command-line interface for driving the engine against Langbase pipes.

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, RequestConfig};
use crate::error::{AppResult, ValidationError};
use crate::graph::GraphAggregationEngine;
use crate::langbase::{LangbaseClient, PipeExpansionOracle, PipeRelationProposer, PipeResearcher};
use crate::research::{IterativeResearchLoop, ResearchConfig};
use crate::retry::RetryPolicy;
use crate::search::{explore, BeamSearchOptions, Thought};
use crate::storage::{SqliteStorage, Storage, StoredAggregation};

/// Score assigned to the root thought of an exploration.
const ROOT_SCORE: f64 = 5.0;

/// Exploratory reasoning engine.
#[derive(Parser, Debug)]
#[command(name = "thought-explorer", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Beam-search follow-on thoughts from a prompt
    Explore {
        /// Starting thought
        prompt: String,

        /// Override the configured search depth
        #[arg(long)]
        max_depth: Option<usize>,

        /// Override the configured beam width
        #[arg(long)]
        beam_width: Option<usize>,

        /// Stop once this much cost has been spent
        #[arg(long)]
        cost_budget: Option<f64>,
    },

    /// Run one aggregation cycle for a session, loading and saving its state
    Aggregate {
        /// Session identifier
        #[arg(long)]
        session: String,

        /// Query the thoughts relate to
        #[arg(long)]
        query: String,

        /// Thoughts to aggregate
        #[arg(required = true)]
        thoughts: Vec<String>,
    },

    /// Run the iterative research loop
    Research {
        /// Research question
        query: String,

        /// Override the configured iteration ceiling
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Skip the final report
        #[arg(long)]
        no_report: bool,
    },

    /// List stored aggregation sessions
    Sessions,

    /// Delete a stored aggregation session
    Forget {
        /// Session identifier
        session: String,
    },
}

/// Execute a command and return its JSON output.
pub async fn execute_command(command: Commands, config: &Config) -> AppResult<Value> {
    validate(&command)?;
    match command {
        Commands::Explore {
            prompt,
            max_depth,
            beam_width,
            cost_budget,
        } => execute_explore(config, prompt, max_depth, beam_width, cost_budget).await,
        Commands::Aggregate {
            session,
            query,
            thoughts,
        } => execute_aggregate(config, session, query, thoughts).await,
        Commands::Research {
            query,
            max_iterations,
            no_report,
        } => execute_research(config, query, max_iterations, no_report).await,
        Commands::Sessions => {
            let storage = SqliteStorage::new(&config.database).await?;
            Ok(serde_json::to_value(storage.list_aggregations().await?)?)
        }
        Commands::Forget { session } => {
            let storage = SqliteStorage::new(&config.database).await?;
            storage.delete_aggregation(&session).await?;
            info!(session_id = %session, "Aggregation session deleted");
            Ok(json!({ "deleted": session }))
        }
    }
}

fn validate(command: &Commands) -> Result<(), ValidationError> {
    let (field, value) = match command {
        Commands::Explore { prompt, .. } => ("prompt", prompt),
        Commands::Aggregate { session, .. } => ("session", session),
        Commands::Research { query, .. } => ("query", query),
        Commands::Forget { session } => ("session", session),
        Commands::Sessions => return Ok(()),
    };
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "cannot be empty"));
    }
    Ok(())
}

fn langbase_client(config: &Config, request: RequestConfig) -> AppResult<LangbaseClient> {
    config.langbase.require_api_key()?;
    Ok(LangbaseClient::new(&config.langbase, request)?)
}

async fn execute_explore(
    config: &Config,
    prompt: String,
    max_depth: Option<usize>,
    beam_width: Option<usize>,
    cost_budget: Option<f64>,
) -> AppResult<Value> {
    let client = langbase_client(config, config.request.clone())?;
    let oracle = PipeExpansionOracle::new(client, &config.pipes.expand, config.search.branching)
        .with_problem(&prompt);

    let mut options = BeamSearchOptions::from_config(&config.search);
    if let Some(depth) = max_depth {
        options.max_depth = depth;
    }
    if let Some(width) = beam_width {
        options.beam_width = width;
    }
    if cost_budget.is_some() {
        options.cost_budget = cost_budget;
    }

    let root = Thought::new(prompt).with_stage("root");
    let report = explore(&oracle, root, ROOT_SCORE, &options).await;
    Ok(serde_json::to_value(report)?)
}

async fn execute_aggregate(
    config: &Config,
    session: String,
    query: String,
    thoughts: Vec<String>,
) -> AppResult<Value> {
    let client = langbase_client(config, config.request.clone())?;
    let storage = SqliteStorage::new(&config.database).await?;

    let mut stored = storage
        .load_aggregation(&session)
        .await?
        .unwrap_or_else(|| StoredAggregation::new(&session, &query));
    stored.query = query;

    let engine = GraphAggregationEngine::new(
        Arc::new(PipeRelationProposer::new(client, &config.pipes.relate)),
        config.graph.clone(),
    );
    let result = engine
        .run_cycle(
            &thoughts,
            &stored.query,
            stored.connections.clone(),
            stored.cycle_count,
            stored.persistent_state.clone(),
        )
        .await;

    stored.apply(&result);
    storage.save_aggregation(&stored).await?;
    info!(
        session_id = %stored.session_id,
        cycle_count = stored.cycle_count,
        degraded = result.degraded,
        "Aggregation session updated"
    );

    Ok(serde_json::to_value(result)?)
}

async fn execute_research(
    config: &Config,
    query: String,
    max_iterations: Option<u32>,
    no_report: bool,
) -> AppResult<Value> {
    // The loop owns retries for research calls.
    let request = RequestConfig {
        max_retries: 0,
        ..config.request.clone()
    };
    let client = langbase_client(config, request)?;
    let researcher = PipeResearcher::new(client, config.pipes.clone());

    let research_config = ResearchConfig {
        max_iterations: max_iterations.unwrap_or(config.research.max_iterations),
        generate_report: config.research.generate_report && !no_report,
    };
    let retry = RetryPolicy::from_request_config(&config.request);

    let research = IterativeResearchLoop::new(Arc::new(researcher), research_config, retry);
    let outcome = research.run(&query).await?;
    Ok(serde_json::to_value(outcome)?)
}
