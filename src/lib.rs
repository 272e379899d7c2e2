//! # Thought Explorer
//!
//! An exploratory reasoning engine built around three cooperating pieces:
//!
//! - **Beam search** ([`search`]): expands a tree of thoughts level by level
//!   through an [`ExpansionOracle`](search::ExpansionOracle), keeping the best
//!   candidates per depth and surviving oracle failures
//! - **Thought graph** ([`graph`]): Hebbian reinforcement, decay-based
//!   pruning and an aggregation engine that folds relation proposals into a
//!   graph once per cycle
//! - **Research loop** ([`research`]): plan, search and analyze until the
//!   information is sufficient, with bounded retry and parse fallbacks
//!
//! Collaborators are plain async traits; [`langbase`] provides
//! implementations backed by Langbase pipes.
//!
//! ## Architecture
//!
//! ```text
//! CLI / caller → search | graph | research → collaborator traits
//!                            ↓                      ↓
//!                   SQLite (session state)   Langbase Pipes (HTTP)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use thought_explorer::search::{beam_search, oracle_fn, BeamSearchOptions, Node, Thought};
//!
//! let oracle = oracle_fn(|node: Node<Thought>| async move {
//!     Ok(vec![Node::child_of(&node, Thought::new("next"), 7.0)])
//! });
//! let nodes = beam_search(&oracle, Thought::new("start"), 5.0, &BeamSearchOptions::new(3, 2)).await;
//! ```

/// Command-line interface.
pub mod cli;
/// Configuration loaded from the environment.
pub mod config;
/// Error types and result aliases.
pub mod error;
/// Thought graph model, rules and aggregation engine.
pub mod graph;
/// Langbase API client and pipe-backed collaborators.
pub mod langbase;
/// System prompts for Langbase pipes.
pub mod prompts;
/// Iterative research loop.
pub mod research;
/// Bounded retry with exponential backoff.
pub mod retry;
/// Beam search explorer.
pub mod search;
/// SQLite storage for aggregation sessions.
pub mod storage;

mod completion;

pub use completion::extract_json_from_completion;
pub use config::Config;
pub use error::{AppError, AppResult, CollaboratorError, CollaboratorResult};
