//! Storage layer for aggregation session state.
//!
//! The aggregation engine holds no state between cycles; this module lets a
//! caller persist the cycle counter, the connection set and the opaque
//! persistent state per session, and resume cycles later.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;
use crate::graph::{AggregationResult, NodeConnection, PersistentState};

/// Everything needed to run the next cycle of an aggregation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAggregation {
    /// Caller-chosen session identifier.
    pub session_id: String,
    /// Query the session aggregates toward.
    pub query: String,
    pub cycle_count: u64,
    /// Connections in cycle output order.
    pub connections: Vec<NodeConnection>,
    pub persistent_state: PersistentState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredAggregation {
    /// Start a fresh session at cycle 0
    pub fn new(session_id: impl Into<String>, query: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            query: query.into(),
            cycle_count: 0,
            connections: Vec::new(),
            persistent_state: PersistentState::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Fold a cycle result into the stored state.
    ///
    /// Degraded cycles carry the prior state back, so applying them is safe.
    pub fn apply(&mut self, result: &AggregationResult) {
        self.cycle_count = result.cycle_count;
        self.connections = result.connections.clone();
        self.persistent_state = result.persistent_state.clone();
        self.updated_at = Utc::now();
    }
}

/// Listing entry for a stored session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationSummary {
    pub session_id: String,
    pub query: String,
    pub cycle_count: u64,
    pub connection_count: usize,
    pub updated_at: DateTime<Utc>,
}

/// Persistence for aggregation sessions.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert or replace a session and its connection set.
    async fn save_aggregation(&self, aggregation: &StoredAggregation) -> StorageResult<()>;
    /// Load a session, if it exists.
    async fn load_aggregation(&self, session_id: &str) -> StorageResult<Option<StoredAggregation>>;
    /// Delete a session and its connections.
    async fn delete_aggregation(&self, session_id: &str) -> StorageResult<()>;
    /// List sessions, most recently updated first.
    async fn list_aggregations(&self) -> StorageResult<Vec<AggregationSummary>>;
}
