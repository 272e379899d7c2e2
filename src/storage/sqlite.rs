use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use super::{AggregationSummary, Storage, StoredAggregation};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use crate::graph::{NodeConnection, PersistentState};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create an in-memory instance (single connection, lost on drop)
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_connections(&self, session_id: &str) -> StorageResult<Vec<NodeConnection>> {
        let rows: Vec<ConnectionRow> = sqlx::query_as(
            r#"
            SELECT id, source_node_id, target_node_id, strength, reasoning,
                   created_at, last_activated, activation_count
            FROM graph_connections
            WHERE session_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn save_aggregation(&self, aggregation: &StoredAggregation) -> StorageResult<()> {
        let state = serde_json::to_string(&aggregation.persistent_state).map_err(|e| {
            StorageError::Query {
                message: format!("Failed to serialize persistent state: {}", e),
            }
        })?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO aggregation_sessions (id, query, cycle_count, persistent_state, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                query = excluded.query,
                cycle_count = excluded.cycle_count,
                persistent_state = excluded.persistent_state,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&aggregation.session_id)
        .bind(&aggregation.query)
        .bind(aggregation.cycle_count as i64)
        .bind(&state)
        .bind(aggregation.created_at.to_rfc3339())
        .bind(aggregation.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM graph_connections WHERE session_id = ?")
            .bind(&aggregation.session_id)
            .execute(&mut *tx)
            .await?;

        for (position, conn) in aggregation.connections.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO graph_connections
                    (session_id, id, position, source_node_id, target_node_id, strength,
                     reasoning, created_at, last_activated, activation_count)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&aggregation.session_id)
            .bind(&conn.id)
            .bind(position as i64)
            .bind(&conn.source_node_id)
            .bind(&conn.target_node_id)
            .bind(conn.strength)
            .bind(&conn.reasoning)
            .bind(conn.created_at.to_rfc3339())
            .bind(conn.last_activated.to_rfc3339())
            .bind(conn.activation_count as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            session_id = %aggregation.session_id,
            cycle_count = aggregation.cycle_count,
            connections = aggregation.connections.len(),
            "Aggregation session saved"
        );
        Ok(())
    }

    async fn load_aggregation(&self, session_id: &str) -> StorageResult<Option<StoredAggregation>> {
        let row: Option<AggregationRow> = sqlx::query_as(
            r#"
            SELECT id, query, cycle_count, persistent_state, created_at, updated_at
            FROM aggregation_sessions
            WHERE id = ?
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let connections = self.load_connections(session_id).await?;
        row.into_stored(connections).map(Some)
    }

    async fn delete_aggregation(&self, session_id: &str) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM graph_connections WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM aggregation_sessions WHERE id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_aggregations(&self) -> StorageResult<Vec<AggregationSummary>> {
        let rows: Vec<SummaryRow> = sqlx::query_as(
            r#"
            SELECT s.id, s.query, s.cycle_count, s.updated_at,
                   (SELECT COUNT(*) FROM graph_connections c WHERE c.session_id = s.id) AS connection_count
            FROM aggregation_sessions s
            ORDER BY s.updated_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct AggregationRow {
    id: String,
    query: String,
    cycle_count: i64,
    persistent_state: String,
    created_at: String,
    updated_at: String,
}

impl AggregationRow {
    fn into_stored(self, connections: Vec<NodeConnection>) -> StorageResult<StoredAggregation> {
        let persistent_state: PersistentState = serde_json::from_str(&self.persistent_state)
            .map_err(|e| StorageError::Corrupt {
                message: format!("Invalid persistent state for session {}: {}", self.id, e),
            })?;

        Ok(StoredAggregation {
            session_id: self.id,
            query: self.query,
            cycle_count: self.cycle_count.max(0) as u64,
            connections,
            persistent_state,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct ConnectionRow {
    id: String,
    source_node_id: String,
    target_node_id: String,
    strength: f64,
    reasoning: Option<String>,
    created_at: String,
    last_activated: String,
    activation_count: i64,
}

impl From<ConnectionRow> for NodeConnection {
    fn from(row: ConnectionRow) -> Self {
        Self {
            id: row.id,
            source_node_id: row.source_node_id,
            target_node_id: row.target_node_id,
            strength: row.strength,
            reasoning: row.reasoning,
            created_at: parse_timestamp(&row.created_at),
            last_activated: parse_timestamp(&row.last_activated),
            activation_count: u32::try_from(row.activation_count).unwrap_or(1),
        }
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: String,
    query: String,
    cycle_count: i64,
    updated_at: String,
    connection_count: i64,
}

impl From<SummaryRow> for AggregationSummary {
    fn from(row: SummaryRow) -> Self {
        Self {
            session_id: row.id,
            query: row.query,
            cycle_count: row.cycle_count.max(0) as u64,
            connection_count: row.connection_count.max(0) as usize,
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}
