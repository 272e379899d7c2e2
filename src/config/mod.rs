use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::AppError;
use crate::graph::GraphConfig;
use crate::research::ResearchConfig;
use crate::search::SearchConfig;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub langbase: LangbaseConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub pipes: PipeConfig,
    pub search: SearchConfig,
    pub graph: GraphConfig,
    pub research: ResearchConfig,
}

/// Langbase API configuration
#[derive(Debug, Clone)]
pub struct LangbaseConfig {
    /// Empty when `LANGBASE_API_KEY` is unset; checked by [`LangbaseConfig::require_api_key`].
    pub api_key: String,
    pub base_url: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request and retry configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub backoff_factor: f64,
}

/// Langbase pipe names, one per collaborator role
#[derive(Debug, Clone)]
pub struct PipeConfig {
    pub expand: String,
    pub relate: String,
    pub plan: String,
    pub search: String,
    pub analyze: String,
    pub report: String,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_opt<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let langbase = LangbaseConfig {
            api_key: env::var("LANGBASE_API_KEY").unwrap_or_default(),
            base_url: env::var("LANGBASE_BASE_URL")
                .unwrap_or_else(|_| "https://api.langbase.com".to_string()),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/explorer.db".to_string()),
            ),
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request_defaults = RequestConfig::default();
        let request = RequestConfig {
            timeout_ms: env_or("REQUEST_TIMEOUT_MS", request_defaults.timeout_ms),
            max_retries: env_or("MAX_RETRIES", request_defaults.max_retries),
            retry_delay_ms: env_or("RETRY_DELAY_MS", request_defaults.retry_delay_ms),
            max_retry_delay_ms: env_or("RETRY_MAX_DELAY_MS", request_defaults.max_retry_delay_ms),
            backoff_factor: env_or("RETRY_BACKOFF_FACTOR", request_defaults.backoff_factor),
        };

        let pipes = PipeConfig {
            expand: env::var("PIPE_EXPAND").unwrap_or_else(|_| "thought-expand-v1".to_string()),
            relate: env::var("PIPE_RELATE").unwrap_or_else(|_| "thought-relate-v1".to_string()),
            plan: env::var("PIPE_PLAN").unwrap_or_else(|_| "research-plan-v1".to_string()),
            search: env::var("PIPE_SEARCH").unwrap_or_else(|_| "research-search-v1".to_string()),
            analyze: env::var("PIPE_ANALYZE")
                .unwrap_or_else(|_| "research-analyze-v1".to_string()),
            report: env::var("PIPE_REPORT").unwrap_or_else(|_| "research-report-v1".to_string()),
        };

        let search_defaults = SearchConfig::default();
        let search = SearchConfig {
            max_depth: env_or("SEARCH_MAX_DEPTH", search_defaults.max_depth),
            beam_width: env_or("SEARCH_BEAM_WIDTH", search_defaults.beam_width),
            min_beam_width: env_or("SEARCH_MIN_BEAM_WIDTH", search_defaults.min_beam_width),
            cost_budget: env_opt("SEARCH_COST_BUDGET").or(search_defaults.cost_budget),
            branching: env_or("SEARCH_BRANCHING", search_defaults.branching),
        };

        let graph_defaults = GraphConfig::default();
        let graph = GraphConfig {
            learning_rate: env_or("GRAPH_LEARNING_RATE", graph_defaults.learning_rate),
            pruning_threshold: env_or("GRAPH_PRUNING_THRESHOLD", graph_defaults.pruning_threshold),
            inactivity_window_secs: env_or(
                "GRAPH_INACTIVITY_WINDOW_SECS",
                graph_defaults.inactivity_window_secs,
            ),
            decay_factor: env_or("GRAPH_DECAY_FACTOR", graph_defaults.decay_factor),
            default_node_score: env_or("GRAPH_DEFAULT_NODE_SCORE", graph_defaults.default_node_score),
        };

        let research_defaults = ResearchConfig::default();
        let research = ResearchConfig {
            max_iterations: env_or("RESEARCH_MAX_ITERATIONS", research_defaults.max_iterations),
            generate_report: env_or("RESEARCH_GENERATE_REPORT", research_defaults.generate_report),
        };

        Ok(Config {
            langbase,
            database,
            logging,
            request,
            pipes,
            search,
            graph,
            research,
        })
    }
}

impl LangbaseConfig {
    /// Fail unless an API key is configured.
    pub fn require_api_key(&self) -> Result<&str, AppError> {
        if self.api_key.trim().is_empty() {
            return Err(AppError::Config {
                message: "LANGBASE_API_KEY is required".to_string(),
            });
        }
        Ok(&self.api_key)
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
            max_retry_delay_ms: 10_000,
            backoff_factor: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_config_default() {
        let config = RequestConfig::default();
        assert_eq!(config.timeout_ms, 30000);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 1000);
        assert_eq!(config.max_retry_delay_ms, 10_000);
        assert!((config.backoff_factor - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_require_api_key() {
        let config = LangbaseConfig {
            api_key: "  ".to_string(),
            base_url: "https://api.langbase.com".to_string(),
        };
        let err = config.require_api_key().unwrap_err();
        assert!(err.to_string().contains("LANGBASE_API_KEY"));

        let config = LangbaseConfig {
            api_key: "key".to_string(),
            base_url: "https://api.langbase.com".to_string(),
        };
        assert_eq!(config.require_api_key().unwrap(), "key");
    }
}
