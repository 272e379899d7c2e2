use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Langbase error: {0}")]
    Langbase(#[from] LangbaseError),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Aggregation session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Corrupt stored state: {message}")]
    Corrupt { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Langbase API errors
#[derive(Debug, Error)]
pub enum LangbaseError {
    #[error("Langbase unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl LangbaseError {
    /// Whether another attempt at the same request could succeed.
    ///
    /// Rate limiting (429), server-side failures (5xx), timeouts and transport
    /// errors are transient. Client errors and unparseable bodies are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            LangbaseError::Api { status, .. } => is_retryable_status(*status),
            LangbaseError::Timeout { .. } => true,
            LangbaseError::Http(e) => !e.is_builder() && !e.is_decode(),
            LangbaseError::InvalidResponse { .. } | LangbaseError::Unavailable { .. } => false,
        }
    }
}

/// Errors raised by external collaborators: expansion oracles, relation
/// proposers and research collaborators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollaboratorError {
    /// The call failed. Whether it is worth retrying is decided from the
    /// message (see [`is_transient_message`]).
    #[error("{operation} failed: {message}")]
    Failed { operation: String, message: String },

    /// A failure already classified as transient by the transport layer.
    #[error("{operation} temporarily failed: {message}")]
    Transient { operation: String, message: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("{operation} returned malformed data: {message}")]
    Malformed { operation: String, message: String },

    /// Explicitly non-retryable (validation, authorization, bad request).
    #[error("{operation} rejected: {message}")]
    Rejected { operation: String, message: String },

    #[error("{operation} failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        message: String,
    },
}

/// Message fragments that mark a failure as transient.
const TRANSIENT_PATTERNS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "too many requests",
    "timeout",
    "timed out",
    "overloaded",
    "capacity",
    "temporarily unavailable",
    "service unavailable",
    "bad gateway",
    "gateway timeout",
    "internal server error",
    "connection reset",
    "connection refused",
    "connection closed",
];

/// Words that introduce an HTTP status code in an error message.
const STATUS_PREFIXES: &[&str] = &["status", "http", "error", "code"];

/// Whether an HTTP status is worth retrying: 429 or any 5xx.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Whether an error message describes a transient condition.
///
/// Status codes count only as a standalone number right after a word like
/// "status" or "error", so "1500 tokens" is not mistaken for a 500.
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p)) || mentions_retryable_status(&lower)
}

fn mentions_retryable_status(lower: &str) -> bool {
    let words: Vec<&str> = lower
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_ascii_alphanumeric()))
        .collect();
    words.windows(2).any(|pair| {
        STATUS_PREFIXES.contains(&pair[0])
            && pair[1].len() == 3
            && pair[1].parse::<u16>().map_or(false, is_retryable_status)
    })
}

impl CollaboratorError {
    /// Create a generic failure.
    pub fn failed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        CollaboratorError::Failed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a malformed-response failure.
    pub fn malformed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        CollaboratorError::Malformed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an explicitly non-retryable failure.
    pub fn rejected(operation: impl Into<String>, message: impl Into<String>) -> Self {
        CollaboratorError::Rejected {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Whether the retry wrapper should try the call again.
    pub fn is_retryable(&self) -> bool {
        match self {
            CollaboratorError::Timeout { .. } | CollaboratorError::Transient { .. } => true,
            CollaboratorError::Failed { message, .. } => is_transient_message(message),
            CollaboratorError::Malformed { .. }
            | CollaboratorError::Rejected { .. }
            | CollaboratorError::RetriesExhausted { .. } => false,
        }
    }

    /// Name of the operation that failed.
    pub fn operation(&self) -> &str {
        match self {
            CollaboratorError::Failed { operation, .. }
            | CollaboratorError::Transient { operation, .. }
            | CollaboratorError::Timeout { operation, .. }
            | CollaboratorError::Malformed { operation, .. }
            | CollaboratorError::Rejected { operation, .. }
            | CollaboratorError::RetriesExhausted { operation, .. } => operation,
        }
    }
}

impl From<LangbaseError> for CollaboratorError {
    fn from(err: LangbaseError) -> Self {
        let operation = "langbase".to_string();
        match err {
            LangbaseError::Timeout { timeout_ms } => CollaboratorError::Timeout {
                operation,
                timeout_ms,
            },
            // The client only gives up on retryable errors, so a single attempt
            // is still worth retrying by the caller.
            LangbaseError::Unavailable { message, retries } if retries <= 1 => {
                CollaboratorError::Transient { operation, message }
            }
            LangbaseError::Unavailable { message, retries } => {
                CollaboratorError::RetriesExhausted {
                    operation,
                    attempts: retries,
                    message,
                }
            }
            LangbaseError::InvalidResponse { message } => {
                CollaboratorError::Malformed { operation, message }
            }
            ref e @ LangbaseError::Api { .. } if !e.is_retryable() => {
                CollaboratorError::Rejected {
                    operation,
                    message: e.to_string(),
                }
            }
            ref e if e.is_retryable() => CollaboratorError::Transient {
                operation,
                message: e.to_string(),
            },
            e => CollaboratorError::Failed {
                operation,
                message: e.to_string(),
            },
        }
    }
}

/// Input validation failure.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Validation failed: {field} - {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    /// Create a validation error for a field.
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for Langbase operations
pub type LangbaseResult<T> = Result<T, LangbaseError>;

/// Result type alias for collaborator calls
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;
