//! Wire types for the Langbase pipes API.

use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;

/// Chat message sent to or returned by a pipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Request body for `POST /v1/pipes/run`.
///
/// Every collaborator call is a single-shot exchange, so requests never carry
/// a thread and always ask for a non-streamed completion.
#[derive(Debug, Clone, Serialize)]
pub struct PipeRequest {
    /// Pipe name
    pub name: String,
    pub messages: Vec<Message>,
    pub stream: bool,
}

impl PipeRequest {
    /// Create a non-streaming request for a pipe
    pub fn new(name: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            name: name.into(),
            messages,
            stream: false,
        }
    }

    /// A system prompt followed by one user message
    pub fn prompted(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        user_message: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            vec![Message::system(system_prompt), Message::user(user_message)],
        )
    }
}

/// Pipe run result
#[derive(Debug, Clone, Deserialize)]
pub struct PipeResponse {
    pub success: bool,
    pub completion: String,
    #[serde(rename = "threadId", default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub raw: Option<RawResponse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawResponse {
    pub model: Option<String>,
    pub usage: Option<Usage>,
}

/// Token accounting reported by the model
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl PipeResponse {
    /// Total tokens reported by the model, if any
    pub fn total_tokens(&self) -> Option<u32> {
        self.usage().and_then(|u| u.total_tokens)
    }

    /// Model name reported by the pipe, if any
    pub fn model(&self) -> Option<&str> {
        self.raw.as_ref().and_then(|r| r.model.as_deref())
    }

    fn usage(&self) -> Option<&Usage> {
        self.raw.as_ref().and_then(|r| r.usage.as_ref())
    }
}
