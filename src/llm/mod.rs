//! Generative backend seam.
//!
//! A backend only knows how to answer one request. Retries, backoff and the
//! decision to fall back to deterministic fixtures belong to the caller, and
//! the outcome of that decision is spelled out as a [`Generation`] value
//! rather than an error to catch.

mod openai;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::BackendError;

pub use openai::OpenAiBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Abstraction over a chat-completion style model.
/// Real implementation: `OpenAiBackend`. Test double: `testing::ScriptedBackend`.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn request(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: f32,
    ) -> Result<String, BackendError>;
}

/// Outcome of a generation call after retries.
#[derive(Debug)]
pub enum Generation {
    Text(String),
    /// No backend is configured.
    Offline,
    /// Every attempt failed; carries the last error.
    Failed(BackendError),
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts including the first. Zero means "never call".
    pub max_attempts: u32,
    /// Delay before attempt `n` (1-based) is `backoff * (n - 1)`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_millis(750),
        }
    }
}

/// Call `backend` up to `policy.max_attempts` times with linear backoff.
pub async fn generate(
    backend: Option<&dyn GenerativeBackend>,
    messages: &[ChatMessage],
    model: &str,
    temperature: f32,
    policy: RetryPolicy,
) -> Generation {
    let Some(backend) = backend else {
        return Generation::Offline;
    };

    let mut last_error = BackendError::EmptyResponse;
    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            tokio::time::sleep(policy.backoff * (attempt - 1)).await;
        }
        match backend.request(messages, model, temperature).await {
            Ok(text) if !text.trim().is_empty() => {
                debug!(model, attempt, chars = text.len(), "generation succeeded");
                return Generation::Text(text);
            }
            Ok(_) => {
                warn!(model, attempt, "generation returned empty text");
                last_error = BackendError::EmptyResponse;
            }
            Err(error) => {
                warn!(model, attempt, error = %error, "generation attempt failed");
                last_error = error;
            }
        }
    }
    Generation::Failed(last_error)
}
