//! Inference provider integrations

pub mod bedrock;

use async_trait::async_trait;
use thiserror::Error;

use crate::conversation::Turn;

pub use bedrock::{available_models, clean_response, BedrockProvider};

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Chat-completion seam. Stateless across calls: the model id travels with
/// every request, so switching models mid-conversation needs no special
/// handling here.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Generate a completion for the given system instruction and
    /// transcript. The last entry of `transcript` is the new user message.
    async fn complete(
        &self,
        model_id: &str,
        system: &str,
        transcript: &[Turn],
    ) -> Result<String, InferenceError>;

    /// Cheap connectivity probe for the connection-test surface.
    async fn health(&self) -> Result<String, InferenceError>;
}
