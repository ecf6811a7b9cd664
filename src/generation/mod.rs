//! # Text Generation
//!
//! The reply for each turn comes from a chat model: a fixed system prompt plus
//! the caller's transcript as the only user message. There is no conversation
//! memory between turns.

pub mod openai;

use crate::error::PipelineError;
use async_trait::async_trait;

pub use openai::ChatCompletionsClient;

/// A backend that turns one user utterance into one reply.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Fails with `GenerationFailure` on network, auth, quota or decoding errors.
    async fn generate(&self, system_prompt: &str, user_text: &str)
        -> Result<String, PipelineError>;
}
