use async_trait::async_trait;

pub mod client;
pub mod gemini;
pub mod types;
pub use client::{InferenceClient, DECLINE_SENTINEL};
pub use types::*;

/// Trait for multimodal inference providers (Gemini, or a mock in tests).
/// One request in, one reply out; no streaming and no retries.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Send the instruction plus image and return the raw reply.
    /// Provider-side failures are mapped onto `InferenceError` here so the
    /// client never sees library- or HTTP-specific errors.
    async fn generate(&self, request: &InferenceRequest) -> Result<ProviderResponse, InferenceError>;

    /// Provider name for logging/display
    fn name(&self) -> &str;
}
