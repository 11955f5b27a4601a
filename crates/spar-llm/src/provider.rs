use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use spar_core::errors::ProviderError;

/// A lazy, finite, non-restartable sequence of text fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// One streaming generation call: persona instructions plus the topic
/// restated as the user query.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub model: String,
    pub instructions: String,
    pub input: String,
}

/// One single-shot (non-streamed) call, used for summaries and follow-ups.
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub model: String,
    pub instructions: String,
    pub input: String,
}

/// The external text-generation collaborator.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Start a streaming generation. The returned stream yields fragments
    /// in generation order and ends after the final fragment; a mid-stream
    /// failure surfaces as an `Err` item and terminates the stream.
    async fn stream(&self, request: &GenerationRequest) -> Result<FragmentStream, ProviderError>;

    /// Run a short single-shot generation to completion.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;
}
