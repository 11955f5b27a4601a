use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;

use spar_core::errors::ProviderError;

use crate::provider::{CompletionRequest, FragmentStream, GenerationProvider, GenerationRequest};

/// Pre-programmed responses for deterministic testing without API calls.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Yield a sequence of fragment results.
    Stream(Vec<Result<String, ProviderError>>),
    /// Return an error from the stream() call itself.
    Error(ProviderError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    /// Convenience: stream one fragment per input string.
    pub fn fragments<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Stream(parts.into_iter().map(|s| Ok(s.into())).collect())
    }

    /// Convenience: stream a single fragment holding the whole text.
    pub fn stream_text(text: &str) -> Self {
        Self::fragments([text])
    }

    /// Convenience: stream some fragments, then fail mid-stream.
    pub fn fragments_then_error<I, S>(parts: I, error: ProviderError) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut items: Vec<Result<String, ProviderError>> =
            parts.into_iter().map(|s| Ok(s.into())).collect();
        items.push(Err(error));
        Self::Stream(items)
    }

    /// Convenience: wrap any response with a delay.
    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock provider that returns pre-programmed responses in sequence.
/// Streaming and completion calls draw from separate queues.
pub struct MockProvider {
    responses: Vec<MockResponse>,
    completions: Vec<Result<String, ProviderError>>,
    stream_calls: AtomicUsize,
    completion_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses,
            completions: Vec::new(),
            stream_calls: AtomicUsize::new(0),
            completion_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_completions(
        mut self,
        completions: Vec<Result<String, ProviderError>>,
    ) -> Self {
        self.completions = completions;
        self
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::Relaxed)
    }

    pub fn completion_calls(&self) -> usize {
        self.completion_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl GenerationProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn stream(&self, _request: &GenerationRequest) -> Result<FragmentStream, ProviderError> {
        let idx = self.stream_calls.fetch_add(1, Ordering::Relaxed);
        let Some(response) = self.responses.get(idx) else {
            return Err(ProviderError::InvalidRequest(format!(
                "MockProvider: no response configured for call {idx}"
            )));
        };
        resolve_response(response).await
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String, ProviderError> {
        let idx = self.completion_calls.fetch_add(1, Ordering::Relaxed);
        match self.completions.get(idx) {
            Some(result) => result.clone(),
            None => Err(ProviderError::InvalidRequest(format!(
                "MockProvider: no completion configured for call {idx}"
            ))),
        }
    }
}

/// Resolve a MockResponse, handling Delay by sleeping first.
/// Unrolls nested delays iteratively to avoid recursive async.
async fn resolve_response(response: &MockResponse) -> Result<FragmentStream, ProviderError> {
    let mut current = response;
    loop {
        match current {
            MockResponse::Stream(items) => {
                let items = items.clone();
                return Ok(Box::pin(stream::iter(items)));
            }
            MockResponse::Error(e) => return Err(e.clone()),
            MockResponse::Delay(duration, inner) => {
                tokio::time::sleep(*duration).await;
                current = inner;
            }
        }
    }
}
