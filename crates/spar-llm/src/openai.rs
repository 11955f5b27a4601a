use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Future, Stream};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::instrument;

use spar_core::errors::ProviderError;

use crate::provider::{CompletionRequest, FragmentStream, GenerationProvider, GenerationRequest};
use crate::sse::{self, SseFrame};

const API_URL: &str = "https://api.openai.com/v1/responses";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const SSE_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

pub struct OpenAiProvider {
    client: Client,
    api_key: SecretString,
}

impl OpenAiProvider {
    pub fn new(api_key: SecretString) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
        Ok(Self { client, api_key })
    }

    fn build_request(&self, model: &str, instructions: &str, input: &str, stream: bool) -> reqwest::RequestBuilder {
        let body = json!({
            "model": model,
            "instructions": instructions,
            "input": input,
            "stream": stream,
        });
        self.client
            .post(API_URL)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("content-type", "application/json")
            .json(&body)
    }
}

#[async_trait]
impl GenerationProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn stream(&self, request: &GenerationRequest) -> Result<FragmentStream, ProviderError> {
        let resp = self
            .build_request(&request.model, &request.instructions, &request.input, true)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, body));
        }

        let stream = SseStream::new(resp.bytes_stream());
        Ok(Box::pin(stream))
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let resp = self
            .build_request(&request.model, &request.instructions, &request.input, false)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, body));
        }

        let value: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
        Ok(extract_output_text(&value))
    }
}

/// Collect the output text from a non-streamed Responses API payload.
fn extract_output_text(value: &Value) -> String {
    let mut text = String::new();
    let items = value
        .get("output")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for item in items {
        let parts = item
            .get("content")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for part in parts {
            if part.get("type").and_then(Value::as_str) == Some("output_text") {
                if let Some(t) = part.get("text").and_then(Value::as_str) {
                    text.push_str(t);
                }
            }
        }
    }
    text
}

/// Wraps a byte stream from reqwest and yields text fragments.
/// Includes an idle timeout — if no data arrives within `idle_duration`,
/// emits an error and ends the stream.
///
/// The buffer holds raw bytes and event blocks are split at the byte
/// level; reqwest chunk boundaries can fall inside a multibyte character,
/// so only complete blocks are interpreted as UTF-8.
struct SseStream {
    inner: Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>,
    buffer: Vec<u8>,
    pending: Vec<Result<String, ProviderError>>,
    done: bool,
    idle_deadline: Pin<Box<tokio::time::Sleep>>,
    idle_duration: Duration,
}

impl SseStream {
    fn new(
        byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
    ) -> Self {
        Self::with_idle_timeout(byte_stream, SSE_IDLE_TIMEOUT)
    }

    fn with_idle_timeout(
        byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            buffer: Vec::new(),
            pending: Vec::new(),
            done: false,
            idle_deadline: Box::pin(tokio::time::sleep(idle_timeout)),
            idle_duration: idle_timeout,
        }
    }

    fn absorb(&mut self, block: &str) {
        for frame in sse::parse_event_block(block) {
            match frame {
                SseFrame::Fragment(text) => self.pending.push(Ok(text)),
                SseFrame::Completed => self.done = true,
                SseFrame::Failed(message) => {
                    self.pending.push(Err(ProviderError::StreamInterrupted(message)));
                    self.done = true;
                }
            }
        }
    }
}

impl Stream for SseStream {
    type Item = Result<String, ProviderError>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        if !self.pending.is_empty() {
            return std::task::Poll::Ready(Some(self.pending.remove(0)));
        }
        if self.done {
            return std::task::Poll::Ready(None);
        }

        loop {
            match self.inner.as_mut().poll_next(cx) {
                std::task::Poll::Ready(Some(Ok(bytes))) => {
                    // Data received — reset idle timer
                    let new_deadline = tokio::time::Instant::now() + self.idle_duration;
                    self.idle_deadline.as_mut().reset(new_deadline);

                    self.buffer.extend_from_slice(&bytes);

                    while let Some(pos) =
                        self.buffer.windows(2).position(|w| w == b"\n\n")
                    {
                        let block: Vec<u8> = self.buffer.drain(..pos + 2).collect();
                        let block = String::from_utf8_lossy(&block[..pos]).into_owned();
                        self.absorb(&block);
                    }

                    if !self.pending.is_empty() {
                        return std::task::Poll::Ready(Some(self.pending.remove(0)));
                    }
                    if self.done {
                        return std::task::Poll::Ready(None);
                    }
                }
                std::task::Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return std::task::Poll::Ready(Some(Err(ProviderError::StreamInterrupted(
                        e.to_string(),
                    ))));
                }
                std::task::Poll::Ready(None) => {
                    // Stream ended — process remaining buffer
                    if !self.buffer.is_empty() {
                        let remaining = std::mem::take(&mut self.buffer);
                        let remaining = String::from_utf8_lossy(&remaining).into_owned();
                        self.absorb(&remaining);
                        if !self.pending.is_empty() {
                            return std::task::Poll::Ready(Some(self.pending.remove(0)));
                        }
                    }
                    self.done = true;
                    return std::task::Poll::Ready(None);
                }
                std::task::Poll::Pending => {
                    // No data available — check idle timeout
                    if self.idle_deadline.as_mut().poll(cx).is_ready() {
                        self.done = true;
                        return std::task::Poll::Ready(Some(Err(ProviderError::Timeout(
                            self.idle_duration,
                        ))));
                    }
                    return std::task::Poll::Pending;
                }
            }
        }
    }
}
