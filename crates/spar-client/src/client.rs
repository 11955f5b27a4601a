use futures::StreamExt;
use serde_json::Value;
use tracing::instrument;

use crate::replay::{DebateReplay, ReplayError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error(transparent)]
    Replay(#[from] ReplayError),
}

/// Streams one debate session from the server and replays it locally.
pub struct DebateClient {
    client: reqwest::Client,
    base_url: String,
}

impl DebateClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST the request body and feed the framed response through a
    /// replay, returning it once the transport ends.
    #[instrument(skip(self, body))]
    pub async fn stream_debate(&self, body: &Value) -> Result<DebateReplay, ClientError> {
        let resp = self
            .client
            .post(format!("{}/api/debate", self.base_url))
            .json(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Rejected { status, body });
        }

        let mut replay = DebateReplay::new();
        let mut bytes = resp.bytes_stream();
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => replay.feed(&chunk)?,
                // Transport drop mid-session: surface what was buffered.
                Err(_) => break,
            }
        }
        replay.on_transport_closed();
        Ok(replay)
    }
}
