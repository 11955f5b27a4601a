use bytes::Bytes;
use tokio::sync::mpsc;

use spar_core::events::DebateEvent;
use spar_core::wire::{encode_frame, WireError};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Write attempted after the channel closed. Callers treat this as a
    /// broken ordering invariant, not a recoverable condition.
    #[error("channel already closed")]
    Closed,
    /// The reader went away (client disconnect).
    #[error("receiver dropped")]
    Disconnected,
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Single-writer framed event stream feeding the response body.
///
/// Frames are appended in call order and never reordered. The channel
/// closes itself exactly once, immediately after the terminal event;
/// any later send is `ChannelError::Closed`.
pub struct EventChannel {
    tx: Option<mpsc::Sender<Bytes>>,
}

impl EventChannel {
    /// Create a channel and the byte receiver that feeds the transport.
    pub fn new() -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (Self { tx: Some(tx) }, rx)
    }

    /// Encode and append one event. Sending the terminal event closes the
    /// channel after the frame goes out.
    pub async fn send(&mut self, event: &DebateEvent) -> Result<(), ChannelError> {
        let Some(tx) = &self.tx else {
            return Err(ChannelError::Closed);
        };
        let frame = encode_frame(event)?;
        tx.send(Bytes::from(frame))
            .await
            .map_err(|_| ChannelError::Disconnected)?;
        if event.is_terminal() {
            self.tx = None;
        }
        Ok(())
    }

    /// Close without a terminal event (abort path). Idempotent.
    pub fn close(&mut self) {
        self.tx = None;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }
}
