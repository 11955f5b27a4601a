use crate::events::DebateEvent;

/// Frame delimiter. A frame is `data: {json}\n\n`; the blank line is
/// recognizable no matter how the transport splits the bytes.
const FRAME_DELIMITER: &str = "\n\n";
const DATA_PREFIX: &str = "data: ";

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("invalid event payload: {0}")]
    InvalidPayload(String),
}

/// Encode one event as a single wire frame.
pub fn encode_frame(event: &DebateEvent) -> Result<String, WireError> {
    let json = serde_json::to_string(event)
        .map_err(|e| WireError::InvalidPayload(e.to_string()))?;
    Ok(format!("{DATA_PREFIX}{json}{FRAME_DELIMITER}"))
}

/// Incremental frame decoder.
///
/// Transport chunks may split a frame anywhere, including inside the
/// delimiter or in the middle of a multibyte character. The buffer holds
/// raw bytes and the delimiter scan runs at the byte level; only complete
/// frames are interpreted as UTF-8, so no event is ever dropped, decoded
/// twice, or corrupted at a chunk boundary.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk, returning every complete event it finishes.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<DebateEvent>, WireError> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = find_delimiter(&self.buf) {
            let raw: Vec<u8> = self.buf.drain(..pos + FRAME_DELIMITER.len()).collect();
            let frame = std::str::from_utf8(&raw)
                .map_err(|e| WireError::MalformedFrame(e.to_string()))?
                .trim_end();
            if frame.is_empty() {
                continue;
            }
            events.push(decode_frame(frame)?);
        }
        Ok(events)
    }

    /// True if a partial frame is still buffered.
    pub fn has_partial(&self) -> bool {
        !self.buf.iter().all(u8::is_ascii_whitespace)
    }
}

fn find_delimiter(buf: &[u8]) -> Option<usize> {
    buf.windows(FRAME_DELIMITER.len())
        .position(|w| w == FRAME_DELIMITER.as_bytes())
}

fn decode_frame(frame: &str) -> Result<DebateEvent, WireError> {
    let payload = frame
        .strip_prefix(DATA_PREFIX)
        .ok_or_else(|| WireError::MalformedFrame(frame.chars().take(40).collect()))?;
    serde_json::from_str(payload).map_err(|e| WireError::InvalidPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SourceDoc;
    use crate::ids::RunId;
    use crate::persona::PersonaRole;

    fn sample_events() -> Vec<DebateEvent> {
        vec![
            DebateEvent::Searching,
            DebateEvent::Sources {
                sources: vec![SourceDoc {
                    title: "IRAS circular".into(),
                    url: "https://iras.gov.sg/x".into(),
                    text: None,
                    summary: Some("key rulings".into()),
                }],
            },
            DebateEvent::Init {
                is_multi_run: false,
                runs: vec![],
            },
            DebateEvent::Delta {
                run_id: RunId::single(),
                persona_id: PersonaRole::Minimizer,
                persona_name: "The Minimizer".into(),
                color: "#10b981".into(),
                delta: "**Position**: deduct\n\nit".into(),
            },
            DebateEvent::Done,
        ]
    }

    #[test]
    fn encode_then_decode_single_chunk() {
        let events = sample_events();
        let mut wire = String::new();
        for e in &events {
            wire.push_str(&encode_frame(e).unwrap());
        }

        let mut decoder = FrameDecoder::new();
        let decoded = decoder.push(wire.as_bytes()).unwrap();
        assert_eq!(decoded, events);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn chunking_invariance_at_every_split_point() {
        // The decoder must reconstruct the same events no matter where the
        // byte stream is split, including inside the delimiter.
        let events = sample_events();
        let mut wire = String::new();
        for e in &events {
            wire.push_str(&encode_frame(e).unwrap());
        }
        let bytes = wire.as_bytes();

        for chunk_size in [1, 2, 3, 5, 7, 16, 64, bytes.len()] {
            let mut decoder = FrameDecoder::new();
            let mut decoded = Vec::new();
            for chunk in bytes.chunks(chunk_size) {
                decoded.extend(decoder.push(chunk).unwrap());
            }
            assert_eq!(decoded, events, "chunk_size={chunk_size}");
            assert!(!decoder.has_partial(), "chunk_size={chunk_size}");
        }
    }

    #[test]
    fn multibyte_text_survives_any_split_point() {
        // One-byte chunks split every multibyte character; the decoder must
        // still reproduce the single-feed result exactly.
        let event = DebateEvent::Delta {
            run_id: RunId::single(),
            persona_id: PersonaRole::Minimizer,
            persona_name: "The Minimizer".into(),
            color: "#10b981".into(),
            delta: "S$300k 上限 — déduction autorisée".into(),
        };
        let wire = encode_frame(&event).unwrap();
        let bytes = wire.as_bytes();

        for chunk_size in [1usize, 2, 3, 5] {
            let mut decoder = FrameDecoder::new();
            let mut decoded = Vec::new();
            for chunk in bytes.chunks(chunk_size) {
                decoded.extend(decoder.push(chunk).unwrap());
            }
            assert_eq!(decoded, vec![event.clone()], "chunk_size={chunk_size}");
            assert!(!decoder.has_partial());
        }
    }

    #[test]
    fn delta_payload_containing_delimiter_survives() {
        // JSON escapes newlines, so a fragment containing "\n\n" must not
        // be mistaken for a frame boundary.
        let event = DebateEvent::Delta {
            run_id: RunId::single(),
            persona_id: PersonaRole::Hawk,
            persona_name: "The Compliance Hawk".into(),
            color: "#ef4444".into(),
            delta: "para one\n\npara two".into(),
        };
        let wire = encode_frame(&event).unwrap();
        let mut decoder = FrameDecoder::new();
        let decoded = decoder.push(wire.as_bytes()).unwrap();
        assert_eq!(decoded, vec![event]);
    }

    #[test]
    fn partial_frame_is_held_not_decoded() {
        let wire = encode_frame(&DebateEvent::Done).unwrap();
        let (head, tail) = wire.as_bytes().split_at(5);

        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(head).unwrap().is_empty());
        assert!(decoder.has_partial());
        let decoded = decoder.push(tail).unwrap();
        assert_eq!(decoded, vec![DebateEvent::Done]);
    }

    #[test]
    fn missing_data_prefix_is_malformed() {
        let mut decoder = FrameDecoder::new();
        let err = decoder.push(b"event: oops\n\n").unwrap_err();
        assert!(matches!(err, WireError::MalformedFrame(_)));
    }

    #[test]
    fn garbage_json_is_invalid_payload() {
        let mut decoder = FrameDecoder::new();
        let err = decoder.push(b"data: {nope\n\n").unwrap_err();
        assert!(matches!(err, WireError::InvalidPayload(_)));
    }
}
