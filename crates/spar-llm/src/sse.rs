use serde_json::Value;

/// Parsed meaning of one OpenAI Responses SSE data payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SseFrame {
    /// One incremental piece of output text.
    Fragment(String),
    /// The response finished cleanly.
    Completed,
    /// The provider reported a failure mid-stream.
    Failed(String),
}

/// Parse one SSE event block (the text between blank-line delimiters) into
/// zero or more frames. Unknown event types are ignored; the Responses API
/// emits many bookkeeping events we have no use for.
pub fn parse_event_block(block: &str) -> Vec<SseFrame> {
    let mut frames = Vec::new();
    for line in block.lines() {
        let Some(data) = line.strip_prefix("data:").map(str::trim_start) else {
            continue;
        };
        if data == "[DONE]" {
            frames.push(SseFrame::Completed);
            continue;
        }
        if let Some(frame) = parse_data_payload(data) {
            frames.push(frame);
        }
    }
    frames
}

fn parse_data_payload(data: &str) -> Option<SseFrame> {
    let value: Value = serde_json::from_str(data).ok()?;
    match value.get("type").and_then(Value::as_str)? {
        "response.output_text.delta" => {
            let delta = value.get("delta").and_then(Value::as_str)?;
            Some(SseFrame::Fragment(delta.to_string()))
        }
        "response.completed" => Some(SseFrame::Completed),
        "response.failed" | "response.incomplete" | "error" => {
            let message = value
                .pointer("/response/error/message")
                .or_else(|| value.pointer("/error/message"))
                .or_else(|| value.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("provider reported failure");
            Some(SseFrame::Failed(message.to_string()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_event_yields_fragment() {
        let block = r#"event: response.output_text.delta
data: {"type":"response.output_text.delta","delta":"**Position**: "}"#;
        assert_eq!(
            parse_event_block(block),
            vec![SseFrame::Fragment("**Position**: ".into())]
        );
    }

    #[test]
    fn completed_event_recognized() {
        let block = r#"data: {"type":"response.completed","response":{"id":"resp_1"}}"#;
        assert_eq!(parse_event_block(block), vec![SseFrame::Completed]);
    }

    #[test]
    fn failed_event_carries_message() {
        let block = r#"data: {"type":"response.failed","response":{"error":{"message":"model overloaded"}}}"#;
        assert_eq!(
            parse_event_block(block),
            vec![SseFrame::Failed("model overloaded".into())]
        );
    }

    #[test]
    fn error_event_without_nesting() {
        let block = r#"data: {"type":"error","message":"bad request"}"#;
        assert_eq!(parse_event_block(block), vec![SseFrame::Failed("bad request".into())]);
    }

    #[test]
    fn bookkeeping_events_ignored() {
        let block = r#"data: {"type":"response.created","response":{}}
data: {"type":"response.output_item.added"}"#;
        assert!(parse_event_block(block).is_empty());
    }

    #[test]
    fn done_sentinel_completes() {
        assert_eq!(parse_event_block("data: [DONE]"), vec![SseFrame::Completed]);
    }

    #[test]
    fn non_data_lines_skipped() {
        let block = ": keep-alive\nretry: 3000";
        assert!(parse_event_block(block).is_empty());
    }
}
