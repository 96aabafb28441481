use bytes::BytesMut;
use relay_core::StreamEvent;
use relay_logging::{relay_trace, relay_warn};
use serde_json::Value;

/// One decoded line of a chat response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatFrame {
    Event(StreamEvent),
    /// The server's explicit end-of-stream marker.
    Done,
}

/// Splits a chat response body into events. Accepts newline-delimited JSON
/// as well as server-sent events (`data: ` lines, `:` comments, `[DONE]`).
#[derive(Debug, Default)]
pub struct ChatLineDecoder {
    buffer: BytesMut,
    conversation_id: Option<String>,
    done: bool,
}

impl ChatLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last conversation id seen on any event of this response.
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feeds one chunk of the body. Incomplete trailing lines wait for the
    /// next chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ChatFrame> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line = self.buffer.split_to(newline + 1);
            if let Some(frame) = self.decode_line(&line[..newline]) {
                frames.push(frame);
            }
            if self.done {
                self.buffer.clear();
                break;
            }
        }
        frames
    }

    /// Decodes whatever is left once the body has ended without a newline.
    pub fn finish(&mut self) -> Vec<ChatFrame> {
        if self.done {
            return Vec::new();
        }
        let rest = self.buffer.split();
        self.decode_line(&rest).into_iter().collect()
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<ChatFrame> {
        let text = match std::str::from_utf8(raw) {
            Ok(text) => text,
            Err(err) => {
                relay_warn!("dropping chat line with invalid UTF-8: {}", err);
                return None;
            }
        };
        let line = text.trim();
        if line.is_empty() || line.starts_with(':') {
            return None;
        }
        if ["event:", "id:", "retry:"]
            .iter()
            .any(|field| line.starts_with(field))
        {
            relay_trace!("ignoring SSE field line {}", line);
            return None;
        }

        let payload = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
        if payload == "[DONE]" {
            self.done = true;
            return Some(ChatFrame::Done);
        }

        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(err) => {
                relay_warn!("dropping malformed chat line {:?}: {}", payload, err);
                return None;
            }
        };
        if let Some(id) = value.get("conversation_id").and_then(id_text) {
            self.conversation_id = Some(id);
        }

        match serde_json::from_value::<StreamEvent>(value) {
            Ok(event) => {
                if let StreamEvent::ConversationId { id } = &event {
                    self.conversation_id = Some(id.clone());
                }
                Some(ChatFrame::Event(event))
            }
            Err(err) => {
                relay_warn!("dropping undecodable chat event {:?}: {}", payload, err);
                None
            }
        }
    }
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
