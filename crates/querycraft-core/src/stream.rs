//! Incremental decoding of the agent's newline-delimited JSON event stream.
//!
//! Every line is decoded on its own. Blank lines, lines that are not JSON and
//! JSON objects with an unknown `type` are dropped, so log output the agent
//! interleaves with its events never breaks a run.

use std::io;

use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Model output: text and tool invocations, in order.
    Assistant { blocks: Vec<AssistantBlock> },
    /// Tool results fed back to the model.
    User { results: Vec<ToolResult> },
    /// Terminal event carrying the final answer.
    Result { text: String, is_error: bool },
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssistantBlock {
    Text(String),
    ToolUse { name: String, input: Map<String, Value> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawEvent {
    Assistant {
        #[serde(default)]
        message: RawMessage,
    },
    User {
        #[serde(default)]
        message: RawMessage,
    },
    Result {
        #[serde(default)]
        result: String,
        #[serde(default)]
        is_error: bool,
    },
}

#[derive(Deserialize, Default)]
struct RawMessage {
    #[serde(default)]
    content: Value,
}

impl RawMessage {
    // Blocks are decoded one at a time so a single odd block does not cost the whole event.
    fn blocks(self) -> impl Iterator<Item = RawBlock> {
        let items = match self.content {
            Value::Array(items) => items,
            _ => Vec::new(),
        };
        items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<RawBlock>(item).ok())
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        #[serde(default = "default_tool_name")]
        name: String,
        #[serde(default)]
        input: Map<String, Value>,
    },
    ToolResult {
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(other)]
    Other,
}

fn default_tool_name() -> String {
    "tool".to_string()
}

/// Decodes one line of agent output. Never fails: anything unexpected is `Unrecognized`.
pub fn decode_line(line: &str) -> StreamEvent {
    let raw = match serde_json::from_str::<RawEvent>(line.trim()) {
        Ok(raw) => raw,
        Err(_) => return StreamEvent::Unrecognized,
    };

    match raw {
        RawEvent::Assistant { message } => StreamEvent::Assistant {
            blocks: message
                .blocks()
                .filter_map(|block| match block {
                    RawBlock::Text { text } => Some(AssistantBlock::Text(text)),
                    RawBlock::ToolUse { name, input } => Some(AssistantBlock::ToolUse { name, input }),
                    _ => None,
                })
                .collect(),
        },
        RawEvent::User { message } => StreamEvent::User {
            results: message
                .blocks()
                .filter_map(|block| match block {
                    RawBlock::ToolResult { content, is_error } => Some(ToolResult {
                        content: content_text(&content),
                        is_error,
                    }),
                    _ => None,
                })
                .collect(),
        },
        RawEvent::Result { result, is_error } => StreamEvent::Result { text: result, is_error },
    }
}

/// Flattens tool-result content, which is either a string or a list of text parts.
fn content_text(content: &Value) -> String {
    match content {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(s) => Some(s.as_str()),
                Value::Object(obj) => obj.get("text").and_then(Value::as_str),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

/// Lazy event sequence over one subprocess's stdout.
///
/// Not restartable: once the underlying reader reports end of stream (or an
/// I/O error), every further call to [`EventStream::next_event`] yields `None`.
pub struct EventStream<R> {
    reader: R,
    buf: Vec<u8>,
    closed: bool,
    skipped: usize,
}

impl<R> EventStream<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            closed: false,
            skipped: 0,
        }
    }

    /// Blocks until the next recognized event, end of stream, or a read error.
    ///
    /// Safe to cancel: a partially read line stays buffered and the next call
    /// finishes it.
    pub async fn next_event(&mut self) -> io::Result<Option<StreamEvent>> {
        while !self.closed {
            let n = match self.reader.read_until(b'\n', &mut self.buf).await {
                Ok(n) => n,
                Err(err) => {
                    self.closed = true;
                    return Err(err);
                }
            };
            if n == 0 {
                self.closed = true;
            }

            let event = {
                let line = String::from_utf8_lossy(&self.buf);
                let line = line.trim();
                if line.is_empty() {
                    None
                } else {
                    match decode_line(line) {
                        StreamEvent::Unrecognized => {
                            self.skipped += 1;
                            tracing::trace!(line = %line, "skipping undecodable agent output");
                            None
                        }
                        event => Some(event),
                    }
                }
            };
            self.buf.clear();
            if event.is_some() {
                return Ok(event);
            }
        }
        Ok(None)
    }

    /// Number of non-blank lines dropped as undecodable so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_decode_assistant_blocks() {
        let line = r#"{"type":"assistant","message":{"content":[
            {"type":"text","text":"Let me check."},
            {"type":"tool_use","id":"t1","name":"Bash","input":{"command":"sqlite3 data/x.db 'SELECT 1'"}},
            {"type":"thinking","thinking":"hmm"}
        ]}}"#
            .replace('\n', "");
        match decode_line(&line) {
            StreamEvent::Assistant { blocks } => {
                assert_eq!(blocks.len(), 2);
                assert_eq!(blocks[0], AssistantBlock::Text("Let me check.".to_string()));
                match &blocks[1] {
                    AssistantBlock::ToolUse { name, input } => {
                        assert_eq!(name, "Bash");
                        assert!(input.contains_key("command"));
                    }
                    other => panic!("unexpected block: {:?}", other),
                }
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decode_tool_result_content_shapes() {
        let plain = r#"{"type":"user","message":{"content":[{"type":"tool_result","content":"42","is_error":false}]}}"#;
        let parts = r#"{"type":"user","message":{"content":[{"type":"tool_result","content":[{"type":"text","text":"a"},{"type":"text","text":"b"}],"is_error":true}]}}"#;

        assert_eq!(
            decode_line(plain),
            StreamEvent::User { results: vec![ToolResult { content: "42".to_string(), is_error: false }] }
        );
        assert_eq!(
            decode_line(parts),
            StreamEvent::User { results: vec![ToolResult { content: "a\nb".to_string(), is_error: true }] }
        );
    }

    #[test]
    fn test_decode_user_prompt_string_has_no_results() {
        let line = r#"{"type":"user","message":{"role":"user","content":"hello"}}"#;
        assert_eq!(decode_line(line), StreamEvent::User { results: Vec::new() });
    }

    #[test]
    fn test_decode_result() {
        let line = r#"{"type":"result","subtype":"success","result":"The total is 42.","is_error":false}"#;
        assert_eq!(
            decode_line(line),
            StreamEvent::Result { text: "The total is 42.".to_string(), is_error: false }
        );
    }

    #[test]
    fn test_decode_unrecognized() {
        assert_eq!(decode_line("not json at all"), StreamEvent::Unrecognized);
        assert_eq!(decode_line(r#"{"type":"system","subtype":"init"}"#), StreamEvent::Unrecognized);
        assert_eq!(decode_line(r#"{"no_type":true}"#), StreamEvent::Unrecognized);
        assert_eq!(decode_line("[1,2,3]"), StreamEvent::Unrecognized);
    }

    #[tokio::test]
    async fn test_event_stream_skips_noise_and_stays_closed() {
        let input = concat!(
            "\n",
            "warning: something on stdout\n",
            r#"{"type":"system","subtype":"init"}"#, "\n",
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"hi"}]}}"#, "\n",
            "   \n",
            r#"{"type":"result","result":"done"}"#,
        );
        let mut events = EventStream::new(input.as_bytes());

        assert!(matches!(events.next_event().await.unwrap(), Some(StreamEvent::Assistant { .. })));
        assert!(matches!(events.next_event().await.unwrap(), Some(StreamEvent::Result { .. })));
        assert_eq!(events.next_event().await.unwrap(), None);
        assert_eq!(events.skipped(), 2);

        // Re-reading after close yields nothing, not an error.
        assert_eq!(events.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cancelled_read_keeps_partial_line() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut events = EventStream::new(tokio::io::BufReader::new(rx));

        tx.write_all(br#"{"type":"result","#).await.unwrap();
        let pending = tokio::time::timeout(Duration::from_millis(50), events.next_event()).await;
        assert!(pending.is_err());

        tx.write_all(b"\"result\":\"42\"}\n").await.unwrap();
        assert_eq!(
            events.next_event().await.unwrap(),
            Some(StreamEvent::Result { text: "42".to_string(), is_error: false })
        );
    }

    #[tokio::test]
    async fn test_last_line_without_newline_is_decoded() {
        let input = concat!("garbage\n", r#"{"type":"result","result":"b"}"#);
        let mut events = EventStream::new(input.as_bytes());
        assert!(matches!(events.next_event().await.unwrap(), Some(StreamEvent::Result { .. })));
        assert_eq!(events.next_event().await.unwrap(), None);
        assert_eq!(events.skipped(), 1);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_skipped() {
        let mut bytes = vec![0xff, 0xfe, b'\n'];
        bytes.extend_from_slice(br#"{"type":"result","result":"ok"}"#);
        let mut events = EventStream::new(&bytes[..]);
        assert_eq!(
            events.next_event().await.unwrap(),
            Some(StreamEvent::Result { text: "ok".to_string(), is_error: false })
        );
    }
}
