use std::io::Write;

use serde_json::{Map, Value};

use crate::stream::{AssistantBlock, StreamEvent, ToolResult};

pub(crate) const GRAY: &str = "\x1b[90m";
pub(crate) const RED: &str = "\x1b[91m";
pub(crate) const RESET: &str = "\x1b[0m";

const ARG_PREVIEW_CHARS: usize = 200;
const RESULT_LINE_CHARS: usize = 100;
const RESULT_PREVIEW_LINES: usize = 5;

/// Receives each decoded event as soon as it is read.
///
/// Observers are side channels only; they cannot influence how the run
/// proceeds or which answer is extracted.
pub trait EventObserver {
    fn on_event(&mut self, event: &StreamEvent);
}

pub struct NullObserver;

impl EventObserver for NullObserver {
    fn on_event(&mut self, _event: &StreamEvent) {}
}

/// Prints a live, human-readable trace of the agent's work.
pub struct ProgressRenderer<W: Write> {
    out: W,
}

impl<W: Write> ProgressRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn render_tool_use(&mut self, name: &str, input: &Map<String, Value>) {
        let _ = writeln!(self.out, "\n{GRAY}┌─ {name}{RESET}");
        if let Some(arg) = primary_argument(input) {
            let _ = writeln!(self.out, "{GRAY}│ {}{RESET}", preview(&arg.replace('\n', " "), ARG_PREVIEW_CHARS));
        }
    }

    fn render_tool_result(&mut self, result: &ToolResult) {
        let color = if result.is_error { RED } else { GRAY };
        let mut lines = result.content.lines().filter(|l| !l.trim().is_empty());

        for (i, line) in lines.by_ref().take(RESULT_PREVIEW_LINES).enumerate() {
            let prefix = if result.is_error && i == 0 { "Error: " } else { "" };
            let _ = writeln!(self.out, "{color}│ {prefix}{}{RESET}", preview(line, RESULT_LINE_CHARS));
        }
        if lines.next().is_some() {
            let _ = writeln!(self.out, "{color}│ ...{RESET}");
        }
        let _ = writeln!(self.out, "{GRAY}└─{RESET}");
    }
}

impl<W: Write> EventObserver for ProgressRenderer<W> {
    fn on_event(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Assistant { blocks } => {
                for block in blocks {
                    match block {
                        AssistantBlock::Text(text) => {
                            let _ = write!(self.out, "{text}");
                        }
                        AssistantBlock::ToolUse { name, input } => self.render_tool_use(name, input),
                    }
                }
            }
            StreamEvent::User { results } => {
                for result in results {
                    self.render_tool_result(result);
                }
            }
            StreamEvent::Result { .. } | StreamEvent::Unrecognized => {}
        }
        let _ = self.out.flush();
    }
}

/// The shell command if there is one, otherwise the query text.
fn primary_argument(input: &Map<String, Value>) -> Option<String> {
    ["command", "query"].iter().find_map(|key| {
        input.get(*key).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    })
}

/// Cuts `s` to `max_chars` characters, appending `...` when anything was dropped.
pub fn preview(s: &str, max_chars: usize) -> String {
    let mut chars = s.chars();
    let mut out: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(event: &StreamEvent) -> String {
        let mut renderer = ProgressRenderer::new(Vec::<u8>::new());
        renderer.on_event(event);
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    fn tool_use(input: Value) -> StreamEvent {
        StreamEvent::Assistant {
            blocks: vec![AssistantBlock::ToolUse {
                name: "Bash".to_string(),
                input: input.as_object().cloned().unwrap_or_default(),
            }],
        }
    }

    #[test]
    fn test_text_is_streamed_unterminated() {
        let out = render(&StreamEvent::Assistant {
            blocks: vec![AssistantBlock::Text("Counting rows".to_string())],
        });
        assert_eq!(out, "Counting rows");
    }

    #[test]
    fn test_tool_use_prefers_command_over_query() {
        let out = render(&tool_use(json!({"command": "sqlite3 db 'SELECT 1'", "query": "SELECT 2"})));
        assert!(out.contains("┌─ Bash"));
        assert!(out.contains("│ sqlite3 db 'SELECT 1'"));
        assert!(!out.contains("SELECT 2"));

        let out = render(&tool_use(json!({"query": "SELECT 2"})));
        assert!(out.contains("│ SELECT 2"));
    }

    #[test]
    fn test_tool_use_preview_truncated() {
        let long = "x".repeat(250);
        let out = render(&tool_use(json!({ "command": long })));
        assert!(out.contains(&format!("│ {}...", "x".repeat(200))));
        assert!(!out.contains(&"x".repeat(201)));
    }

    #[test]
    fn test_tool_use_without_known_argument_prints_header_only() {
        let out = render(&tool_use(json!({"file_path": "/tmp/a"})));
        assert!(out.contains("┌─ Bash"));
        assert!(!out.contains("│"));
    }

    #[test]
    fn test_tool_result_preview_and_elision() {
        let content = (1..=8).map(|i| format!("row {i}")).collect::<Vec<_>>().join("\n\n");
        let out = render(&StreamEvent::User {
            results: vec![ToolResult { content, is_error: false }],
        });
        assert!(out.contains("│ row 1"));
        assert!(out.contains("│ row 5"));
        assert!(!out.contains("row 6"));
        assert!(out.contains("│ ..."));
        assert!(out.contains("└─"));
        assert!(!out.contains(RED));
    }

    #[test]
    fn test_tool_result_short_has_no_elision() {
        let out = render(&StreamEvent::User {
            results: vec![ToolResult { content: "42".to_string(), is_error: false }],
        });
        assert!(out.contains("│ 42"));
        assert!(!out.contains("..."));
    }

    #[test]
    fn test_tool_result_error_style() {
        let out = render(&StreamEvent::User {
            results: vec![ToolResult { content: "no such table: deals".to_string(), is_error: true }],
        });
        assert!(out.contains(&format!("{RED}│ Error: no such table: deals")));
    }

    #[test]
    fn test_result_lines_truncated() {
        let out = render(&StreamEvent::User {
            results: vec![ToolResult { content: "y".repeat(150), is_error: false }],
        });
        assert!(out.contains(&format!("{}...", "y".repeat(100))));
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("abc", 3), "abc");
        assert_eq!(preview("abcd", 3), "abc...");
        assert_eq!(preview("ééé", 2), "éé...");
    }
}
