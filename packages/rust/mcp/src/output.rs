//! Raw tool invocation output.
//!
//! The manager never interprets tool-specific payloads; it hands callers the
//! content sequence as returned by the collaborator.

use serde_json::Value;

/// One element of a tool result's content sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputPart {
    /// A plain text part.
    Text(String),
    /// Any non-text part, passed through unparsed.
    Value(Value),
}

/// The payload of one tool invocation, in wire order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    /// Content parts as returned by the collaborator.
    pub parts: Vec<OutputPart>,
}

impl ToolOutput {
    /// Build an output holding a single text part.
    pub fn text(s: impl Into<String>) -> Self {
        Self {
            parts: vec![OutputPart::Text(s.into())],
        }
    }

    /// The first text part, when one exists. Most collaborators put their
    /// JSON-encoded reply there.
    pub fn first_text(&self) -> Option<&str> {
        self.parts.iter().find_map(|p| match p {
            OutputPart::Text(s) => Some(s.as_str()),
            OutputPart::Value(_) => None,
        })
    }

    /// All text parts joined by newlines; non-text parts rendered as JSON.
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .map(|p| match p {
                OutputPart::Text(s) => s.clone(),
                OutputPart::Value(v) => v.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Extract the content sequence from a serialized call result.
    pub fn from_result_value(value: &Value) -> Self {
        let mut parts = Vec::new();
        if let Some(content) = value.get("content").and_then(|v| v.as_array()) {
            for item in content {
                let item_type = item.get("type").and_then(|v| v.as_str()).unwrap_or("");
                if item_type == "text" {
                    if let Some(text) = item.get("text").and_then(|v| v.as_str()) {
                        parts.push(OutputPart::Text(text.to_string()));
                        continue;
                    }
                }
                parts.push(OutputPart::Value(item.clone()));
            }
        }
        Self { parts }
    }
}

/// Whether a serialized call result carries the tool-reported error flag.
pub fn result_is_error(value: &Value) -> bool {
    value
        .get("is_error")
        .or_else(|| value.get("isError"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}
