use serde_json::Value;

use crate::types::{Context, MESSAGE_LIST_FIELD};

/// Longest rendering of a single context field value before it is cut.
pub const VALUE_PREVIEW_CHARS: usize = 200;

const FIELD_SEPARATOR: &str = " | ";

/// The context segment of a log line, plus the fields that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormattedContext {
    pub text: String,
    pub fields: Vec<String>,
}

impl FormattedContext {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Render extracted messages, or failing that the recognized context
/// fields, as one line of text.
///
/// Messages render as `recent_user_messages: ["a", "b"]` with JSON string
/// quoting; fields render as `name: value` pairs joined by ` | `. With
/// neither, the result is empty.
pub fn format_context(messages: &[String], context: &Context) -> FormattedContext {
    if !messages.is_empty() {
        let quoted: Vec<String> = messages
            .iter()
            .map(|m| Value::String(m.clone()).to_string())
            .collect();
        return FormattedContext {
            text: format!("{MESSAGE_LIST_FIELD}: [{}]", quoted.join(", ")),
            fields: vec![MESSAGE_LIST_FIELD.to_string()],
        };
    }

    let mut pairs = Vec::new();
    let mut fields = Vec::new();
    for (name, value) in context.recognized() {
        pairs.push(format!("{name}: {}", preview(&render_value(value))));
        fields.push(name.to_string());
    }
    FormattedContext {
        text: pairs.join(FIELD_SEPARATOR),
        fields,
    }
}

/// Escape line breaks so `s` can't split a log line.
pub fn single_line(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => single_line(s),
        // Compact JSON never contains raw newlines.
        other => other.to_string(),
    }
}

fn preview(s: &str) -> String {
    match s.char_indices().nth(VALUE_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HookEvent;
    use serde_json::json;

    fn context(value: Value) -> Context {
        serde_json::from_value::<HookEvent>(value).unwrap().context()
    }

    #[test]
    fn messages_render_as_quoted_list() {
        let messages = vec!["How do I view my logs?".to_string()];
        let out = format_context(&messages, &Context::default());
        assert_eq!(out.text, r#"recent_user_messages: ["How do I view my logs?"]"#);
        assert_eq!(out.fields, vec!["recent_user_messages"]);
    }

    #[test]
    fn multiple_messages_are_comma_separated_and_escaped() {
        let messages = vec![
            "first line\nsecond line".to_string(),
            "say \"hi\" please".to_string(),
        ];
        let out = format_context(&messages, &Context::default());
        assert_eq!(
            out.text,
            r#"recent_user_messages: ["first line\nsecond line", "say \"hi\" please"]"#
        );
        assert!(!out.text.contains('\n'));
    }

    #[test]
    fn messages_win_over_other_fields() {
        let ctx = context(json!({ "prompt": "ignored when messages exist" }));
        let out = format_context(&["a captured message".to_string()], &ctx);
        assert!(!out.text.contains("prompt"));
        assert_eq!(out.fields, vec!["recent_user_messages"]);
    }

    #[test]
    fn falls_back_to_recognized_fields() {
        let ctx = context(json!({
            "prompt": "fix the flaky test",
            "query": { "q": "logs", "n": 2 },
            "tool_input": { "file_path": "/tmp/x" }
        }));
        let out = format_context(&[], &ctx);
        assert_eq!(
            out.text,
            r#"prompt: fix the flaky test | query: {"n":2,"q":"logs"}"#
        );
        assert_eq!(out.fields, vec!["prompt", "query"]);
    }

    #[test]
    fn field_values_are_single_line_and_truncated() {
        let long = "a".repeat(VALUE_PREVIEW_CHARS + 50);
        let ctx = context(json!({ "message": "two\r\nlines", "text": long }));
        let out = format_context(&[], &ctx);
        let expected = format!(
            "message: two\\r\\nlines | text: {}...",
            "a".repeat(VALUE_PREVIEW_CHARS)
        );
        assert_eq!(out.text, expected);
    }

    #[test]
    fn value_at_exact_limit_is_not_truncated() {
        let exact = "é".repeat(VALUE_PREVIEW_CHARS);
        let ctx = context(json!({ "text": exact.clone() }));
        assert_eq!(format_context(&[], &ctx).text, format!("text: {exact}"));
    }

    #[test]
    fn nothing_to_report_is_empty() {
        let ctx = context(json!({ "tool_input": { "command": "ls" } }));
        let out = format_context(&[], &ctx);
        assert!(out.is_empty());
        assert!(out.fields.is_empty());
    }
}
