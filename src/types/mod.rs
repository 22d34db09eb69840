use serde::Deserialize;
use serde_json::{Map, Value};

/// Placeholder for a tool name or session id the host didn't send.
pub const UNKNOWN: &str = "unknown";

/// Context field in which the host hands over already-isolated user messages.
pub const MESSAGE_LIST_FIELD: &str = "recent_user_messages";

/// Context fields that may carry user intent, in the order they are reported.
pub const CONTEXT_FIELDS: &[&str] = &[
    "user_message",
    "message",
    "prompt",
    "input",
    "context",
    "user_input",
    "query",
    "request",
    "content",
    "text",
    "user_context",
    "conversation_context",
];

// ===================================================================
// Hook event (received via stdin, snake_case JSON)
// ===================================================================

/// One tool-use event delivered to the hook on stdin.
///
/// Only the fields the logger needs are typed; everything else the host
/// sends is kept in `extra` and surfaced through [`HookEvent::context`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookEvent {
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub transcript_path: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HookEvent {
    pub fn tool_name(&self) -> &str {
        non_empty(self.tool_name.as_deref()).unwrap_or(UNKNOWN)
    }

    pub fn session_id(&self) -> &str {
        non_empty(self.session_id.as_deref()).unwrap_or(UNKNOWN)
    }

    /// The transcript path, if the host sent a non-blank one.
    pub fn transcript_path(&self) -> Option<&str> {
        non_empty(self.transcript_path.as_deref())
    }

    /// Build the free-form context mapping for this event.
    pub fn context(&self) -> Context {
        Context::from_fields(&self.extra)
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

// ===================================================================
// Context: schema-less view over the event's extra fields
// ===================================================================

/// Arbitrary key/value context attached to an event.
///
/// Upstream event shapes grow new fields over time, so this is a plain JSON
/// map with lookups for the fields the logger recognizes. A nested
/// `context` object is lifted into the top level; top-level keys win on
/// collision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    fields: Map<String, Value>,
}

impl Context {
    pub fn from_fields(extra: &Map<String, Value>) -> Self {
        let mut fields = extra.clone();
        if let Some(Value::Object(nested)) = extra.get("context") {
            fields.remove("context");
            for (key, value) in nested {
                if !fields.contains_key(key) {
                    fields.insert(key.clone(), value.clone());
                }
            }
        }
        Self { fields }
    }

    /// The string entries of the message-list field. Returns `None` when the
    /// field is absent, isn't an array, or holds no strings at all.
    pub fn message_list(&self) -> Option<Vec<&str>> {
        let items = self.fields.get(MESSAGE_LIST_FIELD)?.as_array()?;
        let messages: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
        if messages.is_empty() {
            None
        } else {
            Some(messages)
        }
    }

    /// Recognized context fields that are present, in reporting order.
    /// Null values and blank strings are treated as absent.
    pub fn recognized(&self) -> impl Iterator<Item = (&'static str, &Value)> + '_ {
        CONTEXT_FIELDS.iter().filter_map(|&name| {
            let value = self.fields.get(name)?;
            match value {
                Value::Null => None,
                Value::String(s) if s.trim().is_empty() => None,
                _ => Some((name, value)),
            }
        })
    }
}
