use crate::config::Config;
use crate::transcript::Transcript;
use crate::types::Context;

/// Prefixes of user-side text that the host generated rather than the
/// human: slash-command echoes, shell passthrough output, interrupts and
/// hook feedback.
pub const NOISE_PREFIXES: &[&str] = &[
    "<command-",
    "<local-command-",
    "<bash-",
    "<system-reminder>",
    "Stop hook feedback",
    "[Request interrupted",
    "Caveat:",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of messages returned.
    pub max_messages: usize,
    /// Minimum message length in characters.
    pub min_length: usize,
}

impl From<&Config> for Limits {
    fn from(config: &Config) -> Self {
        Self {
            max_messages: config.max_messages_per_capture,
            min_length: config.min_message_length,
        }
    }
}

/// Where a batch of extracted messages came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// The host's message list in the event context.
    Context,
    /// A scan of the transcript tail.
    Transcript,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub messages: Vec<String>,
    pub source: Source,
}

/// Whether `text` (already trimmed) looks like host output rather than
/// something the user typed.
pub fn is_noise(text: &str) -> bool {
    NOISE_PREFIXES.iter().any(|p| text.starts_with(p))
}

/// Trim `text` and keep it if it passes the noise and length filters.
pub fn accept(text: &str, min_length: usize) -> Option<String> {
    let text = text.trim();
    if is_noise(text) || text.chars().count() < min_length {
        return None;
    }
    Some(text.to_string())
}

/// Collect the user's recent messages, oldest first.
///
/// A message list in the event context is authoritative when present: it
/// is filtered and capped, and the transcript is not consulted even if
/// nothing survives the filter. Otherwise the transcript is scanned from
/// the newest entry backwards until the cap is reached.
pub fn extract_messages(transcript: &Transcript, context: &Context, limits: Limits) -> Extracted {
    match context.message_list() {
        Some(list) => Extracted {
            messages: from_list(&list, limits),
            source: Source::Context,
        },
        None => Extracted {
            messages: from_transcript(transcript, limits),
            source: Source::Transcript,
        },
    }
}

fn from_list(list: &[&str], limits: Limits) -> Vec<String> {
    let mut kept: Vec<String> = list
        .iter()
        .filter_map(|m| accept(m, limits.min_length))
        .collect();
    // Keep the most recent ones.
    let skip = kept.len().saturating_sub(limits.max_messages);
    kept.drain(..skip);
    kept
}

fn from_transcript(transcript: &Transcript, limits: Limits) -> Vec<String> {
    let mut newest_first: Vec<String> = transcript
        .entries()
        .iter()
        .rev()
        .filter_map(|e| e.as_user())
        .filter(|u| !u.is_meta())
        .filter_map(|u| u.text())
        .filter_map(|t| accept(&t, limits.min_length))
        .take(limits.max_messages)
        .collect();
    newest_first.reverse();
    newest_first
}
