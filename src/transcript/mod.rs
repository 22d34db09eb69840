use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Bytes read per backwards step when tailing a transcript.
const TAIL_CHUNK: u64 = 8 * 1024;

// ===================================================================
// Top-level transcript entry: one per JSONL line
// ===================================================================

/// A single line in a Claude Code `.jsonl` transcript file.
///
/// Discriminated by the `type` field. Only user entries are typed;
/// assistant, progress, snapshot and system entries collapse into `Other`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum TranscriptEntry {
    #[serde(rename = "user")]
    User(ConversationEntry),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    /// Set on entries the host injects on the user's behalf.
    #[serde(default)]
    pub is_meta: Option<bool>,
    pub message: Message,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub content: MessageContent,
}

/// `message.content` can be a plain string (user text) or an array of
/// content blocks (assistant responses, tool results).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One element of an array-valued `message.content`. Older transcripts
/// occasionally carry bare strings here.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ContentPart {
    Block(ContentBlock),
    Bare(String),
}

/// Only text blocks matter here; tool use, tool results, thinking and
/// images all land in `Other`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

impl TranscriptEntry {
    /// The entry, if it was authored on the user side of the conversation.
    pub fn as_user(&self) -> Option<&ConversationEntry> {
        match self {
            Self::User(e) => Some(e),
            _ => None,
        }
    }
}

impl ConversationEntry {
    pub fn is_meta(&self) -> bool {
        self.is_meta.unwrap_or(false)
    }

    /// Best-effort plain text of the message.
    ///
    /// String content is returned as-is. For block arrays the text blocks
    /// (and bare strings) are joined with a space; arrays with no text at
    /// all, such as tool results, yield `None`.
    pub fn text(&self) -> Option<String> {
        match &self.message.content {
            MessageContent::Text(t) => Some(t.clone()),
            MessageContent::Parts(parts) => {
                let texts: Vec<&str> = parts
                    .iter()
                    .filter_map(|p| match p {
                        ContentPart::Block(ContentBlock::Text { text }) => Some(text.as_str()),
                        ContentPart::Bare(s) => Some(s.as_str()),
                        ContentPart::Block(_) => None,
                    })
                    .collect();
                if texts.is_empty() {
                    None
                } else {
                    Some(texts.join(" "))
                }
            }
        }
    }
}

// ===================================================================
// Transcript: the trailing window of a JSONL file, parsed
// ===================================================================

/// The most recent entries of a transcript, oldest first.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    /// An empty transcript (no entries).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse JSONL lines. Returns the transcript and any lines that failed
    /// to parse (with 1-based line number and error). Blank lines are
    /// skipped.
    pub fn parse<'a, I>(lines: I) -> (Self, Vec<(usize, String)>)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut entries = Vec::new();
        let mut errors = Vec::new();

        for (i, line) in lines.into_iter().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<TranscriptEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => errors.push((i + 1, format!("{e}"))),
            }
        }

        (Self { entries }, errors)
    }

    /// Read and parse the last `max_lines` lines of the transcript at `path`.
    /// A missing file is an empty transcript; other I/O failures are errors.
    pub fn read_tail(path: &Path, max_lines: usize) -> Result<Self> {
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::empty()),
            Err(e) => {
                return Err(e).with_context(|| format!("opening transcript {}", path.display()));
            }
        };
        let lines = tail_lines(&mut file, max_lines)
            .with_context(|| format!("reading transcript {}", path.display()))?;
        let (transcript, errors) = Transcript::parse(lines.iter().map(String::as_str));
        for (line, err) in &errors {
            tracing::debug!("skipping transcript line {line} of tail window: {err}");
        }
        Ok(transcript)
    }

    /// Like [`Transcript::read_tail`], but any failure is logged and treated
    /// as an empty transcript.
    pub fn load(path: &str, max_lines: usize) -> Self {
        Self::read_tail(Path::new(path), max_lines).unwrap_or_else(|err| {
            tracing::debug!("ignoring unreadable transcript: {err:#}");
            Self::empty()
        })
    }

    /// All typed entries in file order.
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }
}

/// Return the last `max_lines` lines of `reader` without reading the whole
/// stream: chunks are read backwards from the end until enough newlines
/// have been seen.
pub fn tail_lines<R: Read + Seek>(reader: &mut R, max_lines: usize) -> io::Result<Vec<String>> {
    if max_lines == 0 {
        return Ok(Vec::new());
    }

    let len = reader.seek(SeekFrom::End(0))?;
    let mut pos = len;
    let mut buf: Vec<u8> = Vec::new();

    while pos > 0 && complete_lines(&buf) < max_lines {
        let step = TAIL_CHUNK.min(pos);
        pos -= step;
        reader.seek(SeekFrom::Start(pos))?;
        let mut chunk = vec![0u8; step as usize];
        reader.read_exact(&mut chunk)?;
        chunk.extend_from_slice(&buf);
        buf = chunk;
    }

    let text = String::from_utf8_lossy(&buf);
    let mut lines: Vec<&str> = text.lines().collect();
    // The first line is cut off unless we reached the start of the file.
    if pos > 0 && !lines.is_empty() {
        lines.remove(0);
    }
    let skip = lines.len().saturating_sub(max_lines);
    Ok(lines[skip..].iter().map(|l| l.to_string()).collect())
}

/// Newlines in `buf` that terminate a line with at least one more line
/// after it (a trailing newline at the very end doesn't count).
fn complete_lines(buf: &[u8]) -> usize {
    let body = buf.strip_suffix(b"\n").unwrap_or(buf);
    body.iter().filter(|&&b| b == b'\n').count()
}
