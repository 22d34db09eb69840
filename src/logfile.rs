use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use minijinja::{Environment, context};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::format::single_line;

/// Default log line. The context segment, separator included, disappears
/// when there is no context.
pub const DEFAULT_LINE_TEMPLATE: &str = "[{{ timestamp }}] [{{ session }}] Tool: {{ tool }}\
{% if context %} | User Context: {{ context }}{% endif %}";

/// Characters of the session id kept in each line.
pub const SESSION_PREFIX_CHARS: usize = 8;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The values that make up one log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine<'a> {
    pub timestamp: String,
    pub session: String,
    pub tool: &'a str,
    pub context: &'a str,
}

impl<'a> LogLine<'a> {
    pub fn new(now: &DateTime<Local>, session_id: &str, tool: &'a str, context: &'a str) -> Self {
        Self {
            timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
            session: short_session(session_id),
            tool,
            context,
        }
    }

    /// Render through a Jinja2 template. The result is always one line.
    pub fn render(&self, template: &str) -> Result<String> {
        let env = Environment::new();
        let tmpl = env
            .template_from_str(template)
            .context("parsing log line template")?;
        let rendered = tmpl
            .render(context! {
                timestamp => self.timestamp,
                session => self.session,
                tool => self.tool,
                context => self.context,
            })
            .context("rendering log line template")?;
        Ok(single_line(&rendered))
    }

    /// Render through `template`, falling back to the default template if
    /// the custom one is broken.
    pub fn render_or_default(&self, template: &str) -> Result<String> {
        match self.render(template) {
            Ok(line) => Ok(line),
            Err(err) if template != DEFAULT_LINE_TEMPLATE => {
                tracing::warn!("falling back to the default line template: {err:#}");
                self.render(DEFAULT_LINE_TEMPLATE)
            }
            Err(err) => Err(err),
        }
    }
}

/// The first few characters of a session id.
pub fn short_session(session_id: &str) -> String {
    session_id.chars().take(SESSION_PREFIX_CHARS).collect()
}

/// Append `line` plus a newline to `path`, creating the file and its parent
/// directories as needed. The line goes out in a single write on a handle
/// opened in append mode and closed before returning.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut record = String::with_capacity(line.len() + 1);
    record.push_str(line);
    record.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    file.write_all(record.as_bytes())
        .with_context(|| format!("appending to {}", path.display()))?;
    file.flush()
        .with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}
