#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Run the hook with `base` as its data directory, feeding `stdin_json`.
/// Returns (exit code, stdout, stderr).
pub fn run_hook(base: &Path, stdin_json: &str) -> (i32, String, String) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_user-input-logger"))
        .env("USER_INPUT_LOGGER_DIR", base)
        .env_remove("USER_INPUT_LOGGER_CONFIG")
        .env_remove("USER_INPUT_LOGGER_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn binary");

    child
        .stdin
        .as_mut()
        .unwrap()
        .write_all(stdin_json.as_bytes())
        .unwrap();

    let output = child.wait_with_output().unwrap();
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

pub fn primary_log(base: &Path) -> PathBuf {
    base.join("user-inputs-log.txt")
}

pub fn stats_file(base: &Path) -> PathBuf {
    base.join("hooks").join("user-input-stats.json")
}

/// Lines of the primary log, or none if it doesn't exist yet.
pub fn primary_lines(base: &Path) -> Vec<String> {
    fs::read_to_string(primary_log(base))
        .map(|s| s.lines().map(String::from).collect())
        .unwrap_or_default()
}

pub fn read_stats(base: &Path) -> serde_json::Value {
    let raw = fs::read_to_string(stats_file(base)).unwrap();
    serde_json::from_str(&raw).unwrap()
}

/// Write `hooks/user-input-logger.toml` under `base`.
pub fn write_config(base: &Path, toml: &str) {
    let hooks = base.join("hooks");
    fs::create_dir_all(&hooks).unwrap();
    fs::write(hooks.join("user-input-logger.toml"), toml).unwrap();
}

/// One user entry in Claude Code transcript format.
pub fn user_entry(text: &str) -> String {
    serde_json::json!({
        "type": "user",
        "uuid": uuid::Uuid::new_v4().to_string(),
        "isSidechain": false,
        "userType": "external",
        "message": { "role": "user", "content": text }
    })
    .to_string()
}

/// Strip the `[timestamp] ` prefix from a log line.
pub fn without_timestamp(line: &str) -> &str {
    let end = line.find("] ").expect("line has a timestamp");
    &line[end + 2..]
}
