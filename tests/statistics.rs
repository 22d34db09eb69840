mod common;

use std::fs;
use std::thread;

use common::{read_stats, run_hook, stats_file, write_config};

#[test]
fn counts_sequential_invocations() {
    let base = tempfile::tempdir().unwrap();
    let tools = ["Read", "Edit", "Read", "Bash", "Read", "TodoWrite"];
    for tool in tools {
        let input = format!(r#"{{"tool_name":"{tool}","session_id":"abc12345"}}"#);
        let (code, _, _) = run_hook(base.path(), &input);
        assert_eq!(code, 0);
    }

    let stats = read_stats(base.path());
    assert_eq!(stats["total_interactions"], tools.len());
    let per_tool: u64 = stats["tools_triggered"]
        .as_object()
        .unwrap()
        .values()
        .map(|v| v.as_u64().unwrap())
        .sum();
    assert_eq!(per_tool, tools.len() as u64);
    assert_eq!(stats["tools_triggered"]["Read"], 3);
    assert_eq!(stats["interactions_with_context"], 0);
}

#[test]
fn counts_context_fields() {
    let base = tempfile::tempdir().unwrap();
    run_hook(
        base.path(),
        r#"{"tool_name":"TodoWrite","recent_user_messages":["How do I view my logs?"]}"#,
    );
    run_hook(
        base.path(),
        r#"{"tool_name":"Read","prompt":"explain the build","query":"cargo"}"#,
    );
    run_hook(base.path(), r#"{"tool_name":"Read"}"#);

    let stats = read_stats(base.path());
    assert_eq!(stats["total_interactions"], 3);
    assert_eq!(stats["interactions_with_context"], 2);
    assert_eq!(
        stats["context_fields_found"],
        serde_json::json!({ "recent_user_messages": 1, "prompt": 1, "query": 1 })
    );
}

#[test]
fn recovers_from_corrupt_document() {
    let base = tempfile::tempdir().unwrap();
    let path = stats_file(base.path());
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, b"\xde\xad\xbe\xef not json {{").unwrap();

    let (code, _, _) = run_hook(base.path(), r#"{"tool_name":"Grep","session_id":"s"}"#);

    assert_eq!(code, 0);
    assert_eq!(
        read_stats(base.path()),
        serde_json::json!({
            "total_interactions": 1,
            "tools_triggered": { "Grep": 1 },
            "interactions_with_context": 0,
            "context_fields_found": {}
        })
    );
}

#[test]
fn disabled_statistics_leave_document_untouched() {
    let base = tempfile::tempdir().unwrap();
    write_config(base.path(), "enable_statistics = false\n");
    let path = stats_file(base.path());
    fs::write(&path, "{\"total_interactions\": 7}").unwrap();

    run_hook(base.path(), r#"{"tool_name":"Read"}"#);

    assert_eq!(fs::read_to_string(&path).unwrap(), "{\"total_interactions\": 7}");
}

#[test]
fn concurrent_invocations_are_all_counted() {
    let base = tempfile::tempdir().unwrap();
    // Generous lock timeout so a slow machine doesn't skip updates.
    write_config(base.path(), "stats_lock_timeout_ms = 10000\n");
    let base_path = base.path().to_path_buf();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let base = base_path.clone();
            thread::spawn(move || {
                let input = format!(r#"{{"tool_name":"Read","session_id":"sess-{i}"}}"#);
                run_hook(&base, &input).0
            })
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), 0);
    }

    let stats = read_stats(base.path());
    assert_eq!(stats["total_interactions"], 8);
    assert_eq!(stats["tools_triggered"]["Read"], 8);
    assert!(!base.path().join("hooks/user-input-stats.json.lock").exists());
    assert_eq!(common::primary_lines(base.path()).len(), 8);
}
