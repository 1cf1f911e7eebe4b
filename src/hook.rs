//! Hook client subcommand
//!
//! Reads one Claude Code hook JSON document from stdin, converts it to the
//! wire `HookEvent`, and sends it to the daemon socket. For a permission
//! request this blocks until the daemon relays the human decision, which is
//! then printed as hook output so the assistant process can act on it.
//!
//! # Claude Code hooks config:
//! ```json
//! { "type": "command", "command": "islet hook" }
//! ```

use crate::{HookEvent, ipc};
use serde_json::Value;
use std::io::Read;

/// Entry point for `islet hook`.
pub fn run(source: Option<&str>) {
    let mut input = String::new();
    if std::io::stdin().read_to_string(&mut input).is_err() {
        return;
    }

    let hook: Value = match serde_json::from_str(&input) {
        Ok(v) => v,
        Err(_) => return,
    };

    let event_name = hook
        .get("hook_event_name")
        .and_then(|v| v.as_str())
        .map(String::from)
        .or_else(|| std::env::var("CLAUDE_HOOK_EVENT").ok());
    let Some(event_name) = event_name else {
        println!("{{}}");
        return;
    };

    let source = source
        .map(str::to_string)
        .or_else(|| std::env::var("ISLET_SOURCE").ok())
        .unwrap_or_else(|| "claude".to_string());

    let Some(mut event) = build_event(&hook, &event_name, &source) else {
        println!("{{}}");
        return;
    };
    event.pid = Some(std::os::unix::process::parent_id() as i32);

    let path = crate::config::load_config().resolve_socket_path();
    match ipc::send_event(&path, &event) {
        Ok(Some(response)) => {
            // Hook output: the decision for the blocked tool call.
            match serde_json::to_string(&response) {
                Ok(json) => println!("{json}"),
                Err(_) => println!("{{}}"),
            }
        }
        Ok(None) => println!("{{}}"),
        Err(e) => {
            eprintln!("daemon not running ({}): {}", path.display(), e);
            println!("{{}}");
        }
    }
}

/// Derive the wire status for a Claude Code hook event name.
fn status_for(event_name: &str) -> &'static str {
    match event_name {
        "PermissionRequest" => "waiting_for_approval",
        "PreToolUse" => "running_tool",
        "PostToolUse" | "UserPromptSubmit" => "processing",
        "Stop" => "waiting_for_input",
        "SessionStart" => "starting",
        "PreCompact" => "compacting",
        "Notification" => "notification",
        _ => "idle",
    }
}

/// Convert a Claude Code hook document into the wire event.
///
/// Claude Code hooks deliver JSON via stdin with a `hook_event_name` field.
/// See: https://docs.anthropic.com/en/docs/claude-code/hooks
fn build_event(hook: &Value, event_name: &str, source: &str) -> Option<HookEvent> {
    let session_id = hook
        .get("session_id")
        .and_then(|v| v.as_str())
        .map(String::from)
        .or_else(|| std::env::var("CLAUDE_SESSION_ID").ok())?;

    let cwd = hook
        .get("cwd")
        .and_then(|v| v.as_str())
        .map(String::from)
        .or_else(|| {
            std::env::current_dir()
                .ok()
                .map(|p| p.to_string_lossy().into_owned())
        })
        .unwrap_or_default();

    let carries_tool = matches!(event_name, "PermissionRequest" | "PreToolUse" | "PostToolUse");
    let carries_input = matches!(event_name, "PermissionRequest" | "PreToolUse");
    let is_notification = event_name == "Notification";

    Some(HookEvent {
        session_id,
        cwd,
        event: event_name.to_string(),
        status: status_for(event_name).to_string(),
        source: Some(source.to_string()),
        pid: None,
        tty: None,
        tool: carries_tool
            .then(|| hook.get("tool_name").and_then(|v| v.as_str()).map(String::from))
            .flatten(),
        tool_input: carries_input
            .then(|| hook.get("tool_input").and_then(|v| v.as_object()).cloned())
            .flatten(),
        tool_use_id: carries_tool
            .then(|| {
                hook.get("tool_use_id")
                    .and_then(|v| v.as_str())
                    .map(String::from)
            })
            .flatten(),
        notification_type: is_notification
            .then(|| hook.get("type").and_then(|v| v.as_str()).map(String::from))
            .flatten(),
        message: is_notification
            .then(|| hook.get("message").and_then(|v| v.as_str()).map(String::from))
            .flatten(),
    })
}
