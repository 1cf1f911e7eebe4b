//! IPC utilities for Unix socket communication
//!
//! The hook subcommand and the daemon both live in this binary, so the wire
//! `HookEvent` (from `event.rs`) is sent directly on the socket as a single
//! JSON document per connection. This module provides the shared socket path
//! and the client-side send helper.

use crate::{HookEvent, HookResponse};
use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::Path;

/// Default socket path for the daemon.
pub fn socket_path() -> std::path::PathBuf {
    std::env::temp_dir().join("islet.sock")
}

/// Send one event to the daemon. For an event that expects a response, blocks
/// until the daemon writes its decision and closes the connection, and
/// returns the decoded response.
pub fn send_event(path: &Path, event: &HookEvent) -> io::Result<Option<HookResponse>> {
    let mut stream = UnixStream::connect(path)?;
    let payload = serde_json::to_vec(event)?;
    stream.write_all(&payload)?;
    // Signal end-of-document; there is no length framing on this protocol.
    stream.shutdown(Shutdown::Write)?;

    if !event.expects_response() {
        return Ok(None);
    }

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf)?;
    if buf.is_empty() {
        return Ok(None);
    }
    let response: HookResponse = serde_json::from_slice(&buf)?;
    Ok(Some(response))
}

#[cfg(test)]
mod tests {
    use crate::{Decision, HookEvent, HookResponse};

    #[test]
    fn socket_path_has_expected_name() {
        assert!(super::socket_path().ends_with("islet.sock"));
    }

    #[test]
    fn hook_event_wire_roundtrip() {
        let event: HookEvent = serde_json::from_str(
            r#"{"session_id":"s1","cwd":"/p","event":"PreToolUse","status":"running_tool","tool":"Bash","tool_input":{"command":"ls"},"tool_use_id":"tu1"}"#,
        )
        .unwrap();

        let json = serde_json::to_string(&event).unwrap();
        let parsed: HookEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn wire_examples_all_parse() {
        let messages = [
            r#"{"session_id":"s1","cwd":"/p","event":"SessionStart","status":"starting"}"#,
            r#"{"session_id":"s1","cwd":"/p","event":"PreToolUse","status":"running_tool","tool":"Bash","tool_input":{"cmd":"ls"},"tool_use_id":"tu1"}"#,
            r#"{"session_id":"s1","cwd":"/p","event":"PostToolUse","status":"processing","tool":"Bash","tool_use_id":"tu1"}"#,
            r#"{"session_id":"s1","cwd":"/p","event":"PermissionRequest","status":"waiting_for_approval","tool":"Bash"}"#,
            r#"{"session_id":"s1","cwd":"/p","event":"Notification","status":"notification","notification_type":"idle_prompt","message":"ready"}"#,
            r#"{"session_id":"s1","cwd":"/p","event":"PreCompact","status":"compacting"}"#,
            r#"{"session_id":"s1","event":"SessionStop","status":"idle"}"#,
            r#"{"session_id":"s1","event":"SessionEnd","status":"idle"}"#,
        ];

        for json in messages {
            let event: HookEvent = serde_json::from_str(json).unwrap();
            assert_eq!(event.session_id, "s1");
        }
    }

    #[test]
    fn response_wire_roundtrip() {
        let response: HookResponse =
            serde_json::from_str(r#"{"decision":"deny","reason":"nope"}"#).unwrap();
        assert_eq!(response.decision, Decision::Deny);
        assert_eq!(response.reason.as_deref(), Some("nope"));
    }
}
