//! Wire-format event and response types
//!
//! One `HookEvent` arrives per connection as a single JSON document. The
//! daemon derives everything else (AI service, session phase, whether the
//! connection is owed a reply) from the raw fields.

use crate::session::{PermissionContext, SessionPhase};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::SystemTime;

/// Normalized AI service classification, derived from the `source` hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AiService {
    Claude,
    ChatGpt,
    Gemini,
    Grok,
    Copilot,
    OpenCode,
    #[default]
    Unknown,
}

impl AiService {
    /// Map a free-form `source` hint onto a known service.
    pub fn from_source(source: Option<&str>) -> Self {
        let Some(source) = source else {
            return Self::Unknown;
        };
        match source.to_lowercase().as_str() {
            "claude" | "claude-code" | "claude_code" => Self::Claude,
            "chatgpt" | "openai" | "gpt" => Self::ChatGpt,
            "gemini" | "google" | "bard" => Self::Gemini,
            "grok" | "xai" | "x" => Self::Grok,
            "copilot" | "github-copilot" | "github_copilot" => Self::Copilot,
            "opencode" | "open-code" | "open_code" => Self::OpenCode,
            _ => Self::Unknown,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Claude => "Claude",
            Self::ChatGpt => "ChatGPT",
            Self::Gemini => "Gemini",
            Self::Grok => "Grok",
            Self::Copilot => "GitHub Copilot",
            Self::OpenCode => "OpenCode",
            Self::Unknown => "Unknown",
        }
    }
}

/// One event received on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookEvent {
    pub session_id: String,
    #[serde(default)]
    pub cwd: String,
    pub event: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HookEvent {
    pub fn service(&self) -> AiService {
        AiService::from_source(self.source.as_deref())
    }

    /// Session phase implied by this event's kind/status combination.
    pub fn phase(&self) -> SessionPhase {
        if self.event == "PreCompact" {
            return SessionPhase::Compacting;
        }

        match self.status.as_str() {
            "waiting_for_approval" => SessionPhase::WaitingForApproval(PermissionContext {
                tool_use_id: self.tool_use_id.clone().unwrap_or_default(),
                tool_name: self.tool.clone().unwrap_or_else(|| "unknown".to_string()),
                tool_input: self.tool_input.clone(),
                received_at: SystemTime::now(),
            }),
            "waiting_for_input" => SessionPhase::WaitingForInput,
            "running_tool" | "processing" | "starting" => SessionPhase::Processing,
            "compacting" => SessionPhase::Compacting,
            _ => SessionPhase::Idle,
        }
    }

    /// True only for a permission request that is blocking on a decision.
    /// The connection that carried such an event stays open.
    pub fn expects_response(&self) -> bool {
        self.event == "PermissionRequest" && self.status == "waiting_for_approval"
    }

    pub fn is_pre_tool_use(&self) -> bool {
        self.event == "PreToolUse"
    }

    pub fn is_post_tool_use(&self) -> bool {
        self.event == "PostToolUse"
    }

    /// Session-terminating event. Removes the session and purges every
    /// cache/registry entry it owns.
    pub fn is_terminal(&self) -> bool {
        self.event == "SessionStop" || self.event == "SessionEnd"
    }
}

/// Human decision on a pending permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

/// Reply written back on a held permission-request connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookResponse {
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> HookEvent {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn minimal_event_parses() {
        let event = parse(r#"{"session_id":"s1","event":"SessionStart"}"#);
        assert_eq!(event.session_id, "s1");
        assert_eq!(event.cwd, "");
        assert_eq!(event.status, "");
        assert!(event.tool_use_id.is_none());
    }

    #[test]
    fn full_event_parses() {
        let event = parse(
            r#"{
                "session_id":"s1","cwd":"/p","event":"PreToolUse",
                "status":"running_tool","source":"claude","pid":42,"tty":"/dev/ttys001",
                "tool":"Bash","tool_input":{"command":"ls"},"tool_use_id":"tu1"
            }"#,
        );
        assert_eq!(event.pid, Some(42));
        assert_eq!(event.tool.as_deref(), Some("Bash"));
        assert_eq!(
            event.tool_input.as_ref().unwrap().get("command"),
            Some(&Value::String("ls".into()))
        );
    }

    #[test]
    fn missing_session_id_rejected() {
        let result = serde_json::from_str::<HookEvent>(r#"{"event":"SessionStart"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn service_normalization() {
        assert_eq!(AiService::from_source(Some("claude-code")), AiService::Claude);
        assert_eq!(AiService::from_source(Some("CLAUDE")), AiService::Claude);
        assert_eq!(AiService::from_source(Some("openai")), AiService::ChatGpt);
        assert_eq!(AiService::from_source(Some("bard")), AiService::Gemini);
        assert_eq!(AiService::from_source(Some("xai")), AiService::Grok);
        assert_eq!(
            AiService::from_source(Some("github_copilot")),
            AiService::Copilot
        );
        assert_eq!(AiService::from_source(Some("open-code")), AiService::OpenCode);
        assert_eq!(AiService::from_source(Some("mystery")), AiService::Unknown);
        assert_eq!(AiService::from_source(None), AiService::Unknown);
    }

    #[test]
    fn phase_from_status() {
        let mut event = parse(r#"{"session_id":"s1","event":"Notification"}"#);

        event.status = "waiting_for_input".into();
        assert_eq!(event.phase(), SessionPhase::WaitingForInput);

        for status in ["running_tool", "processing", "starting"] {
            event.status = status.into();
            assert_eq!(event.phase(), SessionPhase::Processing, "status {status}");
        }

        event.status = "compacting".into();
        assert_eq!(event.phase(), SessionPhase::Compacting);

        event.status = "something_else".into();
        assert_eq!(event.phase(), SessionPhase::Idle);
    }

    #[test]
    fn pre_compact_forces_compacting_phase() {
        let event = parse(r#"{"session_id":"s1","event":"PreCompact","status":"processing"}"#);
        assert_eq!(event.phase(), SessionPhase::Compacting);
    }

    #[test]
    fn approval_phase_carries_permission_context() {
        let event = parse(
            r#"{
                "session_id":"s1","event":"PermissionRequest","status":"waiting_for_approval",
                "tool":"Bash","tool_input":{"command":"ls"},"tool_use_id":"tu1"
            }"#,
        );
        match event.phase() {
            SessionPhase::WaitingForApproval(ctx) => {
                assert_eq!(ctx.tool_use_id, "tu1");
                assert_eq!(ctx.tool_name, "Bash");
                assert!(ctx.tool_input.is_some());
            }
            other => panic!("expected WaitingForApproval, got {other:?}"),
        }
    }

    #[test]
    fn approval_phase_defaults_without_tool_fields() {
        let event =
            parse(r#"{"session_id":"s1","event":"PermissionRequest","status":"waiting_for_approval"}"#);
        match event.phase() {
            SessionPhase::WaitingForApproval(ctx) => {
                assert_eq!(ctx.tool_use_id, "");
                assert_eq!(ctx.tool_name, "unknown");
                assert!(ctx.tool_input.is_none());
            }
            other => panic!("expected WaitingForApproval, got {other:?}"),
        }
    }

    #[test]
    fn expects_response_requires_kind_and_status() {
        let event =
            parse(r#"{"session_id":"s1","event":"PermissionRequest","status":"waiting_for_approval"}"#);
        assert!(event.expects_response());

        let event = parse(r#"{"session_id":"s1","event":"PermissionRequest","status":"idle"}"#);
        assert!(!event.expects_response());

        let event =
            parse(r#"{"session_id":"s1","event":"Notification","status":"waiting_for_approval"}"#);
        assert!(!event.expects_response());
    }

    #[test]
    fn terminal_events() {
        assert!(parse(r#"{"session_id":"s1","event":"SessionStop"}"#).is_terminal());
        assert!(parse(r#"{"session_id":"s1","event":"SessionEnd"}"#).is_terminal());
        assert!(!parse(r#"{"session_id":"s1","event":"Stop"}"#).is_terminal());
    }

    #[test]
    fn response_serialization_omits_missing_reason() {
        let response = HookResponse {
            decision: Decision::Allow,
            reason: None,
        };
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"decision":"allow"}"#
        );

        let response = HookResponse {
            decision: Decision::Deny,
            reason: Some("not now".into()),
        };
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"decision":"deny","reason":"not now"}"#
        );
    }
}
