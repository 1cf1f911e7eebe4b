//! Session phase state machine and per-session state

use crate::event::AiService;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::time::{Instant, SystemTime};

/// Snapshot of the tool invocation a session is blocked on.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionContext {
    pub tool_use_id: String,
    pub tool_name: String,
    pub tool_input: Option<Map<String, Value>>,
    pub received_at: SystemTime,
}

impl PermissionContext {
    /// Pretty-printed tool input for display, empty when absent.
    pub fn formatted_input(&self) -> String {
        self.tool_input
            .as_ref()
            .and_then(|input| serde_json::to_string_pretty(input).ok())
            .unwrap_or_default()
    }
}

/// Where a session currently is in the attention state machine.
/// Exactly one phase holds at a time.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Processing,
    WaitingForApproval(PermissionContext),
    WaitingForInput,
    Compacting,
}

impl SessionPhase {
    /// True exactly for the phases that block on the human.
    pub fn needs_attention(&self) -> bool {
        matches!(self, Self::WaitingForApproval(_) | Self::WaitingForInput)
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Processing | Self::WaitingForApproval(_) | Self::Compacting
        )
    }

    pub fn is_waiting_for_approval(&self) -> bool {
        matches!(self, Self::WaitingForApproval(_))
    }

    pub fn display_text(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Processing => "Processing...",
            Self::WaitingForApproval(_) => "Awaiting approval",
            Self::WaitingForInput => "Ready",
            Self::Compacting => "Compacting...",
        }
    }
}

/// A tool invocation the session has started but not yet completed.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInProgress {
    pub tool_use_id: String,
    pub tool_name: String,
    pub started_at: Instant,
}

/// Tool bookkeeping for one session. `seen_ids` makes start events
/// idempotent: replaying the same tool-start twice records one tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolTracker {
    pub in_progress: HashMap<String, ToolInProgress>,
    seen_ids: HashSet<String>,
}

impl ToolTracker {
    pub fn start_tool(&mut self, tool_use_id: &str, tool_name: &str) {
        if !self.seen_ids.insert(tool_use_id.to_string()) {
            return;
        }
        self.in_progress.insert(
            tool_use_id.to_string(),
            ToolInProgress {
                tool_use_id: tool_use_id.to_string(),
                tool_name: tool_name.to_string(),
                started_at: Instant::now(),
            },
        );
    }

    pub fn complete_tool(&mut self, tool_use_id: &str) {
        self.in_progress.remove(tool_use_id);
    }

    pub fn has_seen(&self, tool_use_id: &str) -> bool {
        self.seen_ids.contains(tool_use_id)
    }
}

/// Sub-agent `Task` invocations currently on the stack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubagentState {
    pub task_stack: Vec<String>,
}

impl SubagentState {
    pub fn start_task(&mut self, task_tool_id: &str) {
        self.task_stack.push(task_tool_id.to_string());
    }

    pub fn stop_task(&mut self, task_tool_id: &str) {
        self.task_stack.retain(|id| id != task_tool_id);
    }

    pub fn has_active_task(&self) -> bool {
        !self.task_stack.is_empty()
    }
}

/// One known session, exclusively owned by the `SessionStore`.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: String,
    pub cwd: String,
    pub project_name: String,
    pub service: AiService,
    pub pid: Option<i32>,
    pub tty: Option<String>,
    pub phase: SessionPhase,
    pub tools: ToolTracker,
    pub subagents: SubagentState,
    pub last_activity: Instant,
    pub created_at: Instant,
}

impl SessionState {
    pub fn new(session_id: String, cwd: String, service: AiService) -> Self {
        let project_name = project_name_from_cwd(&cwd);
        Self {
            session_id,
            cwd,
            project_name,
            service,
            pid: None,
            tty: None,
            phase: SessionPhase::Idle,
            tools: ToolTracker::default(),
            subagents: SubagentState::default(),
            last_activity: Instant::now(),
            created_at: Instant::now(),
        }
    }

    pub fn needs_attention(&self) -> bool {
        self.phase.needs_attention()
    }

    pub fn active_permission(&self) -> Option<&PermissionContext> {
        match &self.phase {
            SessionPhase::WaitingForApproval(ctx) => Some(ctx),
            _ => None,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            cwd: self.cwd.clone(),
            project_name: self.project_name.clone(),
            service: self.service,
            pid: self.pid,
            phase: self.phase.clone(),
            pending_tool_name: self
                .active_permission()
                .map(|ctx| ctx.tool_name.clone()),
        }
    }
}

/// Immutable copy handed to external readers (the UI layer).
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub cwd: String,
    pub project_name: String,
    pub service: AiService,
    pub pid: Option<i32>,
    pub phase: SessionPhase,
    pub pending_tool_name: Option<String>,
}

impl SessionSnapshot {
    pub fn needs_attention(&self) -> bool {
        self.phase.needs_attention()
    }
}

/// Last path component of the working directory, or the cwd itself.
fn project_name_from_cwd(cwd: &str) -> String {
    cwd.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(cwd)
        .to_string()
}
