//! Session store - the authoritative session set and phase state machine
//!
//! Consumed by the UI layer through snapshots; populated by the socket server
//! through `handle_event`. Shared as `Arc<Mutex<SessionStore>>` so all
//! mutation is serialized behind one lock.

use crate::{HookEvent, SessionSnapshot, SessionState};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Idle sessions older than this are removed by the sweep.
pub const IDLE_RETENTION: Duration = Duration::from_secs(300);

/// Tool name whose invocations represent sub-agent tasks.
const TASK_TOOL: &str = "Task";

/// Registry of known sessions, keyed by their external session id.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, SessionState>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event. Phase transitions are last-write-wins: any phase may
    /// follow any phase. Creation happens only on `SessionStart` for an
    /// unknown id; other events for unknown ids are dropped.
    pub fn handle_event(&mut self, event: &HookEvent) {
        if event.is_terminal() {
            if self.sessions.remove(&event.session_id).is_some() {
                info!(session_id = %event.session_id, "session ended");
                debug!("{} total session(s)", self.sessions.len());
            }
            return;
        }

        match self.sessions.get_mut(&event.session_id) {
            Some(session) => Self::update_session(session, event),
            None if event.event == "SessionStart" => {
                info!(
                    session_id = %event.session_id,
                    cwd = %event.cwd,
                    service = ?event.service(),
                    "session started"
                );
                let mut session = SessionState::new(
                    event.session_id.clone(),
                    event.cwd.clone(),
                    event.service(),
                );
                session.pid = event.pid;
                session.tty = event.tty.clone();
                session.phase = event.phase();
                self.sessions.insert(event.session_id.clone(), session);
                debug!("{} total session(s)", self.sessions.len());
            }
            None => {
                trace!(
                    session_id = %event.session_id,
                    event = %event.event,
                    "dropping event for unknown session"
                );
            }
        }
    }

    fn update_session(session: &mut SessionState, event: &HookEvent) {
        session.phase = event.phase();
        session.touch();

        if event.pid.is_some() {
            session.pid = event.pid;
        }
        if event.tty.is_some() {
            session.tty = event.tty.clone();
        }

        if event.is_pre_tool_use()
            && let Some(tool_use_id) = &event.tool_use_id
        {
            let tool_name = event.tool.as_deref().unwrap_or("unknown");
            session.tools.start_tool(tool_use_id, tool_name);
            if tool_name == TASK_TOOL {
                session.subagents.start_task(tool_use_id);
            }
        }

        if event.is_post_tool_use()
            && let Some(tool_use_id) = &event.tool_use_id
        {
            session.tools.complete_tool(tool_use_id);
            session.subagents.stop_task(tool_use_id);
        }
    }

    /// Evict idle sessions whose last activity predates the cutoff. Sessions
    /// in any non-idle phase stay regardless of age.
    pub fn sweep(&mut self, retention: Duration) {
        let before = self.sessions.len();
        let now = Instant::now();
        self.sessions.retain(|_, session| {
            !(session.phase == crate::SessionPhase::Idle
                && now.duration_since(session.last_activity) > retention)
        });
        let removed = before - self.sessions.len();
        if removed > 0 {
            info!(removed, "swept idle sessions");
        }
    }

    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        self.sessions.values().map(SessionState::snapshot).collect()
    }

    pub fn get(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.sessions.get(session_id).map(SessionState::snapshot)
    }

    pub fn has_session(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn any_needs_attention(&self) -> bool {
        self.sessions.values().any(SessionState::needs_attention)
    }

    pub fn any_processing(&self) -> bool {
        self.sessions
            .values()
            .any(|s| matches!(s.phase, crate::SessionPhase::Processing | crate::SessionPhase::Compacting))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    #[cfg(test)]
    fn session_mut(&mut self, session_id: &str) -> &mut SessionState {
        self.sessions.get_mut(session_id).unwrap()
    }
}
