//! Pending-response registry - connections held open awaiting a human decision
//!
//! The single authority over which connections are owed a reply. Entries are
//! keyed by tool-use id; at most one reply is ever written per entry because
//! delivery removes the entry under the lock before touching the socket.
//! Socket writes and closes happen after the lock is released.

use crate::{Decision, HookEvent, HookResponse};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Opaque handle to a still-open client connection. Closing is dropping.
pub trait ReplyConnection: Send {
    fn send(&mut self, payload: &[u8]) -> io::Result<()>;
}

impl ReplyConnection for tokio::net::UnixStream {
    fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        // The reply is a small JSON document; if the socket buffer cannot take
        // it without blocking, the peer is wedged and the write is a failure.
        let mut written = 0;
        while written < payload.len() {
            match self.try_write(&payload[written..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// A connection blocked on a decision for one tool-use id.
pub struct PendingPermission {
    pub session_id: String,
    pub tool_use_id: String,
    pub event: HookEvent,
    pub received_at: Instant,
    conn: Box<dyn ReplyConnection>,
}

impl PendingPermission {
    /// `event` must already carry the resolved tool-use id.
    pub fn new(event: HookEvent, tool_use_id: String, conn: Box<dyn ReplyConnection>) -> Self {
        Self {
            session_id: event.session_id.clone(),
            tool_use_id,
            event,
            received_at: Instant::now(),
            conn,
        }
    }
}

impl std::fmt::Debug for PendingPermission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingPermission")
            .field("session_id", &self.session_id)
            .field("tool_use_id", &self.tool_use_id)
            .field("received_at", &self.received_at)
            .finish_non_exhaustive()
    }
}

/// Read-only view of a pending entry for UI rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSnapshot {
    pub tool_name: Option<String>,
    pub tool_use_id: String,
    pub tool_input: Option<Map<String, Value>>,
}

/// Result of a decision-delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum RespondOutcome {
    /// Reply written and connection closed.
    Sent,
    /// Nothing pending for that key. Normal when the tool already completed
    /// through another path.
    NoPending,
    /// Connection closed but the reply never made it. The caller applies its
    /// own recovery policy (e.g. treat as auto-denied).
    WriteFailed {
        session_id: String,
        tool_use_id: String,
    },
}

/// Map of held connections, mutated only under one lock.
#[derive(Default)]
pub struct PendingRegistry {
    entries: Mutex<HashMap<String, PendingPermission>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingPermission>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert an entry keyed by its tool-use id. The same id cannot
    /// legitimately recur while pending; if it does the prior entry is
    /// replaced (and its connection closed), last write wins.
    pub fn register(&self, pending: PendingPermission) {
        let tool_use_id = pending.tool_use_id.clone();
        let replaced = self.lock().insert(tool_use_id.clone(), pending);
        if let Some(old) = replaced {
            warn!(
                session_id = %old.session_id,
                %tool_use_id,
                "replaced pending permission with duplicate tool_use_id"
            );
        }
    }

    /// Deliver a decision on the connection pending for `tool_use_id`.
    pub fn respond_by_tool_id(
        &self,
        tool_use_id: &str,
        decision: Decision,
        reason: Option<&str>,
    ) -> RespondOutcome {
        let pending = self.lock().remove(tool_use_id);
        let Some(pending) = pending else {
            debug!(%tool_use_id, "no pending permission for tool_use_id");
            return RespondOutcome::NoPending;
        };
        Self::deliver(pending, decision, reason)
    }

    /// Deliver a decision on the most recently received entry for the
    /// session. Ties on receipt time break by greatest tool-use id; under
    /// true simultaneity the pick is deterministic but otherwise arbitrary.
    pub fn respond_by_session(
        &self,
        session_id: &str,
        decision: Decision,
        reason: Option<&str>,
    ) -> RespondOutcome {
        let pending = {
            let mut entries = self.lock();
            let key = entries
                .values()
                .filter(|p| p.session_id == session_id)
                .max_by(|a, b| {
                    a.received_at
                        .cmp(&b.received_at)
                        .then_with(|| a.tool_use_id.cmp(&b.tool_use_id))
                })
                .map(|p| p.tool_use_id.clone());
            key.and_then(|k| entries.remove(&k))
        };

        let Some(pending) = pending else {
            debug!(%session_id, "no pending permission for session");
            return RespondOutcome::NoPending;
        };
        Self::deliver(pending, decision, reason)
    }

    /// Remove and close every entry for the session. Returns how many closed.
    pub fn cancel_session(&self, session_id: &str) -> usize {
        let removed: Vec<PendingPermission> = {
            let mut entries = self.lock();
            let keys: Vec<String> = entries
                .values()
                .filter(|p| p.session_id == session_id)
                .map(|p| p.tool_use_id.clone())
                .collect();
            keys.into_iter().filter_map(|k| entries.remove(&k)).collect()
        };

        for pending in &removed {
            debug!(
                session_id = %pending.session_id,
                tool_use_id = %pending.tool_use_id,
                "closing stale pending permission"
            );
        }
        removed.len()
    }

    /// Remove and close a single entry, used when the tool is observed to
    /// complete through a non-permission event path.
    pub fn cancel_tool(&self, tool_use_id: &str) -> bool {
        let removed = self.lock().remove(tool_use_id);
        match removed {
            Some(pending) => {
                debug!(
                    session_id = %pending.session_id,
                    %tool_use_id,
                    "tool completed externally, closing pending connection"
                );
                true
            }
            None => false,
        }
    }

    pub fn has_pending(&self, session_id: &str) -> bool {
        self.lock().values().any(|p| p.session_id == session_id)
    }

    /// Most recently received pending entry for the session, as a copy.
    pub fn peek_pending(&self, session_id: &str) -> Option<PendingSnapshot> {
        let entries = self.lock();
        entries
            .values()
            .filter(|p| p.session_id == session_id)
            .max_by(|a, b| {
                a.received_at
                    .cmp(&b.received_at)
                    .then_with(|| a.tool_use_id.cmp(&b.tool_use_id))
            })
            .map(|p| PendingSnapshot {
                tool_name: p.event.tool.clone(),
                tool_use_id: p.tool_use_id.clone(),
                tool_input: p.event.tool_input.clone(),
            })
    }

    /// Close every held connection, discarding all state.
    pub fn teardown(&self) {
        let count = {
            let mut entries = self.lock();
            let count = entries.len();
            entries.clear();
            count
        };
        if count > 0 {
            info!(count, "closed pending permissions on teardown");
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Write the reply and close. Runs outside the registry lock.
    fn deliver(
        mut pending: PendingPermission,
        decision: Decision,
        reason: Option<&str>,
    ) -> RespondOutcome {
        let response = HookResponse {
            decision,
            reason: reason.map(str::to_string),
        };
        let payload = match serde_json::to_vec(&response) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    session_id = %pending.session_id,
                    tool_use_id = %pending.tool_use_id,
                    "failed to serialize response: {e}"
                );
                return RespondOutcome::WriteFailed {
                    session_id: pending.session_id,
                    tool_use_id: pending.tool_use_id,
                };
            }
        };

        let age = pending.received_at.elapsed();
        match pending.conn.send(&payload) {
            Ok(()) => {
                info!(
                    session_id = %pending.session_id,
                    tool_use_id = %pending.tool_use_id,
                    decision = decision.as_str(),
                    age_secs = age.as_secs_f64(),
                    "sent permission response"
                );
                RespondOutcome::Sent
            }
            Err(e) => {
                warn!(
                    session_id = %pending.session_id,
                    tool_use_id = %pending.tool_use_id,
                    "failed to write permission response: {e}"
                );
                RespondOutcome::WriteFailed {
                    session_id: pending.session_id,
                    tool_use_id: pending.tool_use_id,
                }
            }
        }
        // `pending` drops here, closing the connection regardless of outcome.
    }
}
