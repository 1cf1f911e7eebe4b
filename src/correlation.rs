//! Correlation cache - fallback lookup from (session, tool, arguments) to
//! queued tool-use ids
//!
//! A permission request sometimes arrives without its own `tool_use_id`. The
//! matching `PreToolUse` event for the same logical call did carry one, so the
//! server records it here and the permission path pops the oldest queued id
//! for the identical (session, tool, arguments) tuple. Entirely best-effort:
//! a miss only forfeits the ability to answer that one request.

use crate::HookEvent;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Cache key scoped to one exact (session, tool, arguments) tuple so
/// identical-looking calls on different sessions never cross-talk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    session_id: String,
    tool: String,
    input: String,
}

impl CacheKey {
    fn from_event(event: &HookEvent) -> Self {
        Self {
            session_id: event.session_id.clone(),
            tool: event
                .tool
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            input: canonical_input(event.tool_input.as_ref()),
        }
    }
}

/// Canonical JSON of the tool input. `serde_json` maps are ordered by key,
/// so serializing yields the same string regardless of wire key order.
fn canonical_input(input: Option<&Map<String, Value>>) -> String {
    input
        .and_then(|map| serde_json::to_string(map).ok())
        .unwrap_or_else(|| "{}".to_string())
}

/// FIFO queues of tool-use ids awaiting consumption, keyed per call tuple.
#[derive(Debug, Default)]
pub struct CorrelationCache {
    entries: HashMap<CacheKey, VecDeque<String>>,
}

impl CorrelationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the event's tool-use id under its derived key. No-op when the
    /// event carries no id.
    pub fn record(&mut self, event: &HookEvent) {
        let Some(tool_use_id) = &event.tool_use_id else {
            return;
        };

        let key = CacheKey::from_event(event);
        debug!(
            session_id = %event.session_id,
            tool = %key.tool,
            tool_use_id = %tool_use_id,
            "cached tool_use_id"
        );
        self.entries
            .entry(key)
            .or_default()
            .push_back(tool_use_id.clone());
    }

    /// Pop the oldest queued id for this event's key. Deletes the key when
    /// its queue empties, so consumption is exactly-once.
    pub fn take(&mut self, event: &HookEvent) -> Option<String> {
        let key = CacheKey::from_event(event);
        let queue = self.entries.get_mut(&key)?;
        let tool_use_id = queue.pop_front()?;
        if queue.is_empty() {
            self.entries.remove(&key);
        }

        debug!(
            session_id = %event.session_id,
            tool_use_id = %tool_use_id,
            "resolved tool_use_id from cache"
        );
        Some(tool_use_id)
    }

    /// Drop every entry belonging to the session.
    pub fn purge_session(&mut self, session_id: &str) {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.session_id != session_id);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(%session_id, removed, "purged correlation cache entries");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(session_id: &str, tool: &str, input: &str, tool_use_id: Option<&str>) -> HookEvent {
        serde_json::from_value(serde_json::json!({
            "session_id": session_id,
            "event": "PreToolUse",
            "status": "running_tool",
            "tool": tool,
            "tool_input": serde_json::from_str::<Value>(input).unwrap(),
            "tool_use_id": tool_use_id,
        }))
        .unwrap()
    }

    #[test]
    fn fifo_order_per_key() {
        let mut cache = CorrelationCache::new();
        for id in ["tu1", "tu2", "tu3"] {
            cache.record(&event("s1", "Bash", r#"{"cmd":"ls"}"#, Some(id)));
        }

        let request = event("s1", "Bash", r#"{"cmd":"ls"}"#, None);
        assert_eq!(cache.take(&request).as_deref(), Some("tu1"));
        assert_eq!(cache.take(&request).as_deref(), Some("tu2"));
        assert_eq!(cache.take(&request).as_deref(), Some("tu3"));
        assert_eq!(cache.take(&request), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn missing_id_is_noop() {
        let mut cache = CorrelationCache::new();
        cache.record(&event("s1", "Bash", r#"{"cmd":"ls"}"#, None));
        assert!(cache.is_empty());
    }

    #[test]
    fn sessions_are_isolated() {
        let mut cache = CorrelationCache::new();
        cache.record(&event("s1", "Bash", r#"{"cmd":"ls"}"#, Some("tu-a")));
        cache.record(&event("s2", "Bash", r#"{"cmd":"ls"}"#, Some("tu-b")));

        assert_eq!(
            cache.take(&event("s2", "Bash", r#"{"cmd":"ls"}"#, None)).as_deref(),
            Some("tu-b")
        );
        assert_eq!(
            cache.take(&event("s1", "Bash", r#"{"cmd":"ls"}"#, None)).as_deref(),
            Some("tu-a")
        );
    }

    #[test]
    fn different_arguments_are_different_keys() {
        let mut cache = CorrelationCache::new();
        cache.record(&event("s1", "Bash", r#"{"cmd":"ls"}"#, Some("tu1")));

        assert_eq!(cache.take(&event("s1", "Bash", r#"{"cmd":"rm"}"#, None)), None);
        assert_eq!(
            cache.take(&event("s1", "Bash", r#"{"cmd":"ls"}"#, None)).as_deref(),
            Some("tu1")
        );
    }

    #[test]
    fn input_key_order_does_not_matter() {
        let mut cache = CorrelationCache::new();
        cache.record(&event("s1", "Bash", r#"{"b":1,"a":2}"#, Some("tu1")));

        assert_eq!(
            cache.take(&event("s1", "Bash", r#"{"a":2,"b":1}"#, None)).as_deref(),
            Some("tu1")
        );
    }

    #[test]
    fn missing_tool_and_input_use_fallback_key() {
        let mut cache = CorrelationCache::new();
        let recorded: HookEvent = serde_json::from_str(
            r#"{"session_id":"s1","event":"PreToolUse","tool_use_id":"tu1"}"#,
        )
        .unwrap();
        cache.record(&recorded);

        let request: HookEvent =
            serde_json::from_str(r#"{"session_id":"s1","event":"PermissionRequest"}"#).unwrap();
        assert_eq!(cache.take(&request).as_deref(), Some("tu1"));
    }

    #[test]
    fn purge_session_removes_all_keys() {
        let mut cache = CorrelationCache::new();
        cache.record(&event("s1", "Bash", r#"{"cmd":"ls"}"#, Some("tu1")));
        cache.record(&event("s1", "Read", r#"{"path":"/x"}"#, Some("tu2")));
        cache.record(&event("s2", "Bash", r#"{"cmd":"ls"}"#, Some("tu3")));

        cache.purge_session("s1");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.take(&event("s1", "Bash", r#"{"cmd":"ls"}"#, None)), None);
        assert_eq!(
            cache.take(&event("s2", "Bash", r#"{"cmd":"ls"}"#, None)).as_deref(),
            Some("tu3")
        );
    }
}
