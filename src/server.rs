//! Unix socket server for receiving assistant hook events
//!
//! Listens on the islet socket for one JSON event per connection. There is no
//! length framing: end-of-document is inferred from peer close or a short
//! poll timeout once bytes have arrived. Fire-and-forget events close the
//! connection immediately; permission requests keep it open in the
//! `PendingRegistry` until a decision is written back on it.

use crate::correlation::CorrelationCache;
use crate::pending::{PendingPermission, PendingRegistry, PendingSnapshot, RespondOutcome};
use crate::{Decision, HookEvent};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Wall-clock bound on reading one request from an accepted connection.
const READ_WINDOW: Duration = Duration::from_millis(500);
/// Poll slice within the read window.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The seam to the UI layer. Exactly two things cross it: decoded events and
/// reply-write failures.
pub trait ServerHandler: Send + Sync {
    /// Called once per successfully decoded event, after all cache/registry
    /// side effects for that event.
    fn on_event(&self, event: HookEvent);

    /// Called when a decision reply could not be written, so the caller can
    /// treat the tool call as unresolved (e.g. auto-denied).
    fn on_permission_failure(&self, session_id: &str, tool_use_id: &str);
}

/// The hook socket server. Owns the socket lifecycle, the pending-response
/// registry, and the correlation cache.
pub struct HookServer {
    socket_path: PathBuf,
    handler: Arc<dyn ServerHandler>,
    registry: PendingRegistry,
    cache: Mutex<CorrelationCache>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl HookServer {
    pub fn new(socket_path: PathBuf, handler: Arc<dyn ServerHandler>) -> Arc<Self> {
        Arc::new(Self {
            socket_path,
            handler,
            registry: PendingRegistry::new(),
            cache: Mutex::new(CorrelationCache::new()),
            accept_task: Mutex::new(None),
        })
    }

    pub fn socket_path(&self) -> &std::path::Path {
        &self.socket_path
    }

    /// Bind the socket and start accepting. Idempotent while running. Bind
    /// failure is logged and leaves the server inert; there is no retry.
    /// Must be called from within a tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.lock_task();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        // Remove stale socket if it exists
        if self.socket_path.exists()
            && let Err(e) = std::fs::remove_file(&self.socket_path)
        {
            warn!(
                "Failed to remove stale socket {}: {}",
                self.socket_path.display(),
                e
            );
            return;
        }

        let listener = match UnixListener::bind(&self.socket_path) {
            Ok(l) => l,
            Err(e) => {
                warn!(
                    "Failed to bind Unix socket {}: {}",
                    self.socket_path.display(),
                    e
                );
                return;
            }
        };

        // Hooks run as whatever user owns the assistant process.
        if let Err(e) =
            std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o777))
        {
            warn!(
                "Failed to set socket permissions on {}: {}",
                self.socket_path.display(),
                e
            );
        }

        info!("listening on {}", self.socket_path.display());

        let server = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            server.accept_loop(listener).await;
        }));
    }

    /// Stop accepting, remove the socket file, and close every held pending
    /// connection, discarding their state.
    pub fn stop(&self) {
        if let Some(task) = self.lock_task().take() {
            task.abort();
        }
        let _ = std::fs::remove_file(&self.socket_path);
        self.registry.teardown();
        info!("server stopped");
    }

    /// Connections are drained one at a time: each read is bounded by
    /// `READ_WINDOW`, so a slow peer cannot starve others beyond that bound.
    async fn accept_loop(self: Arc<Self>, listener: UnixListener) {
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => self.handle_connection(stream).await,
                Err(e) => {
                    warn!("Failed to accept socket connection: {}", e);
                }
            }
        }
    }

    async fn handle_connection(&self, mut stream: UnixStream) {
        let payload = read_request(&mut stream).await;
        if payload.is_empty() {
            return;
        }

        let event: HookEvent = match serde_json::from_slice(&payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    "Failed to parse event: {} (payload: {})",
                    e,
                    String::from_utf8_lossy(&payload)
                );
                return;
            }
        };

        debug!(
            session_id = %event.session_id,
            event = %event.event,
            status = %event.status,
            "received event"
        );

        if event.is_pre_tool_use() {
            self.lock_cache().record(&event);
        }

        if event.is_terminal() {
            self.lock_cache().purge_session(&event.session_id);
            self.registry.cancel_session(&event.session_id);
        }

        if event.is_post_tool_use()
            && let Some(tool_use_id) = &event.tool_use_id
        {
            // The permission prompt became moot; release its connection.
            self.registry.cancel_tool(tool_use_id);
        }

        if !event.expects_response() {
            drop(stream);
            self.handler.on_event(event);
            return;
        }

        let resolved_id = event
            .tool_use_id
            .clone()
            .or_else(|| self.lock_cache().take(&event));

        let Some(tool_use_id) = resolved_id else {
            warn!(
                session_id = %event.session_id,
                "permission request missing tool_use_id and no cache hit; no reply possible"
            );
            drop(stream);
            self.handler.on_event(event);
            return;
        };

        trace!(
            session_id = %event.session_id,
            %tool_use_id,
            "permission request, keeping connection open"
        );

        let mut event = event;
        event.tool_use_id = Some(tool_use_id.clone());
        self.registry.register(PendingPermission::new(
            event.clone(),
            tool_use_id,
            Box::new(stream),
        ));
        self.handler.on_event(event);
    }

    // --- Decision surface for the UI layer ---

    pub fn respond_by_tool_id(&self, tool_use_id: &str, decision: Decision, reason: Option<&str>) {
        let outcome = self.registry.respond_by_tool_id(tool_use_id, decision, reason);
        self.report(outcome);
    }

    pub fn respond_by_session(&self, session_id: &str, decision: Decision, reason: Option<&str>) {
        let outcome = self.registry.respond_by_session(session_id, decision, reason);
        self.report(outcome);
    }

    pub fn cancel_pending_session(&self, session_id: &str) -> usize {
        self.registry.cancel_session(session_id)
    }

    pub fn cancel_pending_tool(&self, tool_use_id: &str) -> bool {
        self.registry.cancel_tool(tool_use_id)
    }

    pub fn has_pending(&self, session_id: &str) -> bool {
        self.registry.has_pending(session_id)
    }

    pub fn peek_pending(&self, session_id: &str) -> Option<PendingSnapshot> {
        self.registry.peek_pending(session_id)
    }

    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }

    fn report(&self, outcome: RespondOutcome) {
        if let RespondOutcome::WriteFailed {
            session_id,
            tool_use_id,
        } = outcome
        {
            self.handler.on_permission_failure(&session_id, &tool_use_id);
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, CorrelationCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.accept_task.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for HookServer {
    fn drop(&mut self) {
        if let Some(task) = self.lock_task().take() {
            task.abort();
        }
    }
}

/// Accumulate one request from the connection. Stops on peer close, a poll
/// timeout once at least one byte has arrived, a non-transient read error,
/// or the overall window expiring. Returns whatever was read.
async fn read_request(stream: &mut UnixStream) -> Vec<u8> {
    let mut payload = Vec::new();
    let mut chunk = vec![0u8; 64 * 1024];
    let deadline = tokio::time::Instant::now() + READ_WINDOW;

    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(POLL_INTERVAL, stream.read(&mut chunk)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => payload.extend_from_slice(&chunk[..n]),
            Ok(Err(e))
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                continue;
            }
            Ok(Err(e)) => {
                trace!("read error on hook connection: {}", e);
                break;
            }
            Err(_elapsed) => {
                if !payload.is_empty() {
                    break;
                }
            }
        }
    }

    payload
}
