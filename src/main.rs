//! Islet — local coordination daemon for AI coding assistant hooks
//!
//! Runs the hook socket server and the session store, and exposes the
//! decision/observer surfaces consumed by a UI layer.

use clap::Parser;
use islet::HookEvent;
use islet::config;
use islet::server::{HookServer, ServerHandler};
use islet::store::SessionStore;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "islet", about = "Local coordination daemon for AI coding assistant hooks")]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Handle an assistant hook event (reads JSON from stdin, forwards to daemon)
    Hook {
        /// AI service hint attached to the event (defaults to "claude")
        #[arg(long)]
        source: Option<String>,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_env("ISLET_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt().with_env_filter(filter).with_target(false).init();
}

/// Routes server callbacks into the session store. The dirty flag tells a
/// UI layer that snapshots changed since it last rendered.
struct SessionDispatcher {
    store: Arc<Mutex<SessionStore>>,
    dirty: Arc<AtomicBool>,
}

impl ServerHandler for SessionDispatcher {
    fn on_event(&self, event: HookEvent) {
        if let Ok(mut store) = self.store.lock() {
            store.handle_event(&event);
            self.dirty.store(true, Ordering::Relaxed);
        }
    }

    fn on_permission_failure(&self, session_id: &str, tool_use_id: &str) {
        warn!(%session_id, %tool_use_id, "permission response failed; treat as unresolved");
        self.dirty.store(true, Ordering::Relaxed);
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Some(Command::Hook { source }) = cli.command {
        islet::hook::run(source.as_deref());
        return;
    }

    init_tracing(cli.verbose);
    let config = config::load_config();

    // Shared store between the socket server and a UI layer
    let store = Arc::new(Mutex::new(SessionStore::new()));
    let dirty = Arc::new(AtomicBool::new(true));

    let dispatcher = Arc::new(SessionDispatcher {
        store: Arc::clone(&store),
        dirty: Arc::clone(&dirty),
    });
    let server = HookServer::new(config.resolve_socket_path(), dispatcher);
    server.start();

    // Periodic idle-session sweep
    let sweep_store = Arc::clone(&store);
    let sweep_dirty = Arc::clone(&dirty);
    let retention = config.retention();
    let mut ticker = tokio::time::interval(config.sweep_interval());
    tokio::spawn(async move {
        loop {
            ticker.tick().await;
            if let Ok(mut store) = sweep_store.lock() {
                store.sweep(retention);
                sweep_dirty.store(true, Ordering::Relaxed);
            }
        }
    });

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutting down"),
        Err(e) => warn!("failed to listen for shutdown signal: {}", e),
    }
    server.stop();
}
