//! Islet — local coordination daemon for AI coding assistant hooks
//!
//! Assistant processes report lifecycle and tool-use events over a Unix
//! socket. Islet keeps a session state machine derived from those events and
//! holds permission-request connections open until a human decision is
//! relayed back on them.

mod event;
mod session;

pub use event::*;
pub use session::*;

pub mod config;
pub mod correlation;
pub mod hook;
pub mod ipc;
pub mod pending;
pub mod server;
pub mod store;
