//! Local IPC between the Claude Code hook script and the daemon
//!
//! The hook writes one JSON object per connection to a Unix socket:
//! `{"event": "PreToolUse", "tool": "Read", "session_id": "..."}`.
//! No response is sent.

pub mod client;
pub mod server;

pub use client::send_message;
pub use server::{decode_message, MessageError, MessageHandler, SocketServer, MAX_MESSAGE_SIZE};
