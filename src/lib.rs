//! Claude Stream Deck
//!
//! Mirrors the state of a Claude Code session on an Elgato Stream Deck XL
//! and turns its keys into session controls.
//!
//! # Components
//! - [`core::machine`]: session state machine fed by Claude Code hook events
//! - [`ipc::server`]: Unix socket the hook script writes events to
//! - [`hid::controller`]: renders the key layout and reports key presses
//! - [`daemon`]: ties the above together and runs the key actions

pub mod actions;
pub mod core;
pub mod daemon;
pub mod hid;
pub mod ipc;
pub mod render;

pub use crate::core::config::Config;
pub use crate::core::events::{HookEvent, HookMessage};
pub use crate::core::machine::StateMachine;
pub use crate::core::state::{Phase, StateContext};
pub use actions::{SessionActions, TerminalActions};
pub use daemon::{Daemon, DaemonEvent, ShutdownHandle};
