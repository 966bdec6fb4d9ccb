//! Core module - Session state, hook events, layout tables and configuration

pub mod config;
pub mod events;
pub mod layout;
pub mod machine;
pub mod state;

pub use config::Config;
pub use events::{HookEvent, HookMessage};
pub use layout::SessionAction;
pub use machine::{ListenerId, StateMachine};
pub use state::{Phase, StateContext};
