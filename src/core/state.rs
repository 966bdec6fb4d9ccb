//! Session phase and the context tracked alongside it

use super::events::HookEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of the Claude Code session shown on the status key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No session running
    #[default]
    Inactive,
    /// Session open, waiting for a prompt
    Idle,
    /// Model is working on a prompt
    Thinking,
    /// At least one tool call is in flight
    ToolRunning,
}

impl Phase {
    /// Stable lowercase name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Inactive => "inactive",
            Phase::Idle => "idle",
            Phase::Thinking => "thinking",
            Phase::ToolRunning => "tool_running",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the state machine knows about the current session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateContext {
    /// Current phase
    pub phase: Phase,
    /// Session identifier from the last SessionStart
    pub session_id: Option<String>,
    /// Name of the most recently started tool
    pub tool_name: Option<String>,
    /// Number of tool calls currently nested
    pub tool_depth: u32,
    /// Last recognised event
    pub last_event: Option<HookEvent>,
}

impl StateContext {
    /// Create the initial context
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a tool call is currently in flight
    pub fn in_tool(&self) -> bool {
        self.tool_depth > 0
    }
}

/// Truncate a label to at most `max_chars` characters, marking the cut with "..."
///
/// Counts characters rather than bytes so multi-byte names never split.
pub fn truncate_label(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }

    let keep = max_chars.saturating_sub(1);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}
