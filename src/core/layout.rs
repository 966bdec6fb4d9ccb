//! Key layout and the static display tables
//!
//! The deck is an 8x4 grid. Key 0 shows the session phase, keys 1-3 are
//! session actions and everything else stays blank.

use super::state::Phase;
use std::fmt;

/// Number of keys on the supported deck
pub const KEY_COUNT: usize = 32;

/// Key that mirrors the session phase
pub const STATUS_KEY: u8 = 0;

/// Labels longer than this are truncated on the status key
pub const MAX_TOOL_LABEL: usize = 10;

/// RGB color
pub type Rgb = [u8; 3];

/// How a phase is drawn on the status key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateDisplay {
    pub icon: &'static str,
    pub title: &'static str,
    pub color: Rgb,
}

const INACTIVE_DISPLAY: StateDisplay = StateDisplay {
    icon: "status-inactive.png",
    title: "Offline",
    color: [128, 128, 128],
};

const IDLE_DISPLAY: StateDisplay = StateDisplay {
    icon: "status-idle.png",
    title: "Ready",
    color: [0, 200, 0],
};

const THINKING_DISPLAY: StateDisplay = StateDisplay {
    icon: "status-thinking.png",
    title: "Thinking...",
    color: [0, 120, 255],
};

const TOOL_DISPLAY: StateDisplay = StateDisplay {
    icon: "status-tool.png",
    title: "Tool",
    color: [255, 140, 0],
};

impl Phase {
    /// Display configuration for this phase
    pub fn display(&self) -> &'static StateDisplay {
        match self {
            Phase::Inactive => &INACTIVE_DISPLAY,
            Phase::Idle => &IDLE_DISPLAY,
            Phase::Thinking => &THINKING_DISPLAY,
            Phase::ToolRunning => &TOOL_DISPLAY,
        }
    }
}

/// Session control bound to a fixed key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionAction {
    /// Start a new Claude Code session
    New,
    /// Resume the most recent session
    Resume,
    /// Interrupt the running session
    Stop,
}

/// How an action key is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionButton {
    pub key: u8,
    pub icon: &'static str,
    pub title: &'static str,
    pub color: Rgb,
}

const ACTION_COLOR: Rgb = [60, 60, 60];

const NEW_BUTTON: ActionButton = ActionButton {
    key: 1,
    icon: "action-new.png",
    title: "New",
    color: ACTION_COLOR,
};

const RESUME_BUTTON: ActionButton = ActionButton {
    key: 2,
    icon: "action-resume.png",
    title: "Resume",
    color: ACTION_COLOR,
};

const STOP_BUTTON: ActionButton = ActionButton {
    key: 3,
    icon: "action-stop.png",
    title: "Stop",
    color: ACTION_COLOR,
};

impl SessionAction {
    /// All actions in key order
    pub const ALL: [SessionAction; 3] = [SessionAction::New, SessionAction::Resume, SessionAction::Stop];

    /// Button configuration for this action
    pub fn button(&self) -> &'static ActionButton {
        match self {
            SessionAction::New => &NEW_BUTTON,
            SessionAction::Resume => &RESUME_BUTTON,
            SessionAction::Stop => &STOP_BUTTON,
        }
    }

    /// Key this action is bound to
    pub fn key(&self) -> u8 {
        self.button().key
    }

    /// Action bound to a key, if any
    pub fn from_key(key: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.key() == key)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionAction::New => "new",
            SessionAction::Resume => "resume",
            SessionAction::Stop => "stop",
        }
    }
}

impl fmt::Display for SessionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// First key that carries no binding
pub const FIRST_UNBOUND_KEY: u8 = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_table() {
        assert_eq!(Phase::Inactive.display().title, "Offline");
        assert_eq!(Phase::Idle.display().color, [0, 200, 0]);
        assert_eq!(Phase::Thinking.display().icon, "status-thinking.png");
        assert_eq!(Phase::ToolRunning.display().title, "Tool");
    }

    #[test]
    fn test_action_keys() {
        assert_eq!(SessionAction::from_key(1), Some(SessionAction::New));
        assert_eq!(SessionAction::from_key(2), Some(SessionAction::Resume));
        assert_eq!(SessionAction::from_key(3), Some(SessionAction::Stop));
        assert_eq!(SessionAction::from_key(STATUS_KEY), None);
        assert_eq!(SessionAction::from_key(FIRST_UNBOUND_KEY), None);
        assert_eq!(SessionAction::from_key(31), None);
    }

    #[test]
    fn test_action_keys_do_not_overlap_status() {
        for action in SessionAction::ALL {
            assert_ne!(action.key(), STATUS_KEY);
            assert!(action.key() < FIRST_UNBOUND_KEY);
        }
    }
}
