//! Session state machine
//!
//! Maps hook events onto the four session phases. Tool calls can nest
//! (a Task tool spawns a subagent that runs its own tools), so a depth
//! counter decides when "running a tool" falls back to "thinking".
//!
//! ```text
//! Inactive --SessionStart--> Idle --UserPromptSubmit--> Thinking
//! Thinking --PreToolUse--> ToolRunning --PostToolUse(depth 0)--> Thinking
//! Thinking/ToolRunning --Stop--> Idle
//! *        --SessionEnd--> Inactive
//! ```

use super::events::HookEvent;
use super::state::{Phase, StateContext};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, info, warn};

/// Callback invoked after a transition: `(old, new, context)`
pub type StateListener = Box<dyn FnMut(Phase, Phase, &StateContext) -> anyhow::Result<()> + Send>;

/// Handle returned by [`StateMachine::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Owns the single [`StateContext`] and fans transitions out to listeners
pub struct StateMachine {
    context: StateContext,
    listeners: Vec<(ListenerId, StateListener)>,
    next_listener: u64,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            context: StateContext::new(),
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.context.phase
    }

    /// Current context
    pub fn context(&self) -> &StateContext {
        &self.context
    }

    /// Register a listener; listeners run in registration order
    pub fn add_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(Phase, Phase, &StateContext) -> anyhow::Result<()> + Send + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Apply one hook event.
    ///
    /// Unknown tags are logged and dropped without touching the context.
    pub fn process_event(&mut self, tag: &str, session_id: Option<&str>, tool_name: Option<&str>) {
        let event = match tag.parse::<HookEvent>() {
            Ok(event) => event,
            Err(e) => {
                warn!("{}", e);
                return;
            }
        };

        self.context.last_event = Some(event);

        match event {
            HookEvent::SessionStart => {
                self.context.session_id = session_id.map(str::to_string);
                self.context.tool_depth = 0;
                self.context.tool_name = None;
                self.transition(Phase::Idle);
            }
            HookEvent::SessionEnd => {
                self.context.session_id = None;
                self.context.tool_depth = 0;
                self.context.tool_name = None;
                self.transition(Phase::Inactive);
            }
            HookEvent::UserPromptSubmit => {
                if matches!(self.context.phase, Phase::Idle | Phase::Inactive) {
                    self.transition(Phase::Thinking);
                }
            }
            HookEvent::PreToolUse => {
                self.context.tool_depth += 1;
                self.context.tool_name = tool_name.map(str::to_string);
                match self.context.phase {
                    Phase::Thinking => self.transition(Phase::ToolRunning),
                    // Same phase, but the displayed tool name changed
                    Phase::ToolRunning => self.notify(Phase::ToolRunning, Phase::ToolRunning),
                    _ => {}
                }
            }
            HookEvent::PostToolUse => {
                self.context.tool_depth = self.context.tool_depth.saturating_sub(1);
                if !self.context.in_tool() {
                    self.context.tool_name = None;
                    if self.context.phase == Phase::ToolRunning {
                        self.transition(Phase::Thinking);
                    }
                }
            }
            HookEvent::Stop | HookEvent::SubagentStop => {
                self.context.tool_depth = 0;
                self.context.tool_name = None;
                if matches!(self.context.phase, Phase::Thinking | Phase::ToolRunning) {
                    self.transition(Phase::Idle);
                }
            }
            HookEvent::Notification | HookEvent::PreCompact => {
                debug!("{} received", event);
            }
        }
    }

    /// Force the initial context back in place
    pub fn reset(&mut self) {
        let old = self.context.phase;
        self.context = StateContext::new();
        if old != Phase::Inactive {
            self.notify(old, Phase::Inactive);
        }
    }

    fn transition(&mut self, new: Phase) {
        let old = self.context.phase;
        if old == new {
            return;
        }
        info!("State transition: {} -> {}", old, new);
        self.context.phase = new;
        self.notify(old, new);
    }

    /// Deliver to every listener; one failing listener never stops the rest
    fn notify(&mut self, old: Phase, new: Phase) {
        let context = &self.context;
        for (id, listener) in self.listeners.iter_mut() {
            match catch_unwind(AssertUnwindSafe(|| listener(old, new, context))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("State listener {:?} failed: {:#}", id, e),
                Err(_) => error!("State listener {:?} panicked", id),
            }
        }
    }
}
