//! Session actions triggered from the deck

pub mod terminal;

use crate::core::layout::SessionAction;
use async_trait::async_trait;

pub use terminal::TerminalActions;

/// Controls Claude Code sessions; each call reports success
#[async_trait]
pub trait SessionActions: Send + Sync {
    async fn new_session(&self) -> bool;
    async fn resume_session(&self) -> bool;
    async fn stop_session(&self) -> bool;
}

/// Run the handler method bound to `action`
pub async fn perform(actions: &dyn SessionActions, action: SessionAction) -> bool {
    match action {
        SessionAction::New => actions.new_session().await,
        SessionAction::Resume => actions.resume_session().await,
        SessionAction::Stop => actions.stop_session().await,
    }
}
