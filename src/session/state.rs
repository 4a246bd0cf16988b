//! Session lifecycle types

use crate::error::ChatErrorKind;

/// Controller lifecycle.
///
/// `Idle -> Sending -> Streaming -> {Completed, Cancelled, Failed}`, then
/// back to `Idle` once the session is torn down.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    /// Feed is being opened
    Sending,
    /// Feed is open and events are being consumed
    Streaming,
    Completed {
        /// Conversation the reply belongs to; `None` if the feed closed without one
        conversation_id: Option<String>,
    },
    Cancelled,
    Failed {
        message: String,
        /// `Backend` for a reported error, `Protocol` for a malformed frame
        kind: ChatErrorKind,
    },
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Sending | SessionState::Streaming)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed { .. } | SessionState::Cancelled | SessionState::Failed { .. }
        )
    }
}

/// How a call to `send` ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Feed closed normally
    Completed { conversation_id: Option<String> },
    /// Session was cancelled before it produced a result
    Cancelled,
    /// Empty text; nothing was sent
    Ignored,
    /// A session was already in flight; this call cancelled it instead
    CancelledInFlight,
}
