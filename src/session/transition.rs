//! Per-event session transition
//!
//! Pure: given the current state, one decoded event and whether a cancel has
//! been requested, decide the next state and the store mutations to apply.

use super::SessionState;
use crate::stream::StreamEvent;
use serde_json::{Map, Value};

/// Store mutations produced by a transition
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Effect {
    PushStatus(String),
    SetActiveConversation(String),
    AppendAssistant {
        content: String,
        metadata: Option<Map<String, Value>>,
    },
    FinishLoading,
}

#[derive(Debug)]
pub(crate) struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<Effect>,
    /// Stop consuming the feed
    pub close_feed: bool,
}

impl TransitionResult {
    fn new(state: SessionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
            close_feed: false,
        }
    }

    fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    fn closing(mut self) -> Self {
        self.close_feed = true;
        self
    }
}

/// Terminal state for a feed that stops now.
pub(crate) fn settle(state: &SessionState, cancel_requested: bool) -> SessionState {
    match state {
        SessionState::Idle | SessionState::Sending | SessionState::Streaming => {
            if cancel_requested {
                SessionState::Cancelled
            } else {
                SessionState::Completed {
                    conversation_id: None,
                }
            }
        }
        terminal => terminal.clone(),
    }
}

pub(crate) fn transition(
    state: &SessionState,
    event: StreamEvent,
    cancel_requested: bool,
) -> TransitionResult {
    match (state, event) {
        // Done always closes, whatever was reached before it
        (_, StreamEvent::Done) => {
            TransitionResult::new(settle(state, cancel_requested))
                .with_effect(Effect::FinishLoading)
                .closing()
        }

        // Cancel sampled at the event boundary: stop without applying
        (SessionState::Streaming, _) if cancel_requested => {
            TransitionResult::new(SessionState::Cancelled).closing()
        }

        (SessionState::Streaming, StreamEvent::Status { message }) => {
            TransitionResult::new(SessionState::Streaming).with_effect(Effect::PushStatus(message))
        }

        (
            SessionState::Streaming,
            StreamEvent::Message {
                content,
                conversation_id,
                metadata,
            },
        ) => TransitionResult::new(SessionState::Completed {
            conversation_id: Some(conversation_id.clone()),
        })
        .with_effect(Effect::SetActiveConversation(conversation_id))
        .with_effect(Effect::AppendAssistant { content, metadata })
        .with_effect(Effect::FinishLoading),

        (SessionState::Streaming, StreamEvent::Error { message, kind }) => {
            TransitionResult::new(SessionState::Failed { message, kind })
                .with_effect(Effect::FinishLoading)
        }

        // Already terminal: a cancel stops waiting for Done, nothing is rewound
        (terminal, _) if cancel_requested => TransitionResult::new(terminal.clone()).closing(),

        // Already terminal: repeated results are ignored
        (terminal, event) => {
            tracing::debug!(event = event.kind(), state = ?terminal, "Ignoring event after terminal state");
            TransitionResult::new(terminal.clone())
        }
    }
}
