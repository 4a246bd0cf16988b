//! Streaming chat session controller

use super::transition::{settle, transition, Effect, TransitionResult};
use super::{SessionOutcome, SessionState};
use crate::api::{ChatBackend, SendRequest};
use crate::config::ClientConfig;
use crate::error::{ChatError, ChatErrorKind};
use crate::store::{ConversationStore, LoadingState, Message};
use crate::stream::{decode, FrameStream, RawFrame, StreamEvent};
use futures::StreamExt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct ActiveSession {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct ControllerInner {
    state: SessionState,
    active: Option<ActiveSession>,
    next_session_id: u64,
}

/// Sends user messages and consumes the resulting event feed.
///
/// At most one session is in flight per controller. A `send` that arrives
/// while one is running cancels it instead of starting a second one.
/// Clones share the same session slot and store.
pub struct SessionController<B: ChatBackend> {
    backend: Arc<B>,
    store: ConversationStore,
    inner: Arc<Mutex<ControllerInner>>,
    stream_timeout: Option<Duration>,
    default_mode: Option<String>,
}

impl<B: ChatBackend> Clone for SessionController<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            store: self.store.clone(),
            inner: Arc::clone(&self.inner),
            stream_timeout: self.stream_timeout,
            default_mode: self.default_mode.clone(),
        }
    }
}

impl<B: ChatBackend> SessionController<B> {
    pub fn new(backend: Arc<B>, store: ConversationStore) -> Self {
        Self {
            backend,
            store,
            inner: Arc::new(Mutex::new(ControllerInner::default())),
            stream_timeout: None,
            default_mode: None,
        }
    }

    pub fn from_config(backend: Arc<B>, store: ConversationStore, config: &ClientConfig) -> Self {
        Self::new(backend, store)
            .with_stream_timeout(config.stream_timeout)
            .with_mode(config.mode.clone())
    }

    /// Give up on a feed that stays silent this long between frames
    pub fn with_stream_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stream_timeout = timeout;
        self
    }

    /// Mode sent when `send` is called without one
    pub fn with_mode(mut self, mode: Option<String>) -> Self {
        self.default_mode = mode;
        self
    }

    fn lock(&self) -> MutexGuard<'_, ControllerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn state(&self) -> SessionState {
        self.lock().state.clone()
    }

    /// True while a session is sending or streaming
    pub fn is_active(&self) -> bool {
        self.lock().state.is_active()
    }

    pub fn loading(&self) -> LoadingState {
        self.store.loading()
    }

    /// Send `text` and consume the reply feed until it closes.
    ///
    /// The user message is appended before any network activity. Without an
    /// explicit `conversation_id` the store's active conversation is continued.
    pub async fn send(
        &self,
        text: &str,
        conversation_id: Option<&str>,
        mode: Option<&str>,
    ) -> Result<SessionOutcome, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(SessionOutcome::Ignored);
        }

        let (session_id, cancel, request) = {
            let mut inner = self.lock();
            if inner.state.is_active() {
                self.cancel_locked(&mut inner);
                return Ok(SessionOutcome::CancelledInFlight);
            }
            release_settled(&mut inner);

            inner.next_session_id += 1;
            let session_id = inner.next_session_id;
            let cancel = CancellationToken::new();
            inner.active = Some(ActiveSession {
                id: session_id,
                cancel: cancel.clone(),
            });
            inner.state = SessionState::Sending;

            let request = SendRequest {
                message: text.to_string(),
                conversation_id: conversation_id
                    .map(str::to_string)
                    .or_else(|| self.store.active_conversation_id()),
                mode: mode.map(str::to_string).or_else(|| self.default_mode.clone()),
            };

            self.store.append(Message::user(text));
            self.store.begin_loading();
            (session_id, cancel, request)
        };

        tracing::info!(
            session = session_id,
            conversation_id = ?request.conversation_id,
            "Starting chat session"
        );

        let result = self.run_session(session_id, &cancel, &request).await;
        self.finish(session_id, &cancel, result)
    }

    /// Cancel the in-flight session, if any.
    ///
    /// Loading is cleared immediately. Mutations already applied stay; events
    /// still in transit are discarded at the next event boundary.
    pub fn cancel(&self) {
        let mut inner = self.lock();
        self.cancel_locked(&mut inner);
    }

    fn cancel_locked(&self, inner: &mut ControllerInner) {
        let Some(active) = inner.active.take() else {
            return;
        };
        active.cancel.cancel();
        inner.state = SessionState::Idle;
        self.store.finish_loading();
        tracing::info!(session = active.id, "Chat session cancelled");
    }

    /// Begin a fresh conversation, cancelling any in-flight session first.
    pub fn start_new(&self) {
        let mut inner = self.lock();
        self.cancel_locked(&mut inner);
        self.store.start_new();
    }

    /// Load a past conversation into the store, replacing the local view.
    pub async fn open_conversation(&self, conversation_id: &str) -> Result<usize, ChatError> {
        if self.is_active() {
            return Err(ChatError::backend("session in progress"));
        }

        let messages = self.backend.conversation_messages(conversation_id).await?;
        let count = messages.len();

        let mut inner = self.lock();
        if inner.state.is_active() {
            return Err(ChatError::backend("session in progress"));
        }
        release_settled(&mut inner);
        self.store.set_messages(messages);
        self.store.set_active_conversation(conversation_id);
        drop(inner);

        tracing::info!(conversation_id, count, "Loaded conversation history");
        Ok(count)
    }

    async fn run_session(
        &self,
        session_id: u64,
        cancel: &CancellationToken,
        request: &SendRequest,
    ) -> Result<SessionState, ChatError> {
        let mut feed = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(SessionState::Cancelled),
            opened = self.backend.open_stream(request) => opened?,
        };

        if !self.mark_streaming(session_id) {
            return Ok(SessionState::Cancelled);
        }

        let mut state = SessionState::Streaming;
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(settle(&state, true)),
                next = next_frame(&mut feed, self.stream_timeout) => next,
            };

            let event = match next {
                Some(Ok(frame)) => match decode(frame) {
                    Some(event) => event,
                    None => continue,
                },
                Some(Err(error)) if error.kind == ChatErrorKind::Protocol => {
                    StreamEvent::malformed()
                }
                Some(Err(error)) => {
                    if state.is_terminal() {
                        tracing::debug!(
                            session = session_id,
                            error = %error,
                            "Feed broke after terminal event"
                        );
                        return Ok(state);
                    }
                    return Err(error);
                }
                None => {
                    if state.is_terminal() {
                        return Ok(state);
                    }
                    return Err(ChatError::transport(
                        "stream closed before a terminal event",
                    ));
                }
            };

            tracing::debug!(session = session_id, event = event.kind(), "Chat event");
            let result = self.apply_event(session_id, cancel, &state, event);
            state = result.new_state;
            if result.close_feed {
                return Ok(state);
            }
        }
    }

    fn mark_streaming(&self, session_id: u64) -> bool {
        let mut inner = self.lock();
        let owned = inner.active.as_ref().is_some_and(|a| a.id == session_id);
        if owned {
            inner.state = SessionState::Streaming;
        }
        owned
    }

    /// Apply one event under the controller lock so `cancel` cannot
    /// interleave between the cancellation check and the store mutations.
    fn apply_event(
        &self,
        session_id: u64,
        cancel: &CancellationToken,
        state: &SessionState,
        event: StreamEvent,
    ) -> TransitionResult {
        let mut inner = self.lock();
        let owned = inner.active.as_ref().is_some_and(|a| a.id == session_id);
        let result = transition(state, event, cancel.is_cancelled() || !owned);
        if !owned {
            return result;
        }

        for effect in &result.effects {
            match effect {
                Effect::PushStatus(message) => self.store.push_status(message.clone()),
                Effect::SetActiveConversation(id) => self.store.set_active_conversation(id.as_str()),
                Effect::AppendAssistant { content, metadata } => self
                    .store
                    .append(Message::assistant(content.clone(), metadata.clone())),
                Effect::FinishLoading => self.store.finish_loading(),
            }
        }
        inner.state = result.new_state.clone();
        result
    }

    fn finish(
        &self,
        session_id: u64,
        cancel: &CancellationToken,
        result: Result<SessionState, ChatError>,
    ) -> Result<SessionOutcome, ChatError> {
        {
            let mut inner = self.lock();
            if inner.active.as_ref().is_some_and(|a| a.id == session_id) {
                inner.active = None;
                inner.state = SessionState::Idle;
                self.store.finish_loading();
            }
        }

        let outcome = match result {
            Ok(SessionState::Completed { conversation_id }) => {
                Ok(SessionOutcome::Completed { conversation_id })
            }
            Ok(SessionState::Failed { message, kind }) => Err(ChatError::new(kind, message)),
            Ok(_) => Ok(SessionOutcome::Cancelled),
            Err(error) if cancel.is_cancelled() => {
                tracing::debug!(
                    session = session_id,
                    error = %error,
                    "Suppressed error after cancel"
                );
                Ok(SessionOutcome::Cancelled)
            }
            Err(error) => Err(error),
        };

        match &outcome {
            Ok(outcome) => tracing::info!(session = session_id, ?outcome, "Chat session finished"),
            Err(error) => {
                tracing::warn!(session = session_id, error = %error, "Chat session failed");
            }
        }
        outcome
    }
}

/// Drop the slot of a session that already reached its result but is still
/// waiting for `Done`. Its loop stops at the cancel and keeps that result.
fn release_settled(inner: &mut ControllerInner) {
    if let Some(settled) = inner.active.take() {
        settled.cancel.cancel();
        tracing::debug!(session = settled.id, state = ?inner.state, "Released settled session");
        inner.state = SessionState::Idle;
    }
}

async fn next_frame(
    feed: &mut FrameStream,
    timeout: Option<Duration>,
) -> Option<Result<RawFrame, ChatError>> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, feed.next())
            .await
            .unwrap_or_else(|_| {
                Some(Err(ChatError::timeout(format!(
                    "no event received within {limit:?}"
                ))))
            }),
        None => feed.next().await,
    }
}
