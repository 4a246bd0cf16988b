//! Session-local conversation state
//!
//! Holds the ordered message history, the active conversation id and the
//! loading display for one chat view. Observers register through
//! [`ConversationStore::subscribe`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 128;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// A single chat message. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "new_message_id")]
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
            metadata: None,
        }
    }

    pub fn assistant(content: impl Into<String>, metadata: Option<Map<String, Value>>) -> Self {
        Self {
            id: new_message_id(),
            role: Role::Assistant,
            content: content.into(),
            created_at: Utc::now(),
            metadata,
        }
    }
}

/// Conversation summary as listed by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub associated_project_names: BTreeSet<String>,
}

/// Progress display for the in-flight session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadingState {
    pub is_loading: bool,
    /// Every status observed in the current session, in arrival order
    pub status_steps: Vec<String>,
    pub current_status: String,
}

/// Change notifications delivered to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Appended(Message),
    Replaced { count: usize },
    ActiveConversationChanged(Option<String>),
    Cleared,
    LoadingChanged(LoadingState),
}

#[derive(Debug, Default)]
struct StoreInner {
    messages: Vec<Message>,
    active_conversation_id: Option<String>,
    loading: LoadingState,
}

/// Shared handle to a conversation view. Clones observe the same state.
#[derive(Clone)]
pub struct ConversationStore {
    inner: Arc<Mutex<StoreInner>>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(StoreInner::default())),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Sent while the lock is held so subscribers see changes in mutation order.
    fn notify(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }

    // ==================== Mutations ====================

    /// Append a message at the end of the history
    pub fn append(&self, message: Message) {
        let mut inner = self.lock();
        inner.messages.push(message.clone());
        self.notify(StoreEvent::Appended(message));
    }

    /// Replace the whole history (loading a past conversation).
    /// Any in-progress loading display is reset.
    pub fn set_messages(&self, messages: Vec<Message>) {
        let mut inner = self.lock();
        let count = messages.len();
        inner.messages = messages;
        inner.loading = LoadingState::default();
        self.notify(StoreEvent::Replaced { count });
        self.notify(StoreEvent::LoadingChanged(inner.loading.clone()));
    }

    pub fn set_active_conversation(&self, id: impl Into<String>) {
        let id = id.into();
        let mut inner = self.lock();
        if inner.active_conversation_id.as_deref() == Some(id.as_str()) {
            return;
        }
        inner.active_conversation_id = Some(id.clone());
        self.notify(StoreEvent::ActiveConversationChanged(Some(id)));
    }

    /// Forget the local view of the current conversation.
    /// Server-side history is untouched.
    pub fn start_new(&self) {
        let mut inner = self.lock();
        inner.messages.clear();
        inner.active_conversation_id = None;
        inner.loading = LoadingState::default();
        self.notify(StoreEvent::Cleared);
    }

    pub(crate) fn begin_loading(&self) {
        let mut inner = self.lock();
        inner.loading = LoadingState {
            is_loading: true,
            status_steps: Vec::new(),
            current_status: String::new(),
        };
        self.notify(StoreEvent::LoadingChanged(inner.loading.clone()));
    }

    pub(crate) fn push_status(&self, message: String) {
        let mut inner = self.lock();
        inner.loading.current_status.clone_from(&message);
        inner.loading.status_steps.push(message);
        self.notify(StoreEvent::LoadingChanged(inner.loading.clone()));
    }

    pub(crate) fn finish_loading(&self) {
        let mut inner = self.lock();
        if !inner.loading.is_loading {
            return;
        }
        inner.loading.is_loading = false;
        self.notify(StoreEvent::LoadingChanged(inner.loading.clone()));
    }

    // ==================== Reads ====================

    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    pub fn message_count(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn active_conversation_id(&self) -> Option<String> {
        self.lock().active_conversation_id.clone()
    }

    pub fn loading(&self) -> LoadingState {
        self.lock().loading.clone()
    }

    // ==================== Observers ====================

    /// Register for change notifications. The registration lasts until
    /// [`StoreSubscription::unsubscribe`] is called or the subscription drops.
    pub fn subscribe(&self) -> StoreSubscription {
        StoreSubscription {
            rx: self.events.subscribe(),
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }
}

/// Registration returned by [`ConversationStore::subscribe`]
pub struct StoreSubscription {
    rx: broadcast::Receiver<StoreEvent>,
}

impl StoreSubscription {
    /// Wait for the next change. Returns `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<StoreEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Store subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next change if one is already queued
    pub fn try_recv(&mut self) -> Option<StoreEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Store subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}
