//! SEO chat client core
//!
//! Streaming chat sessions against the SEO assistant backend, plus the
//! keyword-discovery poller. Rendering is left to the embedding UI, which
//! reads the [`ConversationStore`] and drives a [`SessionController`].

// Library surface; errors are documented on ChatError rather than per fn.
#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod api;
pub mod config;
pub mod error;
pub mod poller;
pub mod session;
pub mod store;
pub mod stream;

pub use api::{ChatBackend, HttpBackend, Keyword, SendRequest};
pub use config::ClientConfig;
pub use error::{ChatError, ChatErrorKind};
pub use poller::{start_keyword_discovery, PollerState, PollingSupervisor};
pub use session::{SessionController, SessionOutcome, SessionState};
pub use store::{
    Conversation, ConversationStore, LoadingState, Message, Role, StoreEvent, StoreSubscription,
};
pub use stream::{RawFrame, StreamEvent};
