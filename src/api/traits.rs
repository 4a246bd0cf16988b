//! Backend seam
//!
//! The session controller and poller only talk to the backend through
//! [`ChatBackend`], so tests can drive them with scripted feeds.

use crate::error::ChatError;
use crate::store::{Conversation, Message};
use crate::stream::FrameStream;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Body of a chat send
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

/// Keyword discovered for a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub keyword: String,
    #[serde(default)]
    pub search_volume: Option<u64>,
    #[serde(default)]
    pub difficulty: Option<f64>,
}

/// Remote chat backend
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send a message and open its event feed
    async fn open_stream(&self, request: &SendRequest) -> Result<FrameStream, ChatError>;

    /// Keywords discovered so far for a project
    async fn check_keywords(&self, project_id: &str) -> Result<Vec<Keyword>, ChatError>;

    /// Past conversations, most recent first
    async fn list_conversations(&self) -> Result<Vec<Conversation>, ChatError>;

    /// Full message history of one conversation
    async fn conversation_messages(&self, conversation_id: &str)
        -> Result<Vec<Message>, ChatError>;
}

#[async_trait]
impl<T: ChatBackend + ?Sized> ChatBackend for Arc<T> {
    async fn open_stream(&self, request: &SendRequest) -> Result<FrameStream, ChatError> {
        (**self).open_stream(request).await
    }

    async fn check_keywords(&self, project_id: &str) -> Result<Vec<Keyword>, ChatError> {
        (**self).check_keywords(project_id).await
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, ChatError> {
        (**self).list_conversations().await
    }

    async fn conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Message>, ChatError> {
        (**self).conversation_messages(conversation_id).await
    }
}
