//! Scripted backend for testing
//!
//! Feeds are queued up front and handed out one per `open_stream` call.

use crate::api::{ChatBackend, Keyword, SendRequest};
use crate::error::ChatError;
use crate::store::{Conversation, Message};
use crate::stream::{FrameStream, RawFrame};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::UnboundedReceiverStream;

type FrameItem = Result<RawFrame, ChatError>;

pub fn status_frame(message: &str) -> RawFrame {
    RawFrame::new("status", json!({ "message": message }))
}

pub fn message_frame(conversation_id: &str, content: &str) -> RawFrame {
    RawFrame::new(
        "message",
        json!({ "conversation_id": conversation_id, "message": content }),
    )
}

pub fn error_frame(message: &str) -> RawFrame {
    RawFrame::new("error", json!({ "message": message }))
}

pub fn done_frame() -> RawFrame {
    RawFrame::new("done", json!({}))
}

/// What the next `open_stream` call produces
pub enum ScriptedFeed {
    /// Fixed sequence, then end of stream
    Items(Vec<FrameItem>),
    /// Frames pushed by the test through a [`FeedSender`]
    Channel(mpsc::UnboundedReceiver<FrameItem>),
    /// Opening fails
    OpenError(ChatError),
    /// Opening never completes
    OpenPending,
}

impl ScriptedFeed {
    pub fn frames(frames: Vec<RawFrame>) -> Self {
        ScriptedFeed::Items(frames.into_iter().map(Ok).collect())
    }
}

/// Test-side handle of a channel feed
pub struct FeedSender {
    tx: mpsc::UnboundedSender<FrameItem>,
}

impl FeedSender {
    pub fn send(&self, frame: RawFrame) -> Result<(), mpsc::error::SendError<FrameItem>> {
        self.tx.send(Ok(frame))
    }

    pub fn fail(&self, error: ChatError) -> Result<(), mpsc::error::SendError<FrameItem>> {
        self.tx.send(Err(error))
    }
}

pub fn channel_feed() -> (FeedSender, ScriptedFeed) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FeedSender { tx }, ScriptedFeed::Channel(rx))
}

/// Backend that replays queued feeds and keyword results
pub struct ScriptedBackend {
    feeds: Mutex<VecDeque<ScriptedFeed>>,
    keywords: Mutex<VecDeque<Result<Vec<Keyword>, ChatError>>>,
    histories: HashMap<String, Vec<Message>>,
    requests: Mutex<Vec<SendRequest>>,
    keyword_checks: AtomicUsize,
    /// Notified each time `open_stream` is entered
    pub stream_opened: Arc<Notify>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            feeds: Mutex::new(VecDeque::new()),
            keywords: Mutex::new(VecDeque::new()),
            histories: HashMap::new(),
            requests: Mutex::new(Vec::new()),
            keyword_checks: AtomicUsize::new(0),
            stream_opened: Arc::new(Notify::new()),
        }
    }

    pub fn with_feed(self, feed: ScriptedFeed) -> Self {
        self.feeds.lock().unwrap().push_back(feed);
        self
    }

    pub fn with_history(mut self, conversation_id: &str, messages: Vec<Message>) -> Self {
        self.histories.insert(conversation_id.to_string(), messages);
        self
    }

    /// Queue the result of the next keyword check. Once the queue is empty
    /// checks return an empty list.
    pub fn queue_keywords(&self, result: Result<Vec<Keyword>, ChatError>) {
        self.keywords.lock().unwrap().push_back(result);
    }

    pub fn recorded_requests(&self) -> Vec<SendRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn keyword_checks(&self) -> usize {
        self.keyword_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn open_stream(&self, request: &SendRequest) -> Result<FrameStream, ChatError> {
        self.requests.lock().unwrap().push(request.clone());
        self.stream_opened.notify_one();

        let feed = self.feeds.lock().unwrap().pop_front();
        match feed {
            Some(ScriptedFeed::Items(items)) => Ok(Box::pin(futures::stream::iter(items))),
            Some(ScriptedFeed::Channel(rx)) => Ok(Box::pin(UnboundedReceiverStream::new(rx))),
            Some(ScriptedFeed::OpenError(error)) => Err(error),
            Some(ScriptedFeed::OpenPending) => std::future::pending().await,
            None => Err(ChatError::transport("No scripted feed queued")),
        }
    }

    async fn check_keywords(&self, _project_id: &str) -> Result<Vec<Keyword>, ChatError> {
        self.keyword_checks.fetch_add(1, Ordering::SeqCst);
        self.keywords
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, ChatError> {
        Ok(Vec::new())
    }

    async fn conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Message>, ChatError> {
        self.histories
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| ChatError::from_status(404, "conversation not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_feeds_served_in_order() {
        let backend = ScriptedBackend::new()
            .with_feed(ScriptedFeed::frames(vec![done_frame()]))
            .with_feed(ScriptedFeed::OpenError(ChatError::transport("down")));
        let request = SendRequest {
            message: "hi".to_string(),
            conversation_id: None,
            mode: None,
        };

        let frames: Vec<_> = backend.open_stream(&request).await.unwrap().collect().await;
        assert_eq!(frames.len(), 1);
        assert!(backend.open_stream(&request).await.is_err());
        assert!(backend.open_stream(&request).await.is_err());
        assert_eq!(backend.recorded_requests().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_history_is_not_found() {
        let backend = ScriptedBackend::new();
        let err = backend.conversation_messages("nope").await.unwrap_err();
        assert_eq!(err.kind, crate::error::ChatErrorKind::Http { status: 404 });
    }
}
