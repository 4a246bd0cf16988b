//! HTTP implementation of the chat backend

use super::traits::{ChatBackend, Keyword, SendRequest};
use crate::config::ClientConfig;
use crate::error::ChatError;
use crate::store::{Conversation, Message};
use crate::stream::{sse, FrameStream};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct ConversationListResponse {
    conversations: Vec<Conversation>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct KeywordsResponse {
    keywords: Vec<Keyword>,
}

/// Backend reached over HTTP, with the chat feed delivered as SSE
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self, ChatError> {
        let base_url = Url::parse(&config.api_url)
            .map_err(|e| ChatError::transport(format!("invalid API URL {}: {e}", config.api_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(ChatError::transport(format!(
                "invalid API URL {}: not a base URL",
                config.api_url
            )));
        }

        // No overall timeout: a chat feed stays open for as long as the reply takes.
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url,
            api_token: config.api_token.clone(),
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ChatError> {
        let url = self.url(segments);
        tracing::debug!(url = %url, "GET");
        let response = self
            .authorize(self.client.get(url))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ChatError::protocol(format!("invalid response body: {e}")))
    }
}

async fn check_status(response: Response) -> Result<Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ChatError::from_status(status.as_u16(), &body))
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn open_stream(&self, request: &SendRequest) -> Result<FrameStream, ChatError> {
        let url = self.url(&["api", "chat", "stream"]);
        tracing::debug!(url = %url, conversation_id = ?request.conversation_id, "Opening chat stream");

        let response = self
            .authorize(self.client.post(url))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(sse::frame_stream(response.bytes_stream()))
    }

    async fn check_keywords(&self, project_id: &str) -> Result<Vec<Keyword>, ChatError> {
        let body: KeywordsResponse = self
            .get_json(&["api", "projects", project_id, "keywords"])
            .await?;
        Ok(body.keywords)
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, ChatError> {
        let body: ConversationListResponse = self.get_json(&["api", "conversations"]).await?;
        Ok(body.conversations)
    }

    async fn conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Message>, ChatError> {
        let body: MessagesResponse = self
            .get_json(&["api", "conversations", conversation_id, "messages"])
            .await?;
        Ok(body.messages)
    }
}
