//! Chat client error types

use thiserror::Error;

/// Chat error with classification
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ChatError {
    pub kind: ChatErrorKind,
    pub message: String,
}

impl ChatError {
    pub fn new(kind: ChatErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::Transport, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::Protocol, message)
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::Backend, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::Timeout, message)
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, body: &str) -> Self {
        let body = body.trim();
        let message = if body.is_empty() {
            format!("request failed with status {status}")
        } else {
            format!("request failed with status {status}: {body}")
        };
        Self::new(ChatErrorKind::Http { status }, message)
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(error.to_string())
        } else if let Some(status) = error.status() {
            Self::from_status(status.as_u16(), "")
        } else {
            Self::transport(error.to_string())
        }
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatErrorKind {
    /// Feed could not be opened or broke mid-stream
    Transport,
    /// Frame could not be parsed
    Protocol,
    /// Error reported by the backend in-band
    Backend,
    /// Non-success HTTP status
    Http { status: u16 },
    /// No frame arrived within the configured deadline
    Timeout,
}

impl ChatErrorKind {
    /// Out-of-band failures, suppressed while a user cancel is in effect.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport | Self::Http { .. } | Self::Timeout)
    }
}
