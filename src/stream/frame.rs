//! Wire frames and the typed events decoded from them

use crate::error::ChatErrorKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Message text used for frames that do not match their declared tag
pub const MALFORMED_FRAME: &str = "malformed frame";

/// Raw frame as delivered by the feed: a tag plus a payload object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl RawFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Typed events observed by a chat session
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Progress update, may repeat
    Status { message: String },
    /// Terminal success
    Message {
        content: String,
        conversation_id: String,
        metadata: Option<Map<String, Value>>,
    },
    /// Terminal failure. `kind` is `Backend` for a reported error and
    /// `Protocol` for a frame that could not be decoded.
    Error {
        message: String,
        kind: ChatErrorKind,
    },
    /// Closes the feed
    Done,
}

impl StreamEvent {
    pub fn malformed() -> Self {
        StreamEvent::Error {
            message: MALFORMED_FRAME.to_string(),
            kind: ChatErrorKind::Protocol,
        }
    }

    pub fn backend_error(message: impl Into<String>) -> Self {
        StreamEvent::Error {
            message: message.into(),
            kind: ChatErrorKind::Backend,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Status { .. } => "status",
            StreamEvent::Message { .. } => "message",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Done => "done",
        }
    }
}

#[derive(Deserialize)]
struct StatusPayload {
    message: String,
}

#[derive(Deserialize)]
struct MessagePayload {
    conversation_id: String,
    message: String,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct ErrorPayload {
    message: String,
}

/// Decode a raw frame.
///
/// Returns `None` for tags this client does not know, so the feed can grow
/// new event kinds without breaking older consumers. A known tag whose
/// payload is missing required fields decodes to [`StreamEvent::malformed`].
pub fn decode(frame: RawFrame) -> Option<StreamEvent> {
    let RawFrame { event, data } = frame;
    let decoded = match event.as_str() {
        "status" => serde_json::from_value::<StatusPayload>(data)
            .map(|p| StreamEvent::Status { message: p.message }),
        "message" => {
            serde_json::from_value::<MessagePayload>(data).map(|p| StreamEvent::Message {
                content: p.message,
                conversation_id: p.conversation_id,
                metadata: p.metadata,
            })
        }
        "error" => serde_json::from_value::<ErrorPayload>(data)
            .map(|p| StreamEvent::backend_error(p.message)),
        "done" => Ok(StreamEvent::Done),
        other => {
            tracing::debug!(event = other, "Ignoring frame with unknown tag");
            return None;
        }
    };

    Some(decoded.unwrap_or_else(|e| {
        tracing::warn!(event = %event, error = %e, "Malformed frame");
        StreamEvent::malformed()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_decode_status() {
        let event = decode(RawFrame::new("status", json!({"message": "Thinking..."})));
        assert_eq!(
            event,
            Some(StreamEvent::Status {
                message: "Thinking...".to_string()
            })
        );
    }

    #[test]
    fn test_decode_message_with_metadata() {
        let event = decode(RawFrame::new(
            "message",
            json!({
                "conversation_id": "c1",
                "message": "Here are your keywords",
                "metadata": {"keywords": ["widget tracker"]}
            }),
        ));
        let Some(StreamEvent::Message {
            content,
            conversation_id,
            metadata,
        }) = event
        else {
            panic!("Expected Message event, got {event:?}");
        };
        assert_eq!(content, "Here are your keywords");
        assert_eq!(conversation_id, "c1");
        assert_eq!(
            metadata.and_then(|m| m.get("keywords").cloned()),
            Some(json!(["widget tracker"]))
        );
    }

    #[test]
    fn test_decode_message_null_metadata() {
        let event = decode(RawFrame::new(
            "message",
            json!({"conversation_id": "c1", "message": "Done", "metadata": null}),
        ));
        assert!(matches!(
            event,
            Some(StreamEvent::Message { metadata: None, .. })
        ));
    }

    #[test]
    fn test_decode_error_and_done() {
        assert_eq!(
            decode(RawFrame::new("error", json!({"message": "quota exceeded"}))),
            Some(StreamEvent::backend_error("quota exceeded"))
        );
        assert_eq!(decode(RawFrame::new("done", json!({}))), Some(StreamEvent::Done));
        assert_eq!(decode(RawFrame::new("done", Value::Null)), Some(StreamEvent::Done));
    }

    #[test]
    fn test_missing_fields_are_malformed() {
        assert_eq!(
            decode(RawFrame::new("status", json!({}))),
            Some(StreamEvent::malformed())
        );
        assert_eq!(
            decode(RawFrame::new("message", json!({"message": "no id"}))),
            Some(StreamEvent::malformed())
        );
        assert_eq!(
            decode(RawFrame::new("error", json!("boom"))),
            Some(StreamEvent::malformed())
        );
        assert_eq!(
            decode(RawFrame::new(
                "message",
                json!({"conversation_id": "c1", "message": "x", "metadata": 5})
            )),
            Some(StreamEvent::malformed())
        );
    }

    #[test]
    fn test_reported_error_text_stays_backend() {
        assert_eq!(
            decode(RawFrame::new("error", json!({"message": MALFORMED_FRAME}))),
            Some(StreamEvent::Error {
                message: MALFORMED_FRAME.to_string(),
                kind: ChatErrorKind::Backend,
            })
        );
        assert_ne!(
            StreamEvent::backend_error(MALFORMED_FRAME),
            StreamEvent::malformed()
        );
    }

    #[test]
    fn test_raw_frame_wire_shape() {
        let frame: RawFrame =
            serde_json::from_str(r#"{"event":"status","data":{"message":"Searching..."}}"#)
                .unwrap();
        assert_eq!(frame.event, "status");
        assert_eq!(frame.data, json!({"message": "Searching..."}));

        let frame: RawFrame = serde_json::from_str(r#"{"event":"done"}"#).unwrap();
        assert_eq!(frame.data, Value::Null);
    }

    proptest! {
        #[test]
        fn prop_unknown_tags_are_ignored(
            tag in "[a-z_]{1,12}",
            text in "[a-zA-Z0-9 ]{0,20}",
        ) {
            prop_assume!(!matches!(tag.as_str(), "status" | "message" | "error" | "done"));
            prop_assert_eq!(decode(RawFrame::new(tag, json!({"message": text}))), None);
        }

        #[test]
        fn prop_status_text_round_trips(text in "\\PC{0,40}") {
            let decoded = decode(RawFrame::new("status", json!({"message": text.clone()})));
            prop_assert_eq!(decoded, Some(StreamEvent::Status { message: text }));
        }
    }
}
