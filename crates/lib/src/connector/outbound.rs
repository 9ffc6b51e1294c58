//! Outbound user messages.

use crate::connector::api::{LiveChatApi, OutgoingPayload, SendMessageRequest};
use crate::connector::gate::OrderingGate;
use crate::error::SendError;
use serde_json::{Map, Value};

const MESSAGE_TYPE: &str = "MESSAGE";

/// A user message from the harness, with optional structured context forwarded verbatim
/// as the send body's `additionalContext`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserUtterance {
    pub message_text: String,
    pub additional_context: Option<Map<String, Value>>,
}

impl UserUtterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            message_text: text.into(),
            additional_context: None,
        }
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.additional_context = Some(context);
        self
    }
}

impl From<&str> for UserUtterance {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for UserUtterance {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

pub(crate) fn send_request(conversation_id: &str, utterance: &UserUtterance) -> SendMessageRequest {
    SendMessageRequest {
        conversation_id: conversation_id.to_string(),
        message_payload: OutgoingPayload {
            text: utterance.message_text.clone(),
            message_type: MESSAGE_TYPE.to_string(),
        },
        additional_context: utterance.additional_context.clone(),
    }
}

/// POST the utterance. The gate is marked pending for the lifetime of the request and
/// released before the outcome is inspected, whether the request succeeded or not.
pub(crate) async fn send_utterance(
    api: &dyn LiveChatApi,
    gate: &OrderingGate,
    session_token: &str,
    conversation_id: &str,
    utterance: &UserUtterance,
) -> Result<(), SendError> {
    let req = send_request(conversation_id, utterance);
    let guard = gate.begin_send_guarded();
    let result = api.send_message(session_token, &req).await;
    drop(guard);
    result.map_err(SendError::Api)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_body_shape() {
        let mut ctx = Map::new();
        ctx.insert("channel".to_string(), json!("web"));
        let utterance = UserUtterance::new("hello bot").with_context(ctx);
        let body = serde_json::to_value(send_request("c1", &utterance)).unwrap();
        assert_eq!(
            body,
            json!({
                "conversationId": "c1",
                "messagePayload": { "text": "hello bot", "messageType": "MESSAGE" },
                "additionalContext": { "channel": "web" }
            })
        );
    }

    #[test]
    fn additional_context_omitted_when_absent() {
        let body = serde_json::to_value(send_request("c1", &"hi".into())).unwrap();
        assert!(body.get("additionalContext").is_none());
    }
}
