//! Inbound bot messages: translation from vendor notifications and the harness-facing reply type.

use crate::connector::api::{MessagePayload, Notification};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

const NEW_MESSAGE: &str = "NEW_MESSAGE";
const BOT_SENDER: &str = "bot";

/// A button offered with a bot message (attachment button or quick reply).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    pub text: String,
    pub payload: String,
}

/// Normalized bot message delivered to the harness.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub sender: String,
    pub message_text: String,
    pub buttons: Vec<Button>,
    /// The notification this message was built from, as received.
    pub source_data: Value,
}

/// What the harness receives from the poll loop.
#[derive(Debug, Clone, PartialEq)]
pub enum BotReply {
    Message(InboundMessage),
    /// A poll cycle failed; the text describes why.
    Text(String),
}

/// Ids of notifications already delivered in the current session.
pub type HandledSet = HashSet<String>;

/// Session-side identity the translator filters against.
#[derive(Debug, Clone, Copy)]
pub struct TranslateScope<'a> {
    pub conversation_id: &'a str,
    pub user_id: &'a str,
}

/// Translate one notification. Returns `None` for other event types, other conversations,
/// echoes of the local user's own messages and ids already in `handled`. Accepted ids are
/// recorded in `handled` before the message is returned.
pub fn translate(
    n: &Notification,
    scope: TranslateScope<'_>,
    handled: &mut HandledSet,
) -> Option<InboundMessage> {
    let payload = n.payload.as_ref()?;
    if payload.kind.as_deref() != Some(NEW_MESSAGE) {
        return None;
    }
    if n.conversation_id.as_deref() != Some(scope.conversation_id) {
        return None;
    }
    if n.sender.as_deref() == Some(scope.user_id) {
        return None;
    }
    if handled.contains(&n.id) {
        return None;
    }
    handled.insert(n.id.clone());

    let message = payload
        .external_chat_message
        .as_ref()
        .and_then(|m| m.message_payload.as_ref());
    Some(InboundMessage {
        sender: BOT_SENDER.to_string(),
        message_text: message
            .and_then(|m| m.text.clone())
            .unwrap_or_default(),
        buttons: message.map(buttons).unwrap_or_default(),
        source_data: n.source.clone(),
    })
}

/// Sort by creation time (stable) and translate in that order.
pub fn translate_batch(
    mut notifications: Vec<Notification>,
    scope: TranslateScope<'_>,
    handled: &mut HandledSet,
) -> Vec<InboundMessage> {
    notifications.sort_by_key(|n| n.creation_time);
    notifications
        .iter()
        .filter_map(|n| translate(n, scope, handled))
        .collect()
}

fn buttons(m: &MessagePayload) -> Vec<Button> {
    let attachment = m.attachment.iter().flat_map(|a| &a.buttons).map(|b| {
        let title = b.title.clone().unwrap_or_default();
        let payload = b
            .url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| title.clone());
        Button {
            text: title,
            payload,
        }
    });
    let quick_replies = m
        .quick_replies
        .iter()
        .flat_map(|q| &q.buttons)
        .map(|b| Button {
            text: b.title.clone().unwrap_or_default(),
            payload: b.payload.clone().unwrap_or_default(),
        });
    attachment.chain(quick_replies).collect()
}
