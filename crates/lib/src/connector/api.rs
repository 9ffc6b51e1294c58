//! Live-chat vendor REST API: wire types and the HTTP client.
//!
//! Four calls: handshake, conversation/new, event/fetch-notifications, conversation/send.
//! Conversation-scoped calls carry the handshake's session token in `x-chat-token`.

use crate::error::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

const CHAT_TOKEN_HEADER: &str = "x-chat-token";

/// Body of `POST /handshake/appHandshake`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeRequest {
    pub app_id: String,
    pub page: String,
    pub timezone: String,
    pub user_agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_locales: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_user_signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_context: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeResponse {
    pub chat_session_token: String,
    #[serde(default)]
    pub anonymous_id: Option<String>,
    #[serde(default)]
    pub chat_user: Option<HandshakeChatUser>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeChatUser {
    #[serde(default)]
    pub user_id: Option<String>,
}

impl HandshakeResponse {
    /// Identified chat user's id, falling back to the anonymous id.
    pub fn user_id(&self) -> Option<&str> {
        self.chat_user
            .as_ref()
            .and_then(|u| u.user_id.as_deref())
            .filter(|s| !s.is_empty())
            .or_else(|| self.anonymous_id.as_deref().filter(|s| !s.is_empty()))
    }
}

/// Body of `POST /conversation/new`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConversationRequest {
    pub app_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_by_context: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Conversation {
    pub id: String,
}

/// Body of `POST /conversation/send`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub conversation_id: String,
    pub message_payload: OutgoingPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingPayload {
    pub text: String,
    pub message_type: String,
}

/// One page of `GET /event/fetch-notifications`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub after_cursor: Option<Value>,
    #[serde(default)]
    pub before_cursor: Option<Value>,
}

impl NotificationPage {
    /// Decoded notifications, raw JSON kept as `source`. Entries that do not decode are skipped.
    pub fn notifications(&self) -> Vec<Notification> {
        self.results
            .iter()
            .filter_map(|raw| match Notification::from_value(raw.clone()) {
                Ok(n) => Some(n),
                Err(e) => {
                    log::warn!("skipping undecodable notification: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Cursor to pass to the next fetch, if the vendor returned one.
    pub fn after_cursor(&self) -> Option<String> {
        cursor_string(self.after_cursor.as_ref())
    }

    pub fn before_cursor(&self) -> Option<String> {
        cursor_string(self.before_cursor.as_ref())
    }
}

fn cursor_string(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Vendor event describing conversation activity.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "epoch_millis")]
    pub creation_time: i64,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub payload: Option<NotificationPayload>,
    #[serde(skip)]
    pub source: Value,
}

impl Notification {
    pub fn from_value(raw: Value) -> Result<Self, serde_json::Error> {
        let mut n: Notification = serde_json::from_value(raw.clone())?;
        n.source = raw;
        Ok(n)
    }
}

/// Ids arrive as strings or numbers; both key the handled set as text.
fn id_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "notification id must be a string or number, got {}",
            other
        ))),
    }
}

/// Creation time in epoch millis. Fractional and numeric-string values are accepted; anything
/// else sorts first.
fn epoch_millis<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let millis = match Value::deserialize(d)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    };
    Ok(millis.unwrap_or(0))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub external_chat_message: Option<ExternalChatMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalChatMessage {
    #[serde(default)]
    pub message_payload: Option<MessagePayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    #[serde(default)]
    pub quick_replies: Option<QuickReplies>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub buttons: Vec<AttachmentButton>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttachmentButton {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuickReplies {
    #[serde(default)]
    pub buttons: Vec<QuickReplyButton>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuickReplyButton {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub payload: Option<String>,
}

/// The vendor calls the connector depends on. Implemented over HTTP by [`HttpLiveChatApi`].
#[async_trait]
pub trait LiveChatApi: Send + Sync {
    async fn handshake(&self, req: &HandshakeRequest) -> Result<HandshakeResponse, ApiError>;

    async fn new_conversation(
        &self,
        token: &str,
        req: &NewConversationRequest,
    ) -> Result<Conversation, ApiError>;

    async fn fetch_notifications(
        &self,
        token: &str,
        size: u32,
        cursor: Option<&str>,
    ) -> Result<NotificationPage, ApiError>;

    async fn send_message(&self, token: &str, req: &SendMessageRequest) -> Result<(), ApiError>;
}

/// reqwest-backed client for one API root (e.g. `https://prod2-live-chat.sprinklr.com/api/livechat/v1`).
#[derive(Clone)]
pub struct HttpLiveChatApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpLiveChatApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    if !res.status().is_success() {
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(res)
}

async fn decode<T: serde::de::DeserializeOwned>(res: reqwest::Response) -> Result<T, ApiError> {
    res.json().await.map_err(|e| ApiError::Decode(e.to_string()))
}

#[async_trait]
impl LiveChatApi for HttpLiveChatApi {
    async fn handshake(&self, req: &HandshakeRequest) -> Result<HandshakeResponse, ApiError> {
        let url = format!("{}/handshake/appHandshake", self.base_url);
        log::debug!("handshake POST {} appId={}", url, req.app_id);
        let res = self
            .client
            .post(&url)
            .header("origin", &req.page)
            .json(req)
            .send()
            .await?;
        decode(check_status(res).await?).await
    }

    async fn new_conversation(
        &self,
        token: &str,
        req: &NewConversationRequest,
    ) -> Result<Conversation, ApiError> {
        let url = format!("{}/conversation/new", self.base_url);
        log::debug!("conversation/new POST {}", url);
        let res = self
            .client
            .post(&url)
            .header(CHAT_TOKEN_HEADER, token)
            .json(req)
            .send()
            .await?;
        decode(check_status(res).await?).await
    }

    async fn fetch_notifications(
        &self,
        token: &str,
        size: u32,
        cursor: Option<&str>,
    ) -> Result<NotificationPage, ApiError> {
        let url = format!("{}/event/fetch-notifications", self.base_url);
        let mut query = vec![("size", size.to_string())];
        if let Some(c) = cursor {
            query.push(("cursor", c.to_string()));
        }
        let res = self
            .client
            .get(&url)
            .header(CHAT_TOKEN_HEADER, token)
            .query(&query)
            .send()
            .await?;
        decode(check_status(res).await?).await
    }

    async fn send_message(&self, token: &str, req: &SendMessageRequest) -> Result<(), ApiError> {
        let url = format!("{}/conversation/send", self.base_url);
        log::debug!(
            "conversation/send POST {} conversationId={}",
            url,
            req.conversation_id
        );
        let res = self
            .client
            .post(&url)
            .header(CHAT_TOKEN_HEADER, token)
            .json(req)
            .send()
            .await?;
        check_status(res).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn handshake_user_id_prefers_chat_user() {
        let res: HandshakeResponse = serde_json::from_value(json!({
            "chatSessionToken": "t1",
            "anonymousId": "anon",
            "chatUser": { "userId": "known" }
        }))
        .unwrap();
        assert_eq!(res.user_id(), Some("known"));

        let res: HandshakeResponse = serde_json::from_value(json!({
            "chatSessionToken": "t1",
            "anonymousId": "anon"
        }))
        .unwrap();
        assert_eq!(res.user_id(), Some("anon"));
    }

    #[test]
    fn handshake_request_omits_unset_optionals() {
        let req = HandshakeRequest {
            app_id: "a".into(),
            page: "https://p".into(),
            timezone: "UTC".into(),
            user_agent: "ua".into(),
            ..Default::default()
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(
            v,
            json!({ "appId": "a", "page": "https://p", "timezone": "UTC", "userAgent": "ua" })
        );
    }

    #[test]
    fn page_keeps_raw_source_and_skips_bad_entries() {
        let page: NotificationPage = serde_json::from_value(json!({
            "results": [
                { "id": "n1", "creationTime": 5, "payload": { "type": "NEW_MESSAGE" } },
                { "creationTime": 6 }
            ],
            "hasMore": false,
            "afterCursor": 1234
        }))
        .unwrap();
        let ns = page.notifications();
        assert_eq!(ns.len(), 1);
        assert_eq!(ns[0].id, "n1");
        assert_eq!(ns[0].source["creationTime"], json!(5));
        assert_eq!(page.after_cursor().as_deref(), Some("1234"));
        assert_eq!(page.before_cursor(), None);
    }

    #[test]
    fn numeric_ids_and_fractional_times_decode() {
        let page: NotificationPage = serde_json::from_value(json!({
            "results": [
                { "id": 42, "creationTime": 1700000000123.7 },
                { "id": "n2", "creationTime": "1700000000200" },
                { "id": "n3", "creationTime": null },
                { "id": { "nested": true } }
            ]
        }))
        .unwrap();
        let ns = page.notifications();
        assert_eq!(ns.len(), 3);
        assert_eq!(ns[0].id, "42");
        assert_eq!(ns[0].creation_time, 1_700_000_000_123);
        assert_eq!(ns[1].creation_time, 1_700_000_000_200);
        assert_eq!(ns[2].creation_time, 0);
        assert_eq!(ns[0].source["id"], json!(42));
    }

    #[test]
    fn http_client_trims_base_url() {
        let api = HttpLiveChatApi::new("http://localhost:1/api/");
        assert_eq!(api.base_url(), "http://localhost:1/api");
    }
}
