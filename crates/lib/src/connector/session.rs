//! Session manager: handshake, conversation creation, poll loop lifecycle and user sends.

use crate::config::{Capabilities, Environment};
use crate::connector::api::{
    HandshakeRequest, HttpLiveChatApi, LiveChatApi, NewConversationRequest,
};
use crate::connector::gate::OrderingGate;
use crate::connector::inbound::BotReply;
use crate::connector::outbound::{send_utterance, UserUtterance};
use crate::connector::poll::{PollContext, PollLoop};
use crate::error::{ApiError, SendError, SessionError, StartError, ValidationError};
use std::sync::Arc;
use tokio::sync::mpsc;

/// An established vendor session. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub session_token: String,
    pub user_id: String,
    pub conversation_id: String,
    pub environment: Option<Environment>,
}

struct ActiveSession {
    session: Session,
    api: Arc<dyn LiveChatApi>,
    poller: PollLoop,
}

/// One connector instance: at most one active session, its poll loop and ordering gate.
///
/// Bot replies (and poll failure reports) are delivered on the `replies` channel given at
/// construction; the harness drains it.
pub struct Connector {
    caps: Capabilities,
    api: Option<Arc<dyn LiveChatApi>>,
    replies: mpsc::Sender<BotReply>,
    gate: Arc<OrderingGate>,
    active: Option<ActiveSession>,
}

impl Connector {
    /// Connector talking HTTP to the API root derived from `caps`.
    pub fn new(caps: Capabilities, replies: mpsc::Sender<BotReply>) -> Self {
        Self {
            caps,
            api: None,
            replies,
            gate: Arc::new(OrderingGate::new()),
            active: None,
        }
    }

    /// Connector using the given API implementation instead of HTTP.
    pub fn with_api(
        caps: Capabilities,
        api: Arc<dyn LiveChatApi>,
        replies: mpsc::Sender<BotReply>,
    ) -> Self {
        Self {
            caps,
            api: Some(api),
            replies,
            gate: Arc::new(OrderingGate::new()),
            active: None,
        }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.caps.validate()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn session(&self) -> Option<&Session> {
        self.active.as_ref().map(|a| &a.session)
    }

    /// True while the active session's poll loop is polling.
    pub fn is_polling(&self) -> bool {
        self.active
            .as_ref()
            .map(|a| a.poller.is_running())
            .unwrap_or(false)
    }

    /// Validate, handshake, create a conversation and start polling.
    pub async fn start(&mut self) -> Result<&Session, StartError> {
        self.validate()?;
        if self.active.is_some() {
            log::warn!("start called with an active session; stopping it first");
            self.stop();
        }
        let api: Arc<dyn LiveChatApi> = match &self.api {
            Some(api) => Arc::clone(api),
            None => Arc::new(HttpLiveChatApi::new(self.caps.base_url()?)),
        };

        let session = establish_session(api.as_ref(), &self.caps).await?;
        log::info!(
            "session established: conversation {} user {}",
            session.conversation_id,
            session.user_id
        );

        let poller = PollLoop::start(PollContext {
            api: Arc::clone(&api),
            gate: Arc::clone(&self.gate),
            replies: self.replies.clone(),
            session_token: session.session_token.clone(),
            conversation_id: session.conversation_id.clone(),
            user_id: session.user_id.clone(),
            interval: self.caps.poll_interval(),
        });
        let active = self.active.insert(ActiveSession {
            session,
            api,
            poller,
        });
        Ok(&active.session)
    }

    /// Send a user message to the active conversation.
    pub async fn send_user_utterance(
        &self,
        utterance: impl Into<UserUtterance>,
    ) -> Result<(), SendError> {
        let utterance = utterance.into();
        let active = self.active.as_ref().ok_or(SendError::NotActive)?;
        log::debug!("user says: {:?}", utterance.message_text);
        send_utterance(
            active.api.as_ref(),
            &self.gate,
            &active.session.session_token,
            &active.session.conversation_id,
            &utterance,
        )
        .await
    }

    /// Stop polling and discard the session. No-op (logged) when inactive.
    pub fn stop(&mut self) {
        match self.active.take() {
            Some(active) => {
                // The task exits on its own at the next cycle boundary.
                let _ = active.poller.stop();
                self.gate.reset();
                log::info!(
                    "session stopped: conversation {}",
                    active.session.conversation_id
                );
            }
            None => log::debug!("stop called without an active session"),
        }
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        if self.active.is_some() {
            self.stop();
        }
    }
}

fn handshake_request(caps: &Capabilities) -> Result<HandshakeRequest, StartError> {
    let mut req = HandshakeRequest {
        app_id: caps.app_id().to_string(),
        page: caps.landing_page_url().to_string(),
        timezone: caps.timezone().to_string(),
        user_agent: caps.user_agent().to_string(),
        fallback_locales: caps.fallback_locales().map(str::to_string),
        custom_context: caps.custom_context()?,
        ..Default::default()
    };
    if let Some(user) = caps.chat_user()? {
        let secret = caps.api_key().ok_or(ValidationError::ChatUserWithoutApiKey)?;
        let signed = user.sign(secret);
        req.chat_user = Some(signed.payload);
        req.chat_user_signature = Some(signed.signature);
    }
    Ok(req)
}

async fn establish_session(
    api: &dyn LiveChatApi,
    caps: &Capabilities,
) -> Result<Session, StartError> {
    let req = handshake_request(caps)?;
    let handshake = api
        .handshake(&req)
        .await
        .map_err(SessionError::Handshake)?;
    let user_id = handshake
        .user_id()
        .ok_or_else(|| {
            SessionError::Handshake(ApiError::Decode(
                "handshake response has neither chatUser.userId nor anonymousId".to_string(),
            ))
        })?
        .to_string();
    log::debug!("handshake successful, user id {}", user_id);

    let conversation = api
        .new_conversation(
            &handshake.chat_session_token,
            &NewConversationRequest {
                app_id: caps.app_id().to_string(),
                started_by_context: caps.started_by_context()?,
            },
        )
        .await
        .map_err(SessionError::CreateConversation)?;

    Ok(Session {
        session_token: handshake.chat_session_token,
        user_id,
        conversation_id: conversation.id,
        environment: caps.environment,
    })
}
