//! Live-chat connector.
//!
//! [`Connector`] owns one vendor session: the handshake and conversation creation, the
//! notification poll loop that turns vendor events into [`BotReply`] values for the harness,
//! and outbound user messages. An [`OrderingGate`] keeps replies behind any send still in
//! flight so the harness sees the conversation in order.

mod api;
mod gate;
mod inbound;
mod outbound;
mod poll;
mod session;

pub use api::{
    Conversation, HandshakeRequest, HandshakeResponse, HttpLiveChatApi, LiveChatApi,
    NewConversationRequest, Notification, NotificationPage, SendMessageRequest,
};
pub use gate::{GateHandle, OrderingGate, SendGuard};
pub use inbound::{translate, translate_batch, BotReply, Button, HandledSet, InboundMessage, TranslateScope};
pub use outbound::UserUtterance;
pub use poll::FETCH_PAGE_SIZE;
pub use session::{Connector, Session};
