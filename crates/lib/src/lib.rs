//! Live-chat bridge library: connects a conversational-testing harness to a vendor live-chat
//! REST API (session handshake, notification polling, ordered bot-reply delivery).

pub mod config;
pub mod connector;
pub mod error;
pub mod identity;
