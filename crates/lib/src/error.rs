//! Error kinds for the connector lifecycle.
//!
//! Only [`PollError`] is recovered locally (reported to the harness as text); every other
//! kind is returned to the caller of the operation that failed.

/// Bad or incomplete capabilities, detected before any network call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} capability required")]
    Missing(&'static str),
    #[error("SPRINKL_API_KEY capability required in order to send chat user")]
    ChatUserWithoutApiKey,
    #[error("{key} is not valid JSON: {reason}")]
    InvalidJson { key: &'static str, reason: String },
    #[error("{key} must be a JSON object")]
    NotAnObject { key: &'static str },
    #[error("{key} has an invalid value: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Handshake or conversation creation failed; the session never became active.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to do handshake: {0}")]
    Handshake(#[source] ApiError),
    #[error("failed to create conversation: {0}")]
    CreateConversation(#[source] ApiError),
}

/// Error returned by `Connector::start`.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// One poll cycle failed. Rendered as text and delivered to the harness.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("failed to fetch notifications: {0}")]
    Fetch(#[source] ApiError),
}

/// An outbound user message could not be delivered to the vendor.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("failed to send message: no active session")]
    NotActive,
    #[error("failed to send message: {0}")]
    Api(#[source] ApiError),
}

/// Transport-level failure of a single vendor API call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{status} {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// HTTP status for non-success responses.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
