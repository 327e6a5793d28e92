use beam_core::signal::{DecodeError, EncodeError};
use beam_core::Role;

/// Errors surfaced by [`PeerSession`](crate::PeerSession) operations.
///
/// Negotiation and decode failures abort only the operation that raised
/// them; the session keeps its last status and can be retried or closed.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("signal decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("signal encode failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("negotiation failed: {0}")]
    Negotiation(#[from] webrtc::Error),

    /// The data channel does not exist yet or is not open.
    #[error("data channel is not open")]
    ChannelNotReady,

    #[error("operation {operation} is not available to the {role} role")]
    WrongRole {
        role: Role,
        operation: &'static str,
    },

    #[error("negotiation produced no local description")]
    NoLocalDescription,

    #[error("unsupported description type {0}")]
    UnsupportedDescription(String),
}
