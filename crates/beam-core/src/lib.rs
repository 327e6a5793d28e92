//! Core BEAM pairing protocol types and codecs.
//!
//! This crate provides:
//! - The signal codec for transportable negotiation bundles
//! - Message envelopes carried over the open data channel
//! - Config state with partial-merge semantics
//! - Peer roles and session status
//!
//! It is transport-agnostic: nothing here depends on WebRTC or an async
//! runtime, so every wire behavior can be tested in isolation.

#![forbid(unsafe_code)]

pub mod envelope;
pub mod signal;

pub use envelope::{AccentColor, ConfigDelta, ConfigState, Envelope, OverlayMode};
pub use signal::{CandidateInit, SdpKind, SessionDescription, SignalBundle};

use serde::{Deserialize, Serialize};

/// Which side of the pairing this peer plays.
///
/// The role is fixed at session construction. The remote is the initiator:
/// it creates the data channel and produces the offer. The viewer responds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Display side; applies config it receives, never originates changes.
    Viewer,
    /// Controller side; sole authority over the config state.
    Remote,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Viewer => write!(f, "viewer"),
            Role::Remote => write!(f, "remote"),
        }
    }
}

/// Lifecycle status of one pairing session.
///
/// `Closed` and `Error` are terminal for the session instance; recovery means
/// building a new session with the same role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Idle,
    BuildingOffer,
    AwaitingAnswer,
    Connecting,
    Connected,
    Closed,
    Error,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Closed | SessionStatus::Error)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::BuildingOffer => "building-offer",
            SessionStatus::AwaitingAnswer => "awaiting-answer",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
            SessionStatus::Closed => "closed",
            SessionStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}
