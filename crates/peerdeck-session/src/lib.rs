//! Peer pairing sessions over WebRTC data channels.
//!
//! This crate drives one side of a viewer/remote pairing:
//! - Offer/answer negotiation with bounded ICE candidate gathering
//! - Data channel adoption and envelope dispatch
//! - Keepalive pings while the channel is open
//! - Edge-triggered status notifications
//!
//! Wire formats live in `beam-core`; this crate owns the runtime.

#![forbid(unsafe_code)]

mod error;
mod heartbeat;
mod session;

pub use error::SessionError;
pub use session::{PeerSession, SessionConfig, SessionEvents, DEFAULT_STUN_SERVER};
