//! Keepalive pings over the session data channel.
//!
//! One task per open channel. The task only ever writes `system:ping`
//! frames; pong replies are produced by the channel's message handler.

use std::sync::Arc;
use std::time::Duration;

use beam_core::Envelope;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;

/// Spawns the ping loop for an open channel.
///
/// The first ping is sent one full interval after the channel opens.
/// The task never stops itself; the owner aborts it when the channel
/// closes or the session ends.
pub(crate) fn spawn(channel: Arc<RTCDataChannel>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval() fires immediately; swallow that tick so pings are
        // spaced a full interval apart from channel open.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if channel.ready_state() != RTCDataChannelState::Open {
                continue;
            }
            if let Err(err) = channel.send_text(Envelope::Ping.to_frame()).await {
                debug!("heartbeat ping failed: {err}");
            }
        }
    })
}
