//! Peer session engine: one WebRTC connection, one config data channel.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use beam_core::signal::{self, CandidateInit, SdpKind, SessionDescription, SignalBundle};
use beam_core::{Envelope, Role, SessionStatus};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use crate::error::SessionError;
use crate::heartbeat;

/// Default public STUN server used when no ICE servers are configured.
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Tuning knobs for a [`PeerSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// STUN/TURN server URLs handed to the ICE agent.
    pub ice_servers: Vec<String>,
    /// Upper bound on candidate gathering before a signal is emitted.
    pub gather_timeout: Duration,
    /// Spacing between keepalive pings while the channel is open.
    pub heartbeat_interval: Duration,
    /// Label of the negotiated data channel.
    pub channel_label: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![DEFAULT_STUN_SERVER.to_string()],
            gather_timeout: Duration::from_millis(3500),
            heartbeat_interval: Duration::from_secs(8),
            channel_label: "config".to_string(),
        }
    }
}

/// Receiver halves for session notifications.
///
/// Status changes are edge-triggered: every transition is delivered once,
/// in order, with no coalescing. Envelopes carry application traffic only;
/// `system:*` frames are consumed by the engine and never appear here.
pub struct SessionEvents {
    pub status: mpsc::UnboundedReceiver<SessionStatus>,
    pub envelopes: mpsc::UnboundedReceiver<Envelope>,
}

/// One pairing session for a fixed role.
///
/// The remote initiates: it owns the data channel and produces offers.
/// The viewer responds to an offer with an answer and waits for the
/// channel to arrive. A session is single-use; after `closed` or `error`
/// the caller builds a fresh one.
pub struct PeerSession {
    role: Role,
    config: SessionConfig,
    pc: Arc<RTCPeerConnection>,
    shared: Arc<Shared>,
}

struct Shared {
    status: Mutex<SessionStatus>,
    status_tx: mpsc::UnboundedSender<SessionStatus>,
    envelope_tx: mpsc::UnboundedSender<Envelope>,
    channel: Mutex<Option<Arc<RTCDataChannel>>>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    heartbeat_interval: Duration,
    candidates: Mutex<Vec<CandidateInit>>,
}

impl Shared {
    /// Moves to `next` if it differs from the current status. Duplicate
    /// transitions are dropped so subscribers only see edges.
    fn advance(&self, next: SessionStatus) -> bool {
        let mut current = self.status.lock().unwrap();
        if *current == next {
            return false;
        }
        debug!(from = %*current, to = %next, "session status");
        *current = next;
        let _ = self.status_tx.send(next);
        true
    }

    fn status(&self) -> SessionStatus {
        *self.status.lock().unwrap()
    }

    /// Starts the ping loop unless one is already running.
    fn start_heartbeat(&self, channel: Arc<RTCDataChannel>) {
        let mut slot = self.heartbeat.lock().unwrap();
        if slot.is_some() {
            return;
        }
        *slot = Some(heartbeat::spawn(channel, self.heartbeat_interval));
    }

    fn start_heartbeat_if_open(&self) {
        let channel = self.channel.lock().unwrap().clone();
        if let Some(channel) = channel {
            if channel.ready_state() == RTCDataChannelState::Open {
                self.start_heartbeat(channel);
            }
        }
    }

    fn stop_heartbeat(&self) {
        if let Some(handle) = self.heartbeat.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Applies a connection state change: the status edge plus the
    /// heartbeat stop/restart side effects. A recovered connection only
    /// restarts the ping loop if the channel survived the disruption.
    fn handle_connection_state(&self, state: RTCPeerConnectionState) {
        let Some(next) = status_for_connection_state(state) else {
            return;
        };
        match next {
            SessionStatus::Connected => {
                self.advance(next);
                self.start_heartbeat_if_open();
            }
            _ => {
                self.stop_heartbeat();
                self.advance(next);
            }
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.stop_heartbeat();
    }
}

/// Session status implied by a peer connection state change, if any.
///
/// `disconnected` maps back to `connecting` because ICE may still recover;
/// `failed` is terminal.
fn status_for_connection_state(state: RTCPeerConnectionState) -> Option<SessionStatus> {
    match state {
        RTCPeerConnectionState::Connected => Some(SessionStatus::Connected),
        RTCPeerConnectionState::Disconnected => Some(SessionStatus::Connecting),
        RTCPeerConnectionState::Failed => Some(SessionStatus::Error),
        RTCPeerConnectionState::Closed => Some(SessionStatus::Closed),
        _ => None,
    }
}

impl PeerSession {
    /// Builds a session and its notification receivers.
    ///
    /// No network activity happens until the first negotiation call.
    pub async fn new(
        role: Role,
        config: SessionConfig,
    ) -> Result<(Self, SessionEvents), SessionError> {
        let api = APIBuilder::new().build();
        let rtc_config = RTCConfiguration {
            ice_servers: config
                .ice_servers
                .iter()
                .map(|url| RTCIceServer {
                    urls: vec![url.clone()],
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        let pc = Arc::new(api.new_peer_connection(rtc_config).await?);

        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let (envelope_tx, envelope_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            status: Mutex::new(SessionStatus::Idle),
            status_tx,
            envelope_tx,
            channel: Mutex::new(None),
            heartbeat: Mutex::new(None),
            heartbeat_interval: config.heartbeat_interval,
            candidates: Mutex::new(Vec::new()),
        });

        {
            let shared = shared.clone();
            pc.on_ice_candidate(Box::new(move |candidate| {
                let shared = shared.clone();
                Box::pin(async move {
                    let Some(candidate) = candidate else { return };
                    match candidate.to_json() {
                        Ok(init) => shared.candidates.lock().unwrap().push(CandidateInit {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                            username_fragment: init.username_fragment,
                        }),
                        Err(err) => warn!("dropping unserializable ICE candidate: {err}"),
                    }
                })
            }));
        }

        {
            let shared = shared.clone();
            pc.on_peer_connection_state_change(Box::new(move |state| {
                let shared = shared.clone();
                Box::pin(async move {
                    shared.handle_connection_state(state);
                })
            }));
        }

        match role {
            Role::Remote => {
                let channel = pc.create_data_channel(&config.channel_label, None).await?;
                wire_channel(&shared, channel);
            }
            Role::Viewer => {
                let shared = shared.clone();
                pc.on_data_channel(Box::new(move |channel| {
                    wire_channel(&shared, channel);
                    Box::pin(async {})
                }));
            }
        }

        Ok((
            Self {
                role,
                config,
                pc,
                shared,
            },
            SessionEvents {
                status: status_rx,
                envelopes: envelope_rx,
            },
        ))
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.status()
    }

    /// Remote only. Produces an encoded offer signal for out-of-band
    /// delivery. Repeat calls restart ICE and yield a fresh offer.
    pub async fn create_offer(&self) -> Result<String, SessionError> {
        self.require_role(Role::Remote, "create_offer")?;
        self.shared.advance(SessionStatus::BuildingOffer);
        let options = RTCOfferOptions {
            ice_restart: true,
            ..Default::default()
        };
        let offer = self.pc.create_offer(Some(options)).await?;
        let bundle = self.install_local_description(offer).await?;
        self.shared.advance(SessionStatus::AwaitingAnswer);
        Ok(signal::encode(&bundle)?)
    }

    /// Viewer only. Consumes an offer signal and produces the encoded
    /// answer signal to hand back to the remote.
    pub async fn accept_offer(&self, offer_signal: &str) -> Result<String, SessionError> {
        self.require_role(Role::Viewer, "accept_offer")?;
        let bundle = signal::decode(offer_signal)?;
        self.pc
            .set_remote_description(to_rtc_description(&bundle.description)?)
            .await?;
        self.add_candidates(bundle.candidates).await?;
        let answer = self.pc.create_answer(None).await?;
        let bundle = self.install_local_description(answer).await?;
        self.shared.advance(SessionStatus::Connecting);
        Ok(signal::encode(&bundle)?)
    }

    /// Remote only. Consumes the viewer's answer signal; the connection
    /// then progresses on its own.
    pub async fn apply_answer(&self, answer_signal: &str) -> Result<(), SessionError> {
        self.require_role(Role::Remote, "apply_answer")?;
        let bundle = signal::decode(answer_signal)?;
        self.pc
            .set_remote_description(to_rtc_description(&bundle.description)?)
            .await?;
        self.add_candidates(bundle.candidates).await?;
        self.shared.advance(SessionStatus::Connecting);
        Ok(())
    }

    /// Sends one envelope over the data channel.
    ///
    /// Fails with [`SessionError::ChannelNotReady`] unless the channel
    /// exists and is open; nothing is queued.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), SessionError> {
        let channel = self.shared.channel.lock().unwrap().clone();
        let channel = channel.ok_or(SessionError::ChannelNotReady)?;
        if channel.ready_state() != RTCDataChannelState::Open {
            return Err(SessionError::ChannelNotReady);
        }
        channel.send_text(envelope.to_frame()).await.map_err(|err| {
            debug!("send on closing channel: {err}");
            SessionError::ChannelNotReady
        })?;
        Ok(())
    }

    /// Tears the session down. Safe to call repeatedly; always leaves the
    /// status at `closed`.
    pub async fn close(&self) {
        self.shared.stop_heartbeat();
        let channel = self.shared.channel.lock().unwrap().take();
        if let Some(channel) = channel {
            if let Err(err) = channel.close().await {
                debug!("data channel close: {err}");
            }
        }
        if let Err(err) = self.pc.close().await {
            debug!("peer connection close: {err}");
        }
        self.shared.advance(SessionStatus::Closed);
    }

    fn require_role(&self, required: Role, operation: &'static str) -> Result<(), SessionError> {
        if self.role == required {
            Ok(())
        } else {
            Err(SessionError::WrongRole {
                role: self.role,
                operation,
            })
        }
    }

    /// Installs a local description and waits for candidate gathering,
    /// bounded by the configured timeout. Candidates gathered after the
    /// bound are dropped; they are never retransmitted.
    async fn install_local_description(
        &self,
        description: RTCSessionDescription,
    ) -> Result<SignalBundle, SessionError> {
        self.shared.candidates.lock().unwrap().clear();
        let mut gather_done = self.pc.gathering_complete_promise().await;
        self.pc.set_local_description(description).await?;
        let _ = tokio::time::timeout(self.config.gather_timeout, gather_done.recv()).await;
        let local = self
            .pc
            .local_description()
            .await
            .ok_or(SessionError::NoLocalDescription)?;
        let description = to_wire_description(&local)?;
        let candidates = self.shared.candidates.lock().unwrap().clone();
        Ok(SignalBundle {
            description,
            candidates,
        })
    }

    async fn add_candidates(&self, candidates: Vec<CandidateInit>) -> Result<(), SessionError> {
        for candidate in candidates {
            self.pc
                .add_ice_candidate(RTCIceCandidateInit {
                    candidate: candidate.candidate,
                    sdp_mid: candidate.sdp_mid,
                    sdp_mline_index: candidate.sdp_mline_index,
                    username_fragment: candidate.username_fragment,
                })
                .await?;
        }
        Ok(())
    }
}

/// Adopts a data channel into the session: stores it and hooks up the
/// open/close/error/message handlers. Called once per session, from the
/// creating side for the remote and from `on_data_channel` for the viewer.
fn wire_channel(shared: &Arc<Shared>, channel: Arc<RTCDataChannel>) {
    *shared.channel.lock().unwrap() = Some(channel.clone());

    {
        let shared = shared.clone();
        let opened = channel.clone();
        channel.on_open(Box::new(move || {
            let shared = shared.clone();
            let opened = opened.clone();
            Box::pin(async move {
                shared.advance(SessionStatus::Connected);
                shared.start_heartbeat(opened);
            })
        }));
    }

    {
        let shared = shared.clone();
        channel.on_close(Box::new(move || {
            let shared = shared.clone();
            Box::pin(async move {
                shared.stop_heartbeat();
                shared.advance(SessionStatus::Closed);
            })
        }));
    }

    {
        let shared = shared.clone();
        channel.on_error(Box::new(move |err| {
            let shared = shared.clone();
            Box::pin(async move {
                warn!("data channel error: {err}");
                shared.stop_heartbeat();
                shared.advance(SessionStatus::Error);
            })
        }));
    }

    {
        let shared = shared.clone();
        let reply_channel = channel.clone();
        channel.on_message(Box::new(move |message| {
            let shared = shared.clone();
            let reply_channel = reply_channel.clone();
            Box::pin(async move {
                let envelope = match Envelope::from_frame(&message.data) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        warn!("dropping malformed frame: {err}");
                        return;
                    }
                };
                if let Some(reply) = envelope.reply() {
                    if let Err(err) = reply_channel.send_text(reply.to_frame()).await {
                        debug!("pong send failed: {err}");
                    }
                }
                if envelope.is_system() {
                    return;
                }
                let _ = shared.envelope_tx.send(envelope);
            })
        }));
    }
}

fn to_wire_description(
    description: &RTCSessionDescription,
) -> Result<SessionDescription, SessionError> {
    let kind = match description.sdp_type {
        RTCSdpType::Offer => SdpKind::Offer,
        RTCSdpType::Answer => SdpKind::Answer,
        other => return Err(SessionError::UnsupportedDescription(other.to_string())),
    };
    Ok(SessionDescription {
        kind,
        sdp: description.sdp.clone(),
    })
}

fn to_rtc_description(
    description: &SessionDescription,
) -> Result<RTCSessionDescription, SessionError> {
    let rtc = match description.kind {
        SdpKind::Offer => RTCSessionDescription::offer(description.sdp.clone())?,
        SdpKind::Answer => RTCSessionDescription::answer(description.sdp.clone())?,
    };
    Ok(rtc)
}
