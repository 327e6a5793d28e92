//! Live loopback pairing between a remote and a viewer session.
//!
//! These tests run real WebRTC negotiation in-process. No ICE servers are
//! configured; host candidates on the loopback interface are sufficient.

use std::sync::Arc;
use std::time::Duration;

use beam_core::signal::{self, SdpKind, SessionDescription, SignalBundle};
use beam_core::{ConfigDelta, ConfigState, Envelope, Role, SessionStatus};
use peerdeck_session::{PeerSession, SessionConfig, SessionError};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

fn loopback_config() -> SessionConfig {
    SessionConfig {
        ice_servers: Vec::new(),
        gather_timeout: Duration::from_secs(2),
        heartbeat_interval: Duration::from_millis(400),
        ..SessionConfig::default()
    }
}

async fn wait_for_status(rx: &mut UnboundedReceiver<SessionStatus>, want: SessionStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    loop {
        let status = tokio::time::timeout_at(deadline, rx.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for status {want}"))
            .expect("status stream closed");
        if status == want {
            return;
        }
    }
}

async fn wait_for_terminal(rx: &mut UnboundedReceiver<SessionStatus>) -> SessionStatus {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    loop {
        let status = tokio::time::timeout_at(deadline, rx.recv())
            .await
            .expect("timed out waiting for a terminal status")
            .expect("status stream closed");
        if status.is_terminal() {
            return status;
        }
    }
}

async fn recv_envelope(rx: &mut UnboundedReceiver<Envelope>) -> Envelope {
    timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for an envelope")
        .expect("envelope stream closed")
}

#[tokio::test(flavor = "multi_thread")]
async fn full_pairing_exchange() -> anyhow::Result<()> {
    let (remote, mut remote_events) = PeerSession::new(Role::Remote, loopback_config()).await?;
    let (viewer, mut viewer_events) = PeerSession::new(Role::Viewer, loopback_config()).await?;

    let offer = remote.create_offer().await?;
    assert_eq!(
        remote_events.status.try_recv()?,
        SessionStatus::BuildingOffer
    );
    assert_eq!(
        remote_events.status.try_recv()?,
        SessionStatus::AwaitingAnswer
    );

    let answer = viewer.accept_offer(&offer).await?;
    remote.apply_answer(&answer).await?;

    wait_for_status(&mut remote_events.status, SessionStatus::Connected).await;
    wait_for_status(&mut viewer_events.status, SessionStatus::Connected).await;

    remote
        .send(&Envelope::ConfigReplace {
            full: ConfigState::default(),
        })
        .await?;
    remote
        .send(&Envelope::ConfigUpdate {
            delta: ConfigDelta {
                brightness: Some(90),
                ..ConfigDelta::default()
            },
        })
        .await?;

    match recv_envelope(&mut viewer_events.envelopes).await {
        Envelope::ConfigReplace { full } => assert_eq!(full, ConfigState::default()),
        other => panic!("expected config:replace, got {other:?}"),
    }
    match recv_envelope(&mut viewer_events.envelopes).await {
        Envelope::ConfigUpdate { delta } => assert_eq!(delta.brightness, Some(90)),
        other => panic!("expected config:update, got {other:?}"),
    }

    viewer
        .send(&Envelope::ViewerEvent {
            event: "overlay-rendered".to_string(),
        })
        .await?;
    match recv_envelope(&mut remote_events.envelopes).await {
        Envelope::ViewerEvent { event } => assert_eq!(event, "overlay-rendered"),
        other => panic!("expected viewer:event, got {other:?}"),
    }

    // Several heartbeat intervals pass; pings flow underneath but system
    // frames must never reach the application streams.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(matches!(
        remote_events.envelopes.try_recv(),
        Err(TryRecvError::Empty)
    ));
    assert!(matches!(
        viewer_events.envelopes.try_recv(),
        Err(TryRecvError::Empty)
    ));

    remote.close().await;
    wait_for_status(&mut remote_events.status, SessionStatus::Closed).await;
    assert!(matches!(
        remote.send(&Envelope::Ping).await,
        Err(SessionError::ChannelNotReady)
    ));

    let viewer_end = wait_for_terminal(&mut viewer_events.status).await;
    assert!(viewer_end.is_terminal());

    viewer.close().await;
    assert_eq!(viewer.status(), SessionStatus::Closed);
    Ok(())
}

/// Pairs a remote session with a raw responder peer so the wire itself is
/// observable; a second engine would consume system frames before they
/// could be counted. The first ping must land within one heartbeat
/// interval of channel open.
#[tokio::test(flavor = "multi_thread")]
async fn ping_flows_within_one_interval_of_open() -> anyhow::Result<()> {
    let heartbeat_interval = Duration::from_millis(400);
    let config = SessionConfig {
        heartbeat_interval,
        ..loopback_config()
    };
    let (remote, _remote_events) = PeerSession::new(Role::Remote, config).await?;

    let api = APIBuilder::new().build();
    let responder = Arc::new(api.new_peer_connection(RTCConfiguration::default()).await?);

    let (open_tx, mut open_rx) = tokio::sync::mpsc::unbounded_channel();
    let (ping_tx, mut ping_rx) = tokio::sync::mpsc::unbounded_channel();
    responder.on_data_channel(Box::new(move |dc| {
        let open_tx = open_tx.clone();
        let ping_tx = ping_tx.clone();
        Box::pin(async move {
            dc.on_open(Box::new(move || {
                let open_tx = open_tx.clone();
                Box::pin(async move {
                    let _ = open_tx.send(());
                })
            }));
            dc.on_message(Box::new(move |msg| {
                let ping_tx = ping_tx.clone();
                Box::pin(async move {
                    if matches!(Envelope::from_frame(&msg.data), Ok(Envelope::Ping)) {
                        let _ = ping_tx.send(());
                    }
                })
            }));
        })
    }));

    let offer = signal::decode(&remote.create_offer().await?)?;
    responder
        .set_remote_description(RTCSessionDescription::offer(offer.description.sdp)?)
        .await?;
    for candidate in offer.candidates {
        responder
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: candidate.username_fragment,
            })
            .await?;
    }

    let answer = responder.create_answer(None).await?;
    let mut gather_done = responder.gathering_complete_promise().await;
    responder.set_local_description(answer).await?;
    let _ = timeout(Duration::from_secs(2), gather_done.recv()).await;
    let local = responder
        .local_description()
        .await
        .expect("answer installed");
    // Gathering completed above, so the SDP carries the candidates.
    let answer_signal = signal::encode(&SignalBundle {
        description: SessionDescription {
            kind: SdpKind::Answer,
            sdp: local.sdp,
        },
        candidates: Vec::new(),
    })?;
    remote.apply_answer(&answer_signal).await?;

    timeout(Duration::from_secs(20), open_rx.recv())
        .await
        .expect("channel never opened")
        .expect("open stream closed");
    timeout(heartbeat_interval + Duration::from_millis(700), ping_rx.recv())
        .await
        .expect("no ping within one interval of channel open")
        .expect("ping stream closed");

    remote.close().await;
    responder.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_offers_restart_negotiation() -> anyhow::Result<()> {
    let (remote, mut remote_events) = PeerSession::new(Role::Remote, loopback_config()).await?;

    let first = remote.create_offer().await?;
    let second = remote.create_offer().await?;
    assert_ne!(first, second);

    // Each call edges through building-offer and awaiting-answer.
    assert_eq!(
        remote_events.status.try_recv()?,
        SessionStatus::BuildingOffer
    );
    assert_eq!(
        remote_events.status.try_recv()?,
        SessionStatus::AwaitingAnswer
    );
    assert_eq!(
        remote_events.status.try_recv()?,
        SessionStatus::BuildingOffer
    );
    assert_eq!(
        remote_events.status.try_recv()?,
        SessionStatus::AwaitingAnswer
    );

    remote.close().await;
    Ok(())
}

#[tokio::test]
async fn malformed_offer_leaves_status_untouched() -> anyhow::Result<()> {
    let (viewer, _events) = PeerSession::new(Role::Viewer, loopback_config()).await?;
    let err = viewer.accept_offer("d:%%%not-base64%%%").await.unwrap_err();
    assert!(matches!(err, SessionError::Decode(_)));
    assert_eq!(viewer.status(), SessionStatus::Idle);
    viewer.close().await;
    Ok(())
}
