//! Транспорт на webrtc-rs: реальные peer connection без trickle ICE.

use crate::config::RoomConfig;
use crate::error::PeerError;
use crate::logger::{dump_selected_pair, log_candidate_summary};
use crate::media::{LocalTrack, RemoteTrack, TrackKind};
use crate::peer::ice::rtc_config;
use crate::peer::transport::{PeerLink, PeerTransport, TransportEvent, TransportFactory};
use crate::signaling::{SdpType, Signal};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_remote::TrackRemote;

type GraceTask = Arc<Mutex<Option<JoinHandle<()>>>>;

pub struct RtcTransportFactory {
    api: API,
    config: RTCConfiguration,
    gather_timeout: Duration,
    disconnect_grace: Duration,
}

impl RtcTransportFactory {
    pub fn new(config: &RoomConfig) -> Result<Self, PeerError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self {
            api,
            config: rtc_config(&config.ice_servers),
            gather_timeout: config.gather_timeout(),
            disconnect_grace: config.disconnect_grace(),
        })
    }
}

#[async_trait]
impl TransportFactory for RtcTransportFactory {
    async fn connect(
        &self,
        link: PeerLink,
        tracks: Vec<Arc<LocalTrack>>,
    ) -> Result<Box<dyn PeerTransport>, PeerError> {
        let pc = Arc::new(self.api.new_peer_connection(self.config.clone()).await?);

        let mut video_sender = None;
        for track in &tracks {
            let sender = pc.add_track(track.rtp()).await?;
            drain_rtcp(sender.clone());
            if track.kind() == TrackKind::Video {
                video_sender = Some(sender);
            }
        }

        // без локального трека всё равно хотим получать медиа участника
        for kind in [TrackKind::Video, TrackKind::Audio] {
            if !tracks.iter().any(|t| t.kind() == kind) {
                pc.add_transceiver_from_kind(
                    codec_type(kind),
                    Some(RTCRtpTransceiverInit {
                        direction: RTCRtpTransceiverDirection::Recvonly,
                        send_encodings: vec![],
                    }),
                )
                .await?;
            }
        }

        let grace: GraceTask = Arc::new(Mutex::new(None));
        watch_connection_state(&pc, link.clone(), grace.clone(), self.disconnect_grace);
        forward_remote_tracks(&pc, link.clone());

        info!(
            "[{}] peer connection created (generation {}, {} local tracks)",
            link.peer_id(),
            link.generation(),
            tracks.len()
        );

        Ok(Box::new(RtcTransport {
            peer_id: link.peer_id().to_owned(),
            pc,
            video_sender,
            grace,
            gather_timeout: self.gather_timeout,
        }))
    }
}

struct RtcTransport {
    peer_id: String,
    pc: Arc<RTCPeerConnection>,
    video_sender: Option<Arc<RTCRtpSender>>,
    grace: GraceTask,
    gather_timeout: Duration,
}

impl RtcTransport {
    /// Ждём конца сбора кандидатов и возвращаем полный SDP
    async fn gathered_local_sdp(&self, mut gather_complete: mpsc::Receiver<()>) -> Result<String, PeerError> {
        if timeout(self.gather_timeout, gather_complete.recv()).await.is_err() {
            warn!(
                "[{}] ICE gathering did not finish in {} s, sending what we have",
                self.peer_id,
                self.gather_timeout.as_secs()
            );
        }

        let local = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| PeerError::Rtc("local description missing after negotiation".into()))?;
        log_candidate_summary(&self.peer_id, &local.sdp);
        Ok(local.sdp)
    }
}

#[async_trait]
impl PeerTransport for RtcTransport {
    async fn create_offer(&self) -> Result<Signal, PeerError> {
        let offer = self.pc.create_offer(None).await?;
        let gather_complete = self.pc.gathering_complete_promise().await;
        self.pc.set_local_description(offer).await?;

        let sdp = self.gathered_local_sdp(gather_complete).await?;
        Ok(Signal::offer(sdp))
    }

    async fn accept_offer(&self, offer: Signal) -> Result<Signal, PeerError> {
        if offer.sdp_type != SdpType::Offer {
            return Err(PeerError::WrongState(format!(
                "expected offer, got {:?}",
                offer.sdp_type
            )));
        }

        let session_id = offer.id;
        self.pc
            .set_remote_description(RTCSessionDescription::offer(offer.sdp)?)
            .await?;

        let answer = self.pc.create_answer(None).await?;
        let gather_complete = self.pc.gathering_complete_promise().await;
        self.pc.set_local_description(answer).await?;

        let sdp = self.gathered_local_sdp(gather_complete).await?;
        Ok(Signal::answer(sdp, session_id))
    }

    async fn apply_answer(&self, answer: Signal) -> Result<(), PeerError> {
        let signaling_state = self.pc.signaling_state();
        if signaling_state != RTCSignalingState::HaveLocalOffer {
            return Err(PeerError::WrongState(format!(
                "cannot apply answer in signaling state {:?}",
                signaling_state
            )));
        }

        self.pc
            .set_remote_description(RTCSessionDescription::answer(answer.sdp)?)
            .await?;
        Ok(())
    }

    async fn replace_video_track(&self, track: Arc<LocalTrack>) -> Result<(), PeerError> {
        let sender = self
            .video_sender
            .as_ref()
            .ok_or_else(|| PeerError::TrackReplace("connection has no video sender".into()))?;

        sender
            .replace_track(Some(track.rtp()))
            .await
            .map_err(|e| PeerError::TrackReplace(e.to_string()))
    }

    async fn close(&self) -> Result<(), PeerError> {
        cancel_grace(&self.grace);
        self.pc.close().await?;
        Ok(())
    }
}

fn codec_type(kind: TrackKind) -> RTPCodecType {
    match kind {
        TrackKind::Video => RTPCodecType::Video,
        TrackKind::Audio => RTPCodecType::Audio,
    }
}

fn cancel_grace(grace: &GraceTask) {
    let pending = grace
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();
    if let Some(handle) = pending {
        handle.abort();
    }
}

/// RTCP нужно вычитывать, иначе не работают интерсепторы
fn drain_rtcp(sender: Arc<RTCRtpSender>) {
    tokio::spawn(async move {
        let mut rtcp_buf = vec![0u8; 1500];
        while sender.read(&mut rtcp_buf).await.is_ok() {}
    });
}

fn forward_remote_tracks(pc: &Arc<RTCPeerConnection>, link: PeerLink) {
    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>,
              _receiver: Arc<RTCRtpReceiver>,
              _transceiver: Arc<RTCRtpTransceiver>| {
            let kind = match track.kind() {
                RTPCodecType::Audio => TrackKind::Audio,
                _ => TrackKind::Video,
            };
            debug!("[{}] received remote {} track", link.peer_id(), kind);
            link.notify(TransportEvent::RemoteTrack(RemoteTrack {
                id: track.id(),
                kind,
                stream_id: track.stream_id(),
                inner: Some(track),
            }));
            Box::pin(async {})
        },
    ));
}

fn watch_connection_state(
    pc: &Arc<RTCPeerConnection>,
    link: PeerLink,
    grace: GraceTask,
    grace_period: Duration,
) {
    let pc_weak: Weak<RTCPeerConnection> = Arc::downgrade(pc);

    pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
        info!("[{}] peer connection state changed to: {:?}", link.peer_id(), st);

        match st {
            RTCPeerConnectionState::Connected => {
                cancel_grace(&grace);
                link.notify(TransportEvent::Connected);
            }

            RTCPeerConnectionState::Disconnected => {
                let mut pending = grace.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                if pending.is_some() {
                    debug!("[{}] grace period already running", link.peer_id());
                } else {
                    let link = link.clone();
                    let pc_weak = pc_weak.clone();
                    *pending = Some(tokio::spawn(async move {
                        info!(
                            "[{}] grace period started, waiting {} s",
                            link.peer_id(),
                            grace_period.as_secs()
                        );
                        sleep(grace_period).await;

                        let Some(pc) = pc_weak.upgrade() else {
                            return;
                        };
                        let state_now = pc.connection_state();
                        if state_now != RTCPeerConnectionState::Connected {
                            dump_selected_pair(&pc, "GRACE-EXPIRED").await;
                            link.notify(TransportEvent::Failed(PeerError::Rtc(format!(
                                "connection did not recover, state {:?}",
                                state_now
                            ))));
                        } else {
                            debug!("[{}] connection recovered during grace period", link.peer_id());
                        }
                    }));
                }
            }

            RTCPeerConnectionState::Failed => {
                cancel_grace(&grace);
                if let Some(pc) = pc_weak.upgrade() {
                    let peer_id = link.peer_id().to_owned();
                    tokio::spawn(async move {
                        debug!("[{}] collecting stats before teardown", peer_id);
                        dump_selected_pair(&pc, "BEFORE-FAIL").await;
                    });
                }
                link.notify(TransportEvent::Failed(PeerError::Rtc(
                    "ICE/DTLS connection failed".into(),
                )));
            }

            _ => {}
        }
        Box::pin(async {})
    }));
}
