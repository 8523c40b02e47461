//! Fakes for the room session: recording signaling, scripted peer
//! transports and a scripted capture provider.

#![allow(dead_code)]

use async_trait::async_trait;
use meshroom::config::RoomConfig;
use meshroom::error::{CaptureError, PeerError, SignalingError};
use meshroom::media::{
    CaptureConstraints, LocalTrack, MediaProvider, MediaStream, TrackKind, TrackSource,
    VideoSource,
};
use meshroom::peer::{PeerLink, PeerTransport, TransportFactory};
use meshroom::room::RoomSession;
use meshroom::signaling::{
    ClientMessage, JoinedUser, MessageKind, SdpType, ServerMessage, Signal, SignalingChannel,
    SignalingTransport, UserInfo,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const LOCAL_ID: &str = "a1";

#[derive(Default)]
pub struct RecordingSignaling {
    frames: Mutex<Vec<String>>,
    unavailable: AtomicBool,
}

impl RecordingSignaling {
    pub fn sent(&self) -> Vec<ClientMessage> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|f| serde_json::from_str(f).unwrap())
            .collect()
    }

    pub fn count(&self, kind: MessageKind) -> usize {
        self.sent().iter().filter(|m| m.kind() == kind).count()
    }

    pub fn offers_to(&self, peer_id: &str) -> usize {
        self.sent()
            .iter()
            .filter(|m| matches!(m, ClientMessage::CallOffer { user_to_call, .. } if user_to_call == peer_id))
            .count()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl SignalingTransport for RecordingSignaling {
    fn send(&self, frame: String) -> Result<(), SignalingError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SignalingError::Unavailable);
        }
        self.frames.lock().unwrap().push(frame);
        Ok(())
    }

    fn local_id(&self) -> Option<String> {
        Some(LOCAL_ID.into())
    }
}

#[derive(Default)]
pub struct TransportLog {
    pub connects: AtomicUsize,
    pub offers: AtomicUsize,
    pub answers: AtomicUsize,
    pub applied_answers: AtomicUsize,
    pub closes: AtomicUsize,
    /// (peer id, track id) for every successful replacement
    pub replacements: Mutex<Vec<(String, String)>>,
    answer_errors: Mutex<VecDeque<PeerError>>,
    offer_errors: Mutex<VecDeque<PeerError>>,
    accept_errors: Mutex<VecDeque<PeerError>>,
    replace_failures: Mutex<HashSet<String>>,
    links: Mutex<HashMap<String, PeerLink>>,
    attached: Mutex<HashMap<String, Vec<String>>>,
}

impl TransportLog {
    pub fn fail_next_answer(&self, err: PeerError) {
        self.answer_errors.lock().unwrap().push_back(err);
    }

    pub fn fail_next_offer(&self, err: PeerError) {
        self.offer_errors.lock().unwrap().push_back(err);
    }

    pub fn fail_next_accept(&self, err: PeerError) {
        self.accept_errors.lock().unwrap().push_back(err);
    }

    pub fn fail_replacements_for(&self, peer_id: &str) {
        self.replace_failures.lock().unwrap().insert(peer_id.to_owned());
    }

    pub fn link(&self, peer_id: &str) -> PeerLink {
        self.links.lock().unwrap()[peer_id].clone()
    }

    /// Track ids attached when the latest connection to `peer_id` was built
    pub fn attached(&self, peer_id: &str) -> Vec<String> {
        self.attached.lock().unwrap()[peer_id].clone()
    }

    pub fn replacements_for(&self, peer_id: &str) -> Vec<String> {
        self.replacements
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == peer_id)
            .map(|(_, t)| t.clone())
            .collect()
    }
}

struct ScriptedTransport {
    peer_id: String,
    log: Arc<TransportLog>,
}

#[async_trait]
impl PeerTransport for ScriptedTransport {
    async fn create_offer(&self) -> Result<Signal, PeerError> {
        if let Some(err) = self.log.offer_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.log.offers.fetch_add(1, Ordering::SeqCst);
        Ok(Signal::offer(format!("v=0 offer for {}", self.peer_id)))
    }

    async fn accept_offer(&self, offer: Signal) -> Result<Signal, PeerError> {
        if let Some(err) = self.log.accept_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.log.answers.fetch_add(1, Ordering::SeqCst);
        Ok(Signal::answer(format!("v=0 answer for {}", self.peer_id), offer.id))
    }

    async fn apply_answer(&self, _answer: Signal) -> Result<(), PeerError> {
        if let Some(err) = self.log.answer_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.log.applied_answers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn replace_video_track(&self, track: Arc<LocalTrack>) -> Result<(), PeerError> {
        if self.log.replace_failures.lock().unwrap().contains(&self.peer_id) {
            return Err(PeerError::TrackReplace("sender gone".into()));
        }
        self.log
            .replacements
            .lock()
            .unwrap()
            .push((self.peer_id.clone(), track.id().to_owned()));
        Ok(())
    }

    async fn close(&self) -> Result<(), PeerError> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct ScriptedTransports {
    pub log: Arc<TransportLog>,
}

#[async_trait]
impl TransportFactory for ScriptedTransports {
    async fn connect(
        &self,
        link: PeerLink,
        tracks: Vec<Arc<LocalTrack>>,
    ) -> Result<Box<dyn PeerTransport>, PeerError> {
        self.log.connects.fetch_add(1, Ordering::SeqCst);
        let peer_id = link.peer_id().to_owned();
        self.log.attached.lock().unwrap().insert(
            peer_id.clone(),
            tracks.iter().map(|t| t.id().to_owned()).collect(),
        );
        self.log.links.lock().unwrap().insert(peer_id.clone(), link);
        Ok(Box::new(ScriptedTransport {
            peer_id,
            log: self.log.clone(),
        }))
    }
}

pub struct ScriptedProvider {
    screen_supported: bool,
    next_error: Mutex<Option<CaptureError>>,
    pub requests: Mutex<Vec<CaptureConstraints>>,
    pub streams: Mutex<Vec<MediaStream>>,
}

impl ScriptedProvider {
    pub fn new(screen_supported: bool) -> Self {
        Self {
            screen_supported,
            next_error: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_next(&self, err: CaptureError) {
        *self.next_error.lock().unwrap() = Some(err);
    }

    pub fn last_stream(&self) -> MediaStream {
        self.streams.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl MediaProvider for ScriptedProvider {
    async fn acquire(&self, constraints: CaptureConstraints) -> Result<MediaStream, CaptureError> {
        self.requests.lock().unwrap().push(constraints.clone());
        if let Some(err) = self.next_error.lock().unwrap().take() {
            return Err(err);
        }

        let stream_id = format!("stream-{}", self.requests.lock().unwrap().len());
        let mut tracks = Vec::new();
        match &constraints.video {
            VideoSource::None => {}
            VideoSource::Camera(device) => tracks.push(LocalTrack::new(
                TrackKind::Video,
                TrackSource::Camera,
                device.clone(),
                &stream_id,
            )),
            VideoSource::Screen { .. } => tracks.push(LocalTrack::new(
                TrackKind::Video,
                TrackSource::Screen,
                None,
                &stream_id,
            )),
        }
        if constraints.audio {
            tracks.push(LocalTrack::new(
                TrackKind::Audio,
                TrackSource::Microphone,
                None,
                &stream_id,
            ));
        }

        let stream = MediaStream::new(stream_id, tracks);
        self.streams.lock().unwrap().push(stream.clone());
        Ok(stream)
    }

    fn supports_screen_capture(&self) -> bool {
        self.screen_supported
    }
}

pub struct Fixture {
    pub session: RoomSession,
    pub signaling: Arc<RecordingSignaling>,
    pub channel: Arc<SignalingChannel>,
    pub transports: Arc<TransportLog>,
    pub provider: Arc<ScriptedProvider>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_provider(ScriptedProvider::new(true))
    }

    pub fn with_provider(provider: ScriptedProvider) -> Self {
        let signaling = Arc::new(RecordingSignaling::default());
        let channel = Arc::new(SignalingChannel::new(signaling.clone()));
        let factory = ScriptedTransports::default();
        let transports = factory.log.clone();
        let provider = Arc::new(provider);

        let session = RoomSession::new(
            RoomConfig::default(),
            channel.clone(),
            Arc::new(factory),
            provider.clone(),
        );
        session.register_handlers();

        Self {
            session,
            signaling,
            channel,
            transports,
            provider,
        }
    }

    /// Delivers an inbound message and drains the event queue
    pub async fn deliver(&mut self, msg: ServerMessage) {
        self.channel.deliver(msg);
        self.session.run_until_idle().await;
    }

    pub async fn joined(room: &str, user: &str) -> Self {
        let mut fixture = Self::new();
        fixture.session.join(room, user).await.unwrap();
        fixture.deliver(ServerMessage::UserJoined(vec![])).await;
        fixture
    }

    /// Joins as A and connects outbound peers for each `(peer id, user name)`
    pub async fn with_connected_peers(peers: &[(&str, &str)]) -> Self {
        let mut fixture = Self::joined("R1", "A").await;
        fixture
            .deliver(ServerMessage::UserJoined(
                peers.iter().map(|(id, name)| joined_user(id, name)).collect(),
            ))
            .await;
        for (id, _) in peers {
            fixture.deliver(answer_from(id)).await;
        }
        fixture
    }
}

pub fn info(user_name: &str) -> UserInfo {
    UserInfo {
        user_name: user_name.into(),
        video: true,
        audio: true,
    }
}

pub fn joined_user(user_id: &str, user_name: &str) -> JoinedUser {
    JoinedUser {
        user_id: user_id.into(),
        info: info(user_name),
    }
}

pub fn signal(sdp_type: SdpType) -> Signal {
    Signal {
        sdp_type,
        sdp: "v=0".into(),
        id: "session-1".into(),
        ts: 0,
    }
}

pub fn answer_from(peer_id: &str) -> ServerMessage {
    ServerMessage::CallAnswer {
        signal: signal(SdpType::Answer),
        answer_id: peer_id.into(),
    }
}

pub fn offer_from(peer_id: &str, user_name: &str) -> ServerMessage {
    ServerMessage::CallOffer {
        signal: signal(SdpType::Offer),
        from: peer_id.into(),
        info: info(user_name),
    }
}
