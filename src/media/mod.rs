//! Локальное медиа: треки захвата, провайдер захвата и сессия.

pub mod renegotiation;
pub mod session;

pub use renegotiation::TrackRenegotiator;
pub use session::{LocalMediaSession, MediaMode};

use crate::error::CaptureError;
use crate::utils::random_id;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Video => f.write_str("video"),
            TrackKind::Audio => f.write_str("audio"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSource {
    Camera,
    Microphone,
    Screen,
}

/// Локальный исходящий трек.
///
/// Провайдер захвата пишет в него сэмплы через [`LocalTrack::sample_writer`];
/// peer-соединения отправляют его через [`LocalTrack::rtp`].
pub struct LocalTrack {
    id: String,
    kind: TrackKind,
    source: TrackSource,
    device_id: Option<String>,
    enabled: AtomicBool,
    ended: watch::Sender<bool>,
    rtp: Arc<TrackLocalStaticSample>,
}

impl LocalTrack {
    pub fn new(
        kind: TrackKind,
        source: TrackSource,
        device_id: Option<String>,
        stream_id: &str,
    ) -> Arc<Self> {
        let id = format!("{}-{}", kind, random_id());
        let codec = match kind {
            TrackKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
            TrackKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
        };
        let rtp = Arc::new(TrackLocalStaticSample::new(
            codec,
            id.clone(),
            stream_id.to_owned(),
        ));

        Arc::new(Self {
            id,
            kind,
            source,
            device_id,
            enabled: AtomicBool::new(true),
            ended: watch::channel(false).0,
            rtp,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn source(&self) -> TrackSource {
        self.source
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Останавливает трек; повторный вызов ничего не делает
    pub fn stop(&self) {
        self.ended.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.ended.borrow()
    }

    /// Завершается, когда трек остановлен (нами или источником захвата)
    pub async fn ended(&self) {
        let mut rx = self.ended.subscribe();
        let _ = rx.wait_for(|ended| *ended).await;
    }

    pub fn rtp(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        self.rtp.clone()
    }

    pub fn sample_writer(&self) -> Arc<TrackLocalStaticSample> {
        self.rtp.clone()
    }
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("device_id", &self.device_id)
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Поток, полученный от провайдера захвата
#[derive(Debug, Clone)]
pub struct MediaStream {
    pub id: String,
    tracks: Vec<Arc<LocalTrack>>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, tracks: Vec<Arc<LocalTrack>>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn tracks(&self) -> &[Arc<LocalTrack>] {
        &self.tracks
    }

    pub fn video_track(&self) -> Option<Arc<LocalTrack>> {
        self.track(TrackKind::Video)
    }

    pub fn audio_track(&self) -> Option<Arc<LocalTrack>> {
        self.track(TrackKind::Audio)
    }

    fn track(&self, kind: TrackKind) -> Option<Arc<LocalTrack>> {
        self.tracks.iter().find(|t| t.kind() == kind).cloned()
    }

    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    None,
    /// `None`: камера по умолчанию
    Camera(Option<String>),
    Screen { cursor: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub video: VideoSource,
    pub audio: bool,
}

impl CaptureConstraints {
    pub fn camera_and_mic() -> Self {
        Self {
            video: VideoSource::Camera(None),
            audio: true,
        }
    }

    pub fn camera_device(device_id: impl Into<String>, audio: bool) -> Self {
        Self {
            video: VideoSource::Camera(Some(device_id.into())),
            audio,
        }
    }

    pub fn screen() -> Self {
        Self {
            video: VideoSource::Screen { cursor: true },
            audio: false,
        }
    }
}

/// Внешний API захвата медиа
#[async_trait]
pub trait MediaProvider: Send + Sync {
    async fn acquire(&self, constraints: CaptureConstraints) -> Result<MediaStream, CaptureError>;

    fn supports_screen_capture(&self) -> bool {
        true
    }
}

/// Входящий трек удалённого участника
#[derive(Clone)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: TrackKind,
    pub stream_id: String,
    pub inner: Option<Arc<TrackRemote>>,
}

impl fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("stream_id", &self.stream_id)
            .finish()
    }
}

/// Отрисовываемый поток удалённого участника
#[derive(Debug, Clone, Default)]
pub struct RemoteStream {
    pub tracks: Vec<RemoteTrack>,
}

impl RemoteStream {
    pub fn add(&mut self, track: RemoteTrack) {
        if !self.tracks.iter().any(|t| t.id == track.id) {
            self.tracks.push(track);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
