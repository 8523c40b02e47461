use crate::media::{LocalTrack, MediaStream, RemoteStream, TrackKind};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaMode {
    Camera,
    Screen,
}

/// Локальная медиа-сессия: один экземпляр на сессию комнаты.
///
/// Ссылки на треки меняет только [`crate::media::TrackRenegotiator`];
/// peer-соединения лишь читают их при подключении.
#[derive(Debug)]
pub struct LocalMediaSession {
    capture: MediaStream,
    camera_video: Option<Arc<LocalTrack>>,
    audio: Option<Arc<LocalTrack>>,
    screen: Option<Arc<LocalTrack>>,
    mode: MediaMode,
    remote: HashMap<String, RemoteStream>,
}

impl LocalMediaSession {
    pub fn new(capture: MediaStream) -> Self {
        let camera_video = capture.video_track();
        let audio = capture.audio_track();
        Self {
            capture,
            camera_video,
            audio,
            screen: None,
            mode: MediaMode::Camera,
            remote: HashMap::new(),
        }
    }

    pub fn mode(&self) -> MediaMode {
        self.mode
    }

    pub fn capture_stream(&self) -> &MediaStream {
        &self.capture
    }

    /// Видео, которое сейчас уходит участникам (экран во время демонстрации)
    pub fn active_video(&self) -> Option<Arc<LocalTrack>> {
        match self.mode {
            MediaMode::Screen => self.screen.clone().or_else(|| self.camera_video.clone()),
            MediaMode::Camera => self.camera_video.clone(),
        }
    }

    pub fn camera_video(&self) -> Option<Arc<LocalTrack>> {
        self.camera_video.clone()
    }

    pub fn audio(&self) -> Option<Arc<LocalTrack>> {
        self.audio.clone()
    }

    pub fn screen(&self) -> Option<Arc<LocalTrack>> {
        self.screen.clone()
    }

    pub fn track(&self, kind: TrackKind) -> Option<Arc<LocalTrack>> {
        match kind {
            TrackKind::Video => self.camera_video(),
            TrackKind::Audio => self.audio(),
        }
    }

    /// Треки, которые прикрепляются к новому peer-соединению
    pub fn outgoing_tracks(&self) -> Vec<Arc<LocalTrack>> {
        self.active_video()
            .into_iter()
            .chain(self.audio.clone())
            .collect()
    }

    pub(crate) fn begin_screen(&mut self, track: Arc<LocalTrack>) {
        self.screen = Some(track);
        self.mode = MediaMode::Screen;
    }

    pub(crate) fn end_screen(&mut self) -> Option<Arc<LocalTrack>> {
        self.mode = MediaMode::Camera;
        self.screen.take()
    }

    /// Подменяет видеотрек камеры, возвращает прежний
    pub(crate) fn replace_camera_video(&mut self, track: Arc<LocalTrack>) -> Option<Arc<LocalTrack>> {
        self.camera_video.replace(track)
    }

    pub(crate) fn set_video_enabled(&self, enabled: bool) {
        for track in self.camera_video.iter().chain(self.screen.iter()) {
            track.set_enabled(enabled);
        }
    }

    /// Останавливает все локальные треки
    pub(crate) fn release(&mut self) {
        info!("releasing local capture resources");
        self.capture.stop();
        for track in self
            .camera_video
            .iter()
            .chain(self.audio.iter())
            .chain(self.screen.iter())
        {
            track.stop();
        }
        self.screen = None;
        self.mode = MediaMode::Camera;
        self.remote.clear();
    }

    pub fn attach_remote(&mut self, peer_id: &str, stream: RemoteStream) {
        debug!("[{}] remote stream available ({} tracks)", peer_id, stream.tracks.len());
        self.remote.insert(peer_id.to_owned(), stream);
    }

    pub fn detach_remote(&mut self, peer_id: &str) -> Option<RemoteStream> {
        self.remote.remove(peer_id)
    }

    pub fn remote_stream(&self, peer_id: &str) -> Option<&RemoteStream> {
        self.remote.get(peer_id)
    }
}
