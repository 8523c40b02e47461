//! Подмена исходящего видео во всех соединениях без нового рукопожатия.

use crate::error::{CaptureError, RoomError};
use crate::media::{CaptureConstraints, LocalMediaSession, LocalTrack, MediaMode, MediaProvider, TrackKind};
use crate::peer::PeerConnection;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct TrackRenegotiator {
    provider: Arc<dyn MediaProvider>,
}

impl TrackRenegotiator {
    pub fn new(provider: Arc<dyn MediaProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn MediaProvider> {
        &self.provider
    }

    /// Захватывает экран и отправляет его всем участникам.
    ///
    /// Ошибка захвата не меняет ни одного соединения. Ошибка подмены у
    /// отдельного участника только логируется.
    pub async fn start_screen_share<'a, I>(
        &self,
        media: &mut LocalMediaSession,
        peers: I,
    ) -> Result<Arc<LocalTrack>, RoomError>
    where
        I: IntoIterator<Item = &'a mut PeerConnection>,
    {
        if media.mode() == MediaMode::Screen {
            return Err(RoomError::ScreenShareActive);
        }
        if !self.provider.supports_screen_capture() {
            return Err(CaptureError::Unsupported.into());
        }

        let stream = self.provider.acquire(CaptureConstraints::screen()).await?;
        let Some(screen) = stream.video_track() else {
            stream.stop();
            return Err(CaptureError::DeviceNotFound("screen".into()).into());
        };
        stop_others(stream.tracks(), &screen);

        for peer in peers {
            if peer.state().is_terminal() {
                continue;
            }
            match peer.swap_video(screen.clone()).await {
                Ok(previous) => peer.save_restore_video(previous),
                Err(e) => warn!("[{}] failed to switch to screen track: {}", peer.peer_id(), e),
            }
        }

        media.begin_screen(screen.clone());
        info!("screen share started ({})", screen.id());
        Ok(screen)
    }

    /// Возвращает каждому участнику трек, который уходил до демонстрации
    pub async fn stop_screen_share<'a, I>(
        &self,
        media: &mut LocalMediaSession,
        peers: I,
    ) -> Result<(), RoomError>
    where
        I: IntoIterator<Item = &'a mut PeerConnection>,
    {
        if media.mode() != MediaMode::Screen {
            return Err(RoomError::ScreenShareInactive);
        }

        let screen = media.end_screen();
        let camera = media.camera_video();

        for peer in peers {
            if peer.state().is_terminal() {
                continue;
            }
            let Some(original) = peer.take_restore_video().or_else(|| camera.clone()) else {
                debug!("[{}] no camera track to restore", peer.peer_id());
                continue;
            };
            if let Err(e) = peer.swap_video(original).await {
                warn!("[{}] failed to restore camera track: {}", peer.peer_id(), e);
            }
        }

        if let Some(screen) = screen {
            screen.stop();
        }
        info!("screen share stopped");
        Ok(())
    }

    /// Переключает камеру на другое устройство, сохраняя флаги треков.
    ///
    /// Во время демонстрации экрана меняется только трек для восстановления.
    pub async fn switch_camera_device<'a, I>(
        &self,
        media: &mut LocalMediaSession,
        peers: I,
        device_id: &str,
    ) -> Result<Arc<LocalTrack>, RoomError>
    where
        I: IntoIterator<Item = &'a mut PeerConnection>,
    {
        let audio_enabled = media.audio().map(|a| a.is_enabled()).unwrap_or(false);
        let stream = self
            .provider
            .acquire(CaptureConstraints::camera_device(device_id, audio_enabled))
            .await?;
        let Some(camera) = stream.video_track() else {
            stream.stop();
            return Err(CaptureError::DeviceNotFound(device_id.to_owned()).into());
        };
        // микрофон остаётся прежним
        stop_others(stream.tracks(), &camera);

        if let Some(current) = media.camera_video() {
            camera.set_enabled(current.is_enabled());
        }
        let previous = media.replace_camera_video(camera.clone());

        match media.mode() {
            MediaMode::Camera => {
                for peer in peers {
                    if peer.state().is_terminal() {
                        continue;
                    }
                    if let Err(e) = peer.swap_video(camera.clone()).await {
                        warn!("[{}] failed to switch camera: {}", peer.peer_id(), e);
                    }
                }
            }
            MediaMode::Screen => {
                for peer in peers {
                    if !peer.state().is_terminal() {
                        peer.save_restore_video(Some(camera.clone()));
                    }
                }
            }
        }

        if let Some(previous) = previous {
            previous.stop();
        }
        info!("switched camera to device {}", device_id);
        Ok(camera)
    }

    /// Инвертирует флаг локального трека и возвращает новое значение
    pub fn toggle_local_track(
        &self,
        media: &LocalMediaSession,
        kind: TrackKind,
    ) -> Result<bool, RoomError> {
        let track = media
            .track(kind)
            .ok_or_else(|| CaptureError::DeviceNotFound(kind.to_string()))?;
        let enabled = !track.is_enabled();
        match kind {
            TrackKind::Video => media.set_video_enabled(enabled),
            TrackKind::Audio => track.set_enabled(enabled),
        }
        debug!("local {} track enabled: {}", kind, enabled);
        Ok(enabled)
    }
}

fn stop_others(tracks: &[Arc<LocalTrack>], keep: &Arc<LocalTrack>) {
    for track in tracks {
        if !Arc::ptr_eq(track, keep) {
            track.stop();
        }
    }
}
