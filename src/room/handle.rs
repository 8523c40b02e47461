use crate::error::RoomError;
use crate::media::TrackKind;
use crate::room::update::{RoomSnapshot, RoomUpdate};
use crate::room::{RoomCommand, RoomEvent};
use tokio::sync::{broadcast, mpsc, oneshot};

/// Точки входа для слоя отрисовки.
///
/// Каждое действие становится командой в едином цикле событий комнаты,
/// поэтому действия пользователя не гоняются с сигнализацией.
#[derive(Clone)]
pub struct RoomHandle {
    events: mpsc::UnboundedSender<RoomEvent>,
    updates: broadcast::Sender<RoomUpdate>,
}

impl RoomHandle {
    pub(crate) fn new(
        events: mpsc::UnboundedSender<RoomEvent>,
        updates: broadcast::Sender<RoomUpdate>,
    ) -> Self {
        Self { events, updates }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(RoomEvent::Command(command(reply)))
            .map_err(|_| RoomError::SessionClosed)?;
        rx.await.map_err(|_| RoomError::SessionClosed)
    }

    pub async fn join(&self, room_id: &str, user_name: &str) -> Result<(), RoomError> {
        let room_id = room_id.to_owned();
        let user_name = user_name.to_owned();
        self.request(|reply| RoomCommand::Join {
            room_id,
            user_name,
            reply,
        })
        .await?
    }

    pub async fn check_user(&self, room_id: &str, user_name: &str) -> Result<(), RoomError> {
        let room_id = room_id.to_owned();
        let user_name = user_name.to_owned();
        self.request(|reply| RoomCommand::CheckUser {
            room_id,
            user_name,
            reply,
        })
        .await?
    }

    pub async fn leave_room(&self) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Leave { reply }).await
    }

    pub async fn start_screen_share(&self) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::StartScreenShare { reply })
            .await?
    }

    pub async fn stop_screen_share(&self) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::StopScreenShare { reply })
            .await?
    }

    pub async fn switch_camera_device(&self, device_id: &str) -> Result<(), RoomError> {
        let device_id = device_id.to_owned();
        self.request(|reply| RoomCommand::SwitchCamera { device_id, reply })
            .await?
    }

    /// Возвращает новое значение флага трека
    pub async fn toggle_local_track(&self, kind: TrackKind) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::ToggleTrack { kind, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot, RoomError> {
        self.request(|reply| RoomCommand::Snapshot { reply }).await
    }

    /// Покидает комнату и останавливает цикл событий
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Shutdown { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomUpdate> {
        self.updates.subscribe()
    }
}
