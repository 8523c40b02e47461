use crate::media::{LocalTrack, MediaMode, RemoteStream, TrackKind};
use crate::peer::PeerState;
use crate::room::membership::RoomMembership;
use std::sync::Arc;

/// Уведомления для слоя отрисовки
#[derive(Debug, Clone)]
pub enum RoomUpdate {
    Joined { room_id: String },
    PeerAdded { peer_id: String, user_name: String },
    PeerConnected { peer_id: String },
    RemoteStreamReady { peer_id: String, stream: RemoteStream },
    PeerRemoved { peer_id: String, user_name: String },
    MembershipChanged { user_name: String, target: TrackKind, enabled: bool },
    ScreenShareStarted,
    ScreenShareStopped,
    /// Имя уже занято в комнате, сессия покинула комнату
    UserNameTaken { user_name: String },
    Left,
}

/// Участник глазами слоя отрисовки
#[derive(Debug, Clone)]
pub struct PeerView {
    pub peer_id: String,
    pub user_name: String,
    pub state: PeerState,
    pub stream: RemoteStream,
    /// Видео, которое сейчас уходит этому участнику
    pub outgoing_video: Option<Arc<LocalTrack>>,
}

/// Снимок состояния комнаты только для чтения
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub room_id: Option<String>,
    pub user_name: Option<String>,
    pub membership: RoomMembership,
    pub peers: Vec<PeerView>,
    pub media_mode: Option<MediaMode>,
    pub camera_video: Option<Arc<LocalTrack>>,
}

impl RoomSnapshot {
    pub fn peer(&self, peer_id: &str) -> Option<&PeerView> {
        self.peers.iter().find(|p| p.peer_id == peer_id)
    }

    pub fn is_joined(&self) -> bool {
        self.room_id.is_some()
    }
}
