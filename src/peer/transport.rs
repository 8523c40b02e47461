use crate::error::PeerError;
use crate::media::{LocalTrack, RemoteTrack};
use crate::room::RoomEvent;
use crate::signaling::Signal;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Асинхронные события медиа-транспорта одного соединения
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected,
    RemoteTrack(RemoteTrack),
    Failed(PeerError),
}

/// Обратный канал от транспорта в цикл событий комнаты.
///
/// Поколение позволяет отбросить события уже уничтоженного соединения.
#[derive(Debug, Clone)]
pub struct PeerLink {
    peer_id: String,
    generation: u64,
    events: mpsc::UnboundedSender<RoomEvent>,
}

impl PeerLink {
    pub fn new(peer_id: String, generation: u64, events: mpsc::UnboundedSender<RoomEvent>) -> Self {
        Self {
            peer_id,
            generation,
            events,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn notify(&self, event: TransportEvent) {
        let _ = self.events.send(RoomEvent::Transport {
            peer_id: self.peer_id.clone(),
            generation: self.generation,
            event,
        });
    }
}

/// Точка-точка медиа-сессия, которой владеет одно [`crate::peer::PeerConnection`]
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn create_offer(&self) -> Result<Signal, PeerError>;

    async fn accept_offer(&self, offer: Signal) -> Result<Signal, PeerError>;

    async fn apply_answer(&self, answer: Signal) -> Result<(), PeerError>;

    async fn replace_video_track(&self, track: Arc<LocalTrack>) -> Result<(), PeerError>;

    async fn close(&self) -> Result<(), PeerError>;
}

#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Создаёт соединение с уже прикреплёнными исходящими треками
    async fn connect(
        &self,
        link: PeerLink,
        tracks: Vec<Arc<LocalTrack>>,
    ) -> Result<Box<dyn PeerTransport>, PeerError>;
}
