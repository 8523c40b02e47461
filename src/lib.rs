pub mod config;
pub mod error;
pub mod logger;
pub mod media;
pub mod peer;
pub mod room;
pub mod signaling;
pub mod utils;

pub use config::RoomConfig;
pub use error::{CaptureError, ConfigError, PeerError, RoomError, SignalingError};
pub use media::{MediaProvider, TrackKind};
pub use room::{RoomHandle, RoomSession, RoomSnapshot, RoomUpdate};
pub use signaling::{SignalingChannel, SignalingTransport};

use peer::RtcTransportFactory;
use std::sync::Arc;
use tracing::info;

/// Собирает сессию комнаты поверх webrtc-rs и запускает её цикл событий.
///
/// Внешний транспорт сигнализации должен передавать входящие кадры в
/// возвращённый [`SignalingChannel::dispatch`]. Вызывать внутри рантайма tokio.
pub fn run(
    config: RoomConfig,
    transport: Arc<dyn SignalingTransport>,
    provider: Arc<dyn MediaProvider>,
) -> Result<(RoomHandle, Arc<SignalingChannel>), RoomError> {
    logger::init(&config.log_filter);

    let transports = Arc::new(RtcTransportFactory::new(&config)?);
    let signaling = Arc::new(SignalingChannel::new(transport));

    info!(
        "starting room session with {} ICE servers",
        config.ice_servers.len()
    );
    let session = RoomSession::new(config, signaling.clone(), transports, provider);
    session.register_handlers();
    Ok((session.spawn(), signaling))
}
