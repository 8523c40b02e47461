use thiserror::Error;

/// Ошибки захвата локального медиа (камера, микрофон, экран)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("permission to capture media was denied")]
    PermissionDenied,

    #[error("capture device not found: {0}")]
    DeviceNotFound(String),

    #[error("capture device is busy: {0}")]
    DeviceBusy(String),

    #[error("capture source is not supported on this platform")]
    Unsupported,
}

/// Ошибки одного peer-соединения
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerError {
    /// Сигнал пришёл не в том состоянии (дубликат или опоздание)
    #[error("signal applied in wrong state: {0}")]
    WrongState(String),

    #[error("webrtc error: {0}")]
    Rtc(String),

    #[error("track replacement failed: {0}")]
    TrackReplace(String),

    #[error("connection is closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),
}

impl PeerError {
    /// Ошибки гонки рукопожатия, которые можно пережить пересозданием соединения
    pub fn is_benign(&self) -> bool {
        matches!(self, PeerError::WrongState(_))
    }
}

impl From<webrtc::Error> for PeerError {
    fn from(err: webrtc::Error) -> Self {
        match err {
            webrtc::Error::ErrIncorrectSignalingState => PeerError::WrongState(err.to_string()),
            webrtc::Error::ErrConnectionClosed => PeerError::Closed,
            other => PeerError::Rtc(other.to_string()),
        }
    }
}

/// Ошибки канала сигнализации
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalingError {
    #[error("signaling transport is unavailable")]
    Unavailable,

    #[error("failed to encode signaling message: {0}")]
    Encode(String),

    #[error("failed to decode signaling message: {0}")]
    Decode(String),
}

/// Ошибки, видимые вызывающему коду комнаты
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error(transparent)]
    Peer(#[from] PeerError),

    #[error("already joined room {0}")]
    AlreadyJoined(String),

    #[error("not joined to any room")]
    NotJoined,

    #[error("screen share is already active")]
    ScreenShareActive,

    #[error("screen share is not active")]
    ScreenShareInactive,

    #[error("room session is no longer running")]
    SessionClosed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
