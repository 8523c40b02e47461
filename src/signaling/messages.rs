use crate::error::SignalingError;
use crate::media::TrackKind;
use crate::utils::random_id;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// Полное SDP-описание (trickle выключен) с метаданными сессии
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
    pub id: String,
    pub ts: i64,
}

impl Signal {
    pub fn offer(sdp: String) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp,
            id: random_id(),
            ts: chrono::Utc::now().timestamp(),
        }
    }

    /// Ответ несёт id сессии исходного offer
    pub fn answer(sdp: String, session_id: String) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp,
            id: session_id,
            ts: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub user_name: String,
    pub video: bool,
    pub audio: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinedUser {
    pub user_id: String,
    pub info: UserInfo,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    JoinRoom,
    CheckUser,
    UserJoined,
    UserExists,
    CallOffer,
    CallAnswer,
    UserLeft,
    ToggleTrack,
}

impl MessageKind {
    /// Виды сообщений, которые приходят от relay
    pub const INBOUND: [MessageKind; 6] = [
        MessageKind::UserJoined,
        MessageKind::UserExists,
        MessageKind::CallOffer,
        MessageKind::CallAnswer,
        MessageKind::UserLeft,
        MessageKind::ToggleTrack,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::JoinRoom => "join-room",
            MessageKind::CheckUser => "check-user",
            MessageKind::UserJoined => "user-joined",
            MessageKind::UserExists => "user-exists",
            MessageKind::CallOffer => "call-offer",
            MessageKind::CallAnswer => "call-answer",
            MessageKind::UserLeft => "user-left",
            MessageKind::ToggleTrack => "toggle-track",
        }
    }
}

/// Исходящие сообщения (клиент → relay)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: String, user_name: String },

    #[serde(rename_all = "camelCase")]
    CheckUser { room_id: String, user_name: String },

    #[serde(rename_all = "camelCase")]
    CallOffer {
        user_to_call: String,
        from: String,
        signal: Signal,
        info: UserInfo,
    },

    #[serde(rename_all = "camelCase")]
    CallAnswer { signal: Signal, to: String },

    /// Кроме `userId`/`userName` несёт комнату для relay
    #[serde(rename_all = "camelCase")]
    UserLeft {
        room_id: String,
        user_id: String,
        user_name: String,
    },

    #[serde(rename_all = "camelCase")]
    ToggleTrack { room_id: String, target: TrackKind },
}

impl ClientMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ClientMessage::JoinRoom { .. } => MessageKind::JoinRoom,
            ClientMessage::CheckUser { .. } => MessageKind::CheckUser,
            ClientMessage::CallOffer { .. } => MessageKind::CallOffer,
            ClientMessage::CallAnswer { .. } => MessageKind::CallAnswer,
            ClientMessage::UserLeft { .. } => MessageKind::UserLeft,
            ClientMessage::ToggleTrack { .. } => MessageKind::ToggleTrack,
        }
    }

    pub fn encode(&self) -> Result<String, SignalingError> {
        serde_json::to_string(self).map_err(|e| SignalingError::Encode(e.to_string()))
    }
}

/// Входящие сообщения (relay → клиент)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum ServerMessage {
    UserJoined(Vec<JoinedUser>),

    UserExists { error: bool },

    #[serde(rename_all = "camelCase")]
    CallOffer {
        signal: Signal,
        from: String,
        info: UserInfo,
    },

    #[serde(rename_all = "camelCase")]
    CallAnswer { signal: Signal, answer_id: String },

    #[serde(rename_all = "camelCase")]
    UserLeft { user_id: String, user_name: String },

    #[serde(rename_all = "camelCase")]
    ToggleTrack { user_id: String, target: TrackKind },
}

impl ServerMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ServerMessage::UserJoined(_) => MessageKind::UserJoined,
            ServerMessage::UserExists { .. } => MessageKind::UserExists,
            ServerMessage::CallOffer { .. } => MessageKind::CallOffer,
            ServerMessage::CallAnswer { .. } => MessageKind::CallAnswer,
            ServerMessage::UserLeft { .. } => MessageKind::UserLeft,
            ServerMessage::ToggleTrack { .. } => MessageKind::ToggleTrack,
        }
    }

    pub fn decode(frame: &str) -> Result<Self, SignalingError> {
        serde_json::from_str(frame).map_err(|e| SignalingError::Decode(e.to_string()))
    }
}
