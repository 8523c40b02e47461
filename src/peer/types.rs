use serde::{Deserialize, Serialize};

/// Конфигурация ICE сервера
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub id: String,
    pub r#type: String, // 'stun' or 'turn'
    pub url: String,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// Кто начинает рукопожатие с данным участником
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Мы отправляем offer (узнали об участнике из `user-joined`)
    Initiator,
    /// Мы отвечаем на входящий `call-offer`
    Responder,
}
