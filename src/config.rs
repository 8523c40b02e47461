// Конфигурация приложения
// Логирование можно отключить только в режиме разработки

use crate::error::ConfigError;
use crate::peer::types::ServerConfig;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true; // В режиме отладки логирование включено

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false; // В продакшене логирование отключено

// Дополнительные настройки для режима разработки
#[cfg(debug_assertions)]
pub mod dev {
    // Для полного отключения логирования в режиме разработки
    // измените эту константу на false
    pub const ENABLE_LOGGING: bool = true;
}

#[cfg(not(debug_assertions))]
pub mod dev {
    pub const ENABLE_LOGGING: bool = false;
}

/// Переменная окружения с путём к JSON-конфигу
pub const CONFIG_ENV: &str = "MESHROOM_CONFIG";

/// Пауза перед повторным offer после гонки рукопожатия
pub const DEFAULT_RECOVERY_BACKOFF: Duration = Duration::from_secs(1);

/// Сколько ждём окончания сбора ICE-кандидатов (trickle выключен)
pub const DEFAULT_GATHER_TIMEOUT: Duration = Duration::from_secs(10);

/// Период ожидания перед тем, как считать разорванное соединение упавшим
pub const DEFAULT_DISCONNECT_GRACE: Duration = Duration::from_secs(10);

pub static DEFAULT_ICE_SERVERS: Lazy<Vec<ServerConfig>> = Lazy::new(|| {
    vec![
        ServerConfig {
            id: "default-stun".into(),
            r#type: "stun".into(),
            url: "stun:stun.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
        ServerConfig {
            id: "twilio-stun".into(),
            r#type: "stun".into(),
            url: "stun:global.stun.twilio.com:3478".into(),
            username: None,
            credential: None,
        },
    ]
});

/// Настройки сессии комнаты
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RoomConfig {
    pub ice_servers: Vec<ServerConfig>,
    pub recovery_backoff_ms: u64,
    pub gather_timeout_ms: u64,
    pub disconnect_grace_ms: u64,
    pub log_filter: String,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            ice_servers: DEFAULT_ICE_SERVERS.clone(),
            recovery_backoff_ms: DEFAULT_RECOVERY_BACKOFF.as_millis() as u64,
            gather_timeout_ms: DEFAULT_GATHER_TIMEOUT.as_millis() as u64,
            disconnect_grace_ms: DEFAULT_DISCONNECT_GRACE.as_millis() as u64,
            log_filter: "info".into(),
        }
    }
}

impl RoomConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: RoomConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Читает конфиг из файла, указанного в `MESHROOM_CONFIG`; без переменной берёт дефолты
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.is_empty() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for server in &self.ice_servers {
            if server.url.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "ICE server '{}' has an empty url",
                    server.id
                )));
            }

            if server.r#type == "turn" && (server.username.is_none() || server.credential.is_none())
            {
                return Err(ConfigError::Invalid(format!(
                    "TURN server '{}' requires username and credential",
                    server.id
                )));
            }
        }

        if self.gather_timeout_ms == 0 {
            return Err(ConfigError::Invalid("gatherTimeoutMs must be positive".into()));
        }

        Ok(())
    }

    pub fn recovery_backoff(&self) -> Duration {
        Duration::from_millis(self.recovery_backoff_ms)
    }

    pub fn gather_timeout(&self) -> Duration {
        Duration::from_millis(self.gather_timeout_ms)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_millis(self.disconnect_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = RoomConfig::from_json(r#"{"recoveryBackoffMs": 250}"#).unwrap();
        assert_eq!(config.recovery_backoff(), Duration::from_millis(250));
        assert_eq!(config.gather_timeout(), DEFAULT_GATHER_TIMEOUT);
        assert_eq!(config.ice_servers.len(), 2);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn turn_without_credentials_is_rejected() {
        let raw = r#"{"iceServers": [{"id": "t1", "type": "turn", "url": "turn.example.org:3478"}]}"#;
        let err = RoomConfig::from_json(raw).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn empty_url_is_rejected() {
        let raw = r#"{"iceServers": [{"id": "s1", "type": "stun", "url": ""}]}"#;
        assert!(RoomConfig::from_json(raw).is_err());
    }

    #[test]
    fn zero_gather_timeout_is_rejected() {
        assert!(RoomConfig::from_json(r#"{"gatherTimeoutMs": 0}"#).is_err());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = RoomConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
