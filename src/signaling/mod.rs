//! Адаптер канала сигнализации.
//!
//! Внешний дуплексный транспорт (websocket и т.п.) доставляет сырые кадры в
//! [`SignalingChannel::dispatch`], а исходящие сообщения уходят через
//! [`SignalingTransport::send`]. Адаптер ничего не буферизует и не повторяет.

pub mod messages;

pub use messages::{
    ClientMessage, JoinedUser, MessageKind, SdpType, ServerMessage, Signal, UserInfo,
};

use crate::error::SignalingError;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Внешний транспорт сигнализации.
pub trait SignalingTransport: Send + Sync {
    /// Отправка без ожидания доставки
    fn send(&self, frame: String) -> Result<(), SignalingError>;

    /// Идентификатор нашего сокета на relay, если уже известен
    fn local_id(&self) -> Option<String>;

    /// Транспорту сообщают, что на этот вид сообщений есть подписчик
    fn listen(&self, _kind: MessageKind) {}
}

pub type Handler = Box<dyn Fn(ServerMessage) + Send + Sync>;

pub struct SignalingChannel {
    transport: Arc<dyn SignalingTransport>,
    handlers: Mutex<HashMap<MessageKind, Arc<Handler>>>,
}

impl SignalingChannel {
    pub fn new(transport: Arc<dyn SignalingTransport>) -> Self {
        Self {
            transport,
            handlers: Mutex::new(HashMap::new()),
        }
    }

    pub fn local_id(&self) -> Option<String> {
        self.transport.local_id()
    }

    pub fn send(&self, msg: ClientMessage) -> Result<(), SignalingError> {
        let kind = msg.kind();
        let frame = msg.encode()?;
        debug!("signaling -> {} ({} bytes)", kind.as_str(), frame.len());
        self.transport.send(frame)
    }

    /// Регистрирует обработчик вида `kind`, заменяя предыдущий
    pub fn on_message(&self, kind: MessageKind, handler: Handler) {
        let previous = self
            .handlers_lock()
            .insert(kind, Arc::new(handler));

        if previous.is_none() {
            self.transport.listen(kind);
        } else {
            debug!("replaced handler for {}", kind.as_str());
        }
    }

    pub fn off(&self, kind: MessageKind) {
        self.handlers_lock().remove(&kind);
    }

    pub fn clear_handlers(&self) {
        self.handlers_lock().clear();
    }

    pub fn has_handler(&self, kind: MessageKind) -> bool {
        self.handlers_lock().contains_key(&kind)
    }

    /// После переподключения транспорта заново объявляет подписки.
    /// Таблица обработчиков не меняется, поэтому повторный вызов безопасен.
    pub fn reconnected(&self) {
        let kinds: HashSet<MessageKind> = self.handlers_lock().keys().copied().collect();
        debug!("signaling reconnected, re-registering {} handlers", kinds.len());
        for kind in kinds {
            self.transport.listen(kind);
        }
    }

    /// Разбирает сырой кадр и передаёт его обработчику
    pub fn dispatch(&self, frame: &str) {
        match ServerMessage::decode(frame) {
            Ok(msg) => self.deliver(msg),
            Err(e) => warn!("dropping undecodable signaling frame: {}", e),
        }
    }

    pub fn deliver(&self, msg: ServerMessage) {
        let kind = msg.kind();
        // обработчик вызывается без удержания блокировки
        let handler = self.handlers_lock().get(&kind).cloned();
        match handler {
            Some(handler) => {
                debug!("signaling <- {}", kind.as_str());
                handler(msg)
            }
            None => debug!("no handler registered for {}, dropping", kind.as_str()),
        }
    }

    fn handlers_lock(&self) -> std::sync::MutexGuard<'_, HashMap<MessageKind, Arc<Handler>>> {
        // отравленный мьютекс не ломает таблицу: обработчики только вставляются/удаляются
        self.handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
