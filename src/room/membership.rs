use crate::media::TrackKind;
use crate::signaling::UserInfo;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackFlags {
    pub video: bool,
    pub audio: bool,
}

impl TrackFlags {
    pub fn get(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Video => self.video,
            TrackKind::Audio => self.audio,
        }
    }

    fn set(&mut self, kind: TrackKind, value: bool) {
        match kind {
            TrackKind::Video => self.video = value,
            TrackKind::Audio => self.audio = value,
        }
    }
}

impl From<&UserInfo> for TrackFlags {
    fn from(info: &UserInfo) -> Self {
        Self {
            video: info.video,
            audio: info.audio,
        }
    }
}

/// Таблица участников: имя → флаги треков.
///
/// Меняется только менеджером сессии комнаты, остальные получают копию.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomMembership {
    users: HashMap<String, TrackFlags>,
}

impl RoomMembership {
    pub fn get(&self, user_name: &str) -> Option<TrackFlags> {
        self.users.get(user_name).copied()
    }

    pub fn contains(&self, user_name: &str) -> bool {
        self.users.contains_key(user_name)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, TrackFlags)> {
        self.users.iter().map(|(name, flags)| (name.as_str(), *flags))
    }

    pub(crate) fn insert(&mut self, user_name: impl Into<String>, flags: TrackFlags) {
        self.users.insert(user_name.into(), flags);
    }

    pub(crate) fn remove(&mut self, user_name: &str) -> Option<TrackFlags> {
        self.users.remove(user_name)
    }

    /// Инвертирует флаг; `None`, если участника нет в таблице
    pub(crate) fn toggle(&mut self, user_name: &str, kind: TrackKind) -> Option<bool> {
        let flags = self.users.get_mut(user_name)?;
        let value = !flags.get(kind);
        flags.set(kind, value);
        Some(value)
    }

    pub(crate) fn set(&mut self, user_name: &str, kind: TrackKind, value: bool) -> bool {
        match self.users.get_mut(user_name) {
            Some(flags) => {
                flags.set(kind, value);
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.users.clear();
    }
}
