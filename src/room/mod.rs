//! Менеджер сессии комнаты.
//!
//! Все входящие сигналы, события транспортов, таймеры восстановления и
//! действия пользователя проходят через одну очередь [`RoomEvent`] и
//! обрабатываются строго по одному. Между точками ожидания состояние
//! комнаты меняет только текущий обработчик.

pub mod handle;
pub mod membership;
pub mod update;

pub use handle::RoomHandle;
pub use membership::{RoomMembership, TrackFlags};
pub use update::{PeerView, RoomSnapshot, RoomUpdate};

use crate::config::RoomConfig;
use crate::error::{PeerError, RoomError};
use crate::media::{
    CaptureConstraints, LocalMediaSession, MediaMode, MediaProvider, TrackKind, TrackRenegotiator,
};
use crate::peer::{
    Applied, ErrorOutcome, PeerConnection, PeerLink, PeerState, Role, TransportEvent,
    TransportFactory,
};
use crate::signaling::{
    ClientMessage, JoinedUser, MessageKind, ServerMessage, Signal, SignalingChannel, UserInfo,
};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

const UPDATES_CAPACITY: usize = 64;

/// Единица работы цикла событий комнаты
#[derive(Debug)]
pub enum RoomEvent {
    Inbound(ServerMessage),
    Transport {
        peer_id: String,
        generation: u64,
        event: TransportEvent,
    },
    /// Сработал отложенный повтор offer
    RetryOffer { peer_id: String, generation: u64 },
    /// Источник захвата экрана завершил трек
    ScreenTrackEnded { track_id: String },
    Command(RoomCommand),
}

#[derive(Debug)]
pub enum RoomCommand {
    Join {
        room_id: String,
        user_name: String,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    CheckUser {
        room_id: String,
        user_name: String,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Leave {
        reply: oneshot::Sender<()>,
    },
    StartScreenShare {
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    StopScreenShare {
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    SwitchCamera {
        device_id: String,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    ToggleTrack {
        kind: TrackKind,
        reply: oneshot::Sender<Result<bool, RoomError>>,
    },
    Snapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Удалённый участник и единственное соединение с ним
pub struct PeerRecord {
    pub peer_id: String,
    pub user_name: String,
    pub connection: PeerConnection,
}

#[derive(Debug, Clone)]
struct Joined {
    room_id: String,
    user_name: String,
}

pub struct RoomSession {
    config: RoomConfig,
    signaling: Arc<SignalingChannel>,
    transports: Arc<dyn TransportFactory>,
    renegotiator: TrackRenegotiator,
    events: mpsc::UnboundedSender<RoomEvent>,
    inbox: mpsc::UnboundedReceiver<RoomEvent>,
    joined: Option<Joined>,
    checked_name: Option<String>,
    membership: RoomMembership,
    peers: Vec<PeerRecord>,
    media: Option<LocalMediaSession>,
    updates: broadcast::Sender<RoomUpdate>,
    next_generation: u64,
}

impl RoomSession {
    pub fn new(
        config: RoomConfig,
        signaling: Arc<SignalingChannel>,
        transports: Arc<dyn TransportFactory>,
        provider: Arc<dyn MediaProvider>,
    ) -> Self {
        let (events, inbox) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(UPDATES_CAPACITY);
        Self {
            config,
            signaling,
            transports,
            renegotiator: TrackRenegotiator::new(provider),
            events,
            inbox,
            joined: None,
            checked_name: None,
            membership: RoomMembership::default(),
            peers: Vec::new(),
            media: None,
            updates,
            next_generation: 1,
        }
    }

    /// Подписывает цикл событий на все входящие виды сообщений.
    /// Повторный вызов заменяет обработчики, а не дублирует их.
    pub fn register_handlers(&self) {
        for kind in MessageKind::INBOUND {
            let events = self.events.clone();
            self.signaling.on_message(
                kind,
                Box::new(move |msg| {
                    let _ = events.send(RoomEvent::Inbound(msg));
                }),
            );
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomUpdate> {
        self.updates.subscribe()
    }

    pub fn membership(&self) -> &RoomMembership {
        &self.membership
    }

    pub fn peers(&self) -> &[PeerRecord] {
        &self.peers
    }

    pub fn peer(&self, peer_id: &str) -> Option<&PeerRecord> {
        self.peers.iter().find(|p| p.peer_id == peer_id)
    }

    pub fn media(&self) -> Option<&LocalMediaSession> {
        self.media.as_ref()
    }

    pub fn is_joined(&self) -> bool {
        self.joined.is_some()
    }

    /// Запускает цикл событий в отдельной задаче
    pub fn spawn(self) -> RoomHandle {
        let handle = RoomHandle::new(self.events.clone(), self.updates.clone());
        tokio::spawn(self.run());
        handle
    }

    pub async fn run(mut self) {
        info!("room session event loop started");
        while let Some(event) = self.inbox.recv().await {
            if !self.handle_event(event).await {
                break;
            }
        }
        info!("room session event loop stopped");
    }

    /// Ждёт и обрабатывает одно событие
    pub async fn step(&mut self) -> bool {
        match self.inbox.recv().await {
            Some(event) => self.handle_event(event).await,
            None => false,
        }
    }

    /// Обрабатывает всё, что уже лежит в очереди
    pub async fn run_until_idle(&mut self) {
        while let Ok(event) = self.inbox.try_recv() {
            if !self.handle_event(event).await {
                break;
            }
        }
    }

    /// Возвращает `false`, когда цикл нужно остановить
    pub async fn handle_event(&mut self, event: RoomEvent) -> bool {
        match event {
            RoomEvent::Inbound(msg) => self.handle_inbound(msg).await,
            RoomEvent::Transport {
                peer_id,
                generation,
                event,
            } => self.handle_transport(&peer_id, generation, event).await,
            RoomEvent::RetryOffer {
                peer_id,
                generation,
            } => self.handle_retry(&peer_id, generation).await,
            RoomEvent::ScreenTrackEnded { track_id } => self.handle_screen_ended(&track_id).await,
            RoomEvent::Command(command) => return self.handle_command(command).await,
        }
        true
    }

    async fn handle_inbound(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::UserJoined(users) => self.handle_user_joined(users).await,
            ServerMessage::UserExists { error } => self.handle_user_exists(error).await,
            ServerMessage::CallOffer { signal, from, info } => {
                self.handle_inbound_call(signal, &from, info).await
            }
            ServerMessage::CallAnswer { signal, answer_id } => {
                self.handle_answer(signal, &answer_id).await
            }
            ServerMessage::UserLeft { user_id, user_name } => {
                self.handle_leave(&user_id, &user_name).await
            }
            ServerMessage::ToggleTrack { user_id, target } => {
                self.handle_remote_toggle(&user_id, target)
            }
        }
    }

    async fn handle_command(&mut self, command: RoomCommand) -> bool {
        match command {
            RoomCommand::Join {
                room_id,
                user_name,
                reply,
            } => {
                let _ = reply.send(self.join(&room_id, &user_name).await);
            }
            RoomCommand::CheckUser {
                room_id,
                user_name,
                reply,
            } => {
                let _ = reply.send(self.check_user(&room_id, &user_name));
            }
            RoomCommand::Leave { reply } => {
                self.leave_room().await;
                let _ = reply.send(());
            }
            RoomCommand::StartScreenShare { reply } => {
                let _ = reply.send(self.start_screen_share().await);
            }
            RoomCommand::StopScreenShare { reply } => {
                let _ = reply.send(self.stop_screen_share().await);
            }
            RoomCommand::SwitchCamera { device_id, reply } => {
                let _ = reply.send(self.switch_camera_device(&device_id).await);
            }
            RoomCommand::ToggleTrack { kind, reply } => {
                let _ = reply.send(self.toggle_local_track(kind));
            }
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            RoomCommand::Shutdown { reply } => {
                self.leave_room().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn emit(&self, update: RoomUpdate) {
        // нет подписчиков, это не ошибка
        let _ = self.updates.send(update);
    }

    fn position(&self, peer_id: &str) -> Option<usize> {
        self.peers.iter().position(|p| p.peer_id == peer_id)
    }

    fn next_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    fn local_info(&self) -> Option<UserInfo> {
        let joined = self.joined.as_ref()?;
        let flags = self.membership.get(&joined.user_name)?;
        Some(UserInfo {
            user_name: joined.user_name.clone(),
            video: flags.video,
            audio: flags.audio,
        })
    }

    fn local_caller_id(&self, user_name: &str) -> String {
        self.signaling
            .local_id()
            .unwrap_or_else(|| user_name.to_owned())
    }

    /// Захватывает камеру и микрофон, затем отправляет `join-room`.
    /// Ошибка захвата не оставляет следов в комнате.
    pub async fn join(&mut self, room_id: &str, user_name: &str) -> Result<(), RoomError> {
        if let Some(joined) = &self.joined {
            return Err(RoomError::AlreadyJoined(joined.room_id.clone()));
        }

        let stream = self
            .renegotiator
            .provider()
            .acquire(CaptureConstraints::camera_and_mic())
            .await
            .map_err(|e| {
                error!("media capture failed, not joining {}: {}", room_id, e);
                e
            })?;
        let mut media = LocalMediaSession::new(stream);

        if let Err(e) = self.signaling.send(ClientMessage::JoinRoom {
            room_id: room_id.to_owned(),
            user_name: user_name.to_owned(),
        }) {
            error!("failed to send join-room: {}", e);
            media.release();
            return Err(e.into());
        }

        let flags = TrackFlags {
            video: media.camera_video().is_some(),
            audio: media.audio().is_some(),
        };
        self.membership.insert(user_name, flags);
        self.media = Some(media);
        self.joined = Some(Joined {
            room_id: room_id.to_owned(),
            user_name: user_name.to_owned(),
        });

        info!("joining room {} as {}", room_id, user_name);
        self.emit(RoomUpdate::Joined {
            room_id: room_id.to_owned(),
        });
        Ok(())
    }

    /// Спрашивает relay, свободно ли имя; ответ приходит как `user-exists`
    pub fn check_user(&mut self, room_id: &str, user_name: &str) -> Result<(), RoomError> {
        self.signaling.send(ClientMessage::CheckUser {
            room_id: room_id.to_owned(),
            user_name: user_name.to_owned(),
        })?;
        self.checked_name = Some(user_name.to_owned());
        Ok(())
    }

    async fn handle_user_exists(&mut self, taken: bool) {
        if !taken {
            debug!("user name is free");
            return;
        }

        let user_name = self
            .joined
            .as_ref()
            .map(|j| j.user_name.clone())
            .or_else(|| self.checked_name.clone())
            .unwrap_or_default();
        warn!("user name {} is already taken", user_name);
        self.emit(RoomUpdate::UserNameTaken { user_name });
        self.leave_room().await;
    }

    async fn handle_user_joined(&mut self, users: Vec<JoinedUser>) {
        let Some(joined) = self.joined.clone() else {
            debug!("user-joined before join, dropping");
            return;
        };
        let local_id = self.signaling.local_id();

        for user in users {
            if user.info.user_name == joined.user_name
                || local_id.as_deref() == Some(user.user_id.as_str())
            {
                continue;
            }

            self.membership
                .insert(user.info.user_name.clone(), TrackFlags::from(&user.info));

            if self.position(&user.user_id).is_some() {
                debug!("[{}] already have a connection, skipping", user.user_id);
                continue;
            }

            self.open_outbound(user.user_id, user.info.user_name).await;
        }
    }

    async fn open_outbound(&mut self, peer_id: String, user_name: String) {
        let generation = self.next_generation();
        let mut connection = PeerConnection::new(peer_id.clone(), Role::Initiator, generation);
        let connected = connect_transport(
            self.transports.as_ref(),
            &self.events,
            self.media.as_ref(),
            &mut connection,
        )
        .await;
        if let Err(e) = connected {
            warn!("[{}] failed to create connection: {}", peer_id, e);
            return;
        }

        info!("[{}] creating peer for {}", peer_id, user_name);
        self.peers.push(PeerRecord {
            peer_id: peer_id.clone(),
            user_name: user_name.clone(),
            connection,
        });
        self.emit(RoomUpdate::PeerAdded {
            peer_id: peer_id.clone(),
            user_name,
        });

        self.send_offer(&peer_id).await;
    }

    async fn send_offer(&mut self, peer_id: &str) {
        let Some(idx) = self.position(peer_id) else {
            return;
        };
        let Some(info) = self.local_info() else {
            return;
        };
        let from = self.local_caller_id(&info.user_name);

        let result = self.peers[idx]
            .connection
            .start_offer(&self.signaling, &from, &info)
            .await;
        if let Err(e) = result {
            self.handle_peer_error(peer_id, e).await;
        }
    }

    /// Входящий звонок от участника, с которым ещё нет соединения.
    /// Offer для существующей записи отбрасывается (гонка встречных offer).
    pub async fn handle_inbound_call(&mut self, signal: Signal, from: &str, info: UserInfo) {
        if self.joined.is_none() {
            debug!("[{}] call-offer before join, dropping", from);
            return;
        }

        self.membership
            .insert(info.user_name.clone(), TrackFlags::from(&info));

        if self.position(from).is_some() {
            debug!("[{}] connection already exists, dropping offer", from);
            return;
        }

        info!("[{}] received call from {}", from, info.user_name);
        let generation = self.next_generation();
        let mut connection = PeerConnection::new(from, Role::Responder, generation);
        let connected = connect_transport(
            self.transports.as_ref(),
            &self.events,
            self.media.as_ref(),
            &mut connection,
        )
        .await;
        if let Err(e) = connected {
            warn!("[{}] failed to create connection: {}", from, e);
            return;
        }

        self.peers.push(PeerRecord {
            peer_id: from.to_owned(),
            user_name: info.user_name.clone(),
            connection,
        });
        self.emit(RoomUpdate::PeerAdded {
            peer_id: from.to_owned(),
            user_name: info.user_name,
        });

        let idx = self.peers.len() - 1;
        let result = self.peers[idx]
            .connection
            .accept_offer(&self.signaling, signal)
            .await;
        if let Err(e) = result {
            self.handle_peer_error(from, e).await;
        }
    }

    async fn handle_answer(&mut self, signal: Signal, answer_id: &str) {
        let Some(idx) = self.position(answer_id) else {
            debug!("[{}] call-answer for unknown peer, dropping", answer_id);
            return;
        };

        info!("[{}] processing accepted call", answer_id);
        match self.peers[idx].connection.apply_answer(signal).await {
            Ok(Applied::Entered(PeerState::Connected)) => self.on_connected(answer_id),
            Ok(_) => {}
            Err(e) => self.handle_peer_error(answer_id, e).await,
        }
    }

    async fn handle_transport(&mut self, peer_id: &str, generation: u64, event: TransportEvent) {
        let Some(idx) = self.position(peer_id) else {
            debug!("[{}] transport event for unknown peer, dropping", peer_id);
            return;
        };
        if self.peers[idx].connection.generation() != generation {
            debug!(
                "[{}] stale transport event from generation {}, dropping",
                peer_id, generation
            );
            return;
        }

        match event {
            TransportEvent::Connected => {
                info!("[{}] peer connected successfully", peer_id);
                if self.peers[idx].connection.confirm_handshake()
                    == Applied::Entered(PeerState::Connected)
                {
                    self.on_connected(peer_id);
                }
            }
            TransportEvent::RemoteTrack(track) => {
                let connection = &mut self.peers[idx].connection;
                connection.add_remote_track(track);
                if connection.state() == PeerState::Connected {
                    self.publish_remote(peer_id);
                }
            }
            TransportEvent::Failed(e) => self.handle_peer_error(peer_id, e).await,
        }
    }

    fn on_connected(&mut self, peer_id: &str) {
        self.emit(RoomUpdate::PeerConnected {
            peer_id: peer_id.to_owned(),
        });
        self.publish_remote(peer_id);
    }

    /// Отдаёт удалённый поток локальной медиа-сессии для отрисовки
    fn publish_remote(&mut self, peer_id: &str) {
        let Some(idx) = self.position(peer_id) else {
            return;
        };
        let stream = self.peers[idx].connection.remote_stream().clone();
        if stream.is_empty() {
            return;
        }
        if let Some(media) = self.media.as_mut() {
            media.attach_remote(peer_id, stream.clone());
        }
        self.emit(RoomUpdate::RemoteStreamReady {
            peer_id: peer_id.to_owned(),
            stream,
        });
    }

    async fn handle_peer_error(&mut self, peer_id: &str, err: PeerError) {
        let Some(idx) = self.position(peer_id) else {
            debug!("[{}] error for unknown peer: {}", peer_id, err);
            return;
        };

        match self.peers[idx].connection.classify_error(&err) {
            ErrorOutcome::Recover => {
                let generation = self.next_generation();
                let backoff = self.config.recovery_backoff();
                let events = self.events.clone();
                let retry_peer = peer_id.to_owned();

                let connection = &mut self.peers[idx].connection;
                connection.reset_for_recovery(generation).await;
                let task = tokio::spawn(async move {
                    sleep(backoff).await;
                    let _ = events.send(RoomEvent::RetryOffer {
                        peer_id: retry_peer,
                        generation,
                    });
                });
                connection.schedule_recovery(task);
                info!(
                    "[{}] retrying offer in {} ms",
                    peer_id,
                    backoff.as_millis()
                );
            }
            ErrorOutcome::Escalate => {
                warn!("[{}] peer error: {}", peer_id, err);
                self.remove_peer(idx, Some(err)).await;
            }
            ErrorOutcome::Ignore => {
                debug!("[{}] ignoring error: {}", peer_id, err);
            }
        }
    }

    async fn handle_retry(&mut self, peer_id: &str, generation: u64) {
        let Some(idx) = self.position(peer_id) else {
            debug!("[{}] retry for removed peer, dropping", peer_id);
            return;
        };
        let record = &mut self.peers[idx];
        if record.connection.generation() != generation
            || record.connection.state() != PeerState::New
        {
            debug!("[{}] stale retry, dropping", peer_id);
            return;
        }
        record.connection.recovery_fired();

        let connected = connect_transport(
            self.transports.as_ref(),
            &self.events,
            self.media.as_ref(),
            &mut self.peers[idx].connection,
        )
        .await;

        match connected {
            Ok(()) => {
                info!("[{}] recreated connection, sending offer again", peer_id);
                self.send_offer(peer_id).await;
            }
            Err(e) => self.handle_peer_error(peer_id, e).await,
        }
    }

    async fn remove_peer(&mut self, idx: usize, err: Option<PeerError>) -> PeerRecord {
        let mut record = self.peers.remove(idx);
        match err {
            Some(e) => record.connection.fail(e).await,
            None => record.connection.close().await,
        };
        if let Some(media) = self.media.as_mut() {
            media.detach_remote(&record.peer_id);
        }
        info!("[{}] removed peer {}", record.peer_id, record.user_name);
        self.emit(RoomUpdate::PeerRemoved {
            peer_id: record.peer_id.clone(),
            user_name: record.user_name.clone(),
        });
        record
    }

    async fn handle_leave(&mut self, user_id: &str, user_name: &str) {
        info!("user left: {}", user_name);
        match self.position(user_id) {
            Some(idx) => {
                let record = self.remove_peer(idx, None).await;
                self.membership.remove(&record.user_name);
            }
            None => {
                debug!("[{}] user-left without a connection", user_id);
            }
        }
        // запись могла быть удалена раньше из-за ошибки соединения
        self.membership.remove(user_name);
    }

    fn handle_remote_toggle(&mut self, user_id: &str, target: TrackKind) {
        let Some(idx) = self.position(user_id) else {
            debug!("[{}] toggle-track for unknown peer, dropping", user_id);
            return;
        };
        let user_name = self.peers[idx].user_name.clone();
        if let Some(enabled) = self.membership.toggle(&user_name, target) {
            debug!("[{}] remote {} enabled: {}", user_id, target, enabled);
            self.emit(RoomUpdate::MembershipChanged {
                user_name,
                target,
                enabled,
            });
        }
    }

    /// Отправляет уведомление об уходе, закрывает все соединения и
    /// освобождает захват. Повторный вызов ничего не делает.
    pub async fn leave_room(&mut self) {
        let Some(joined) = self.joined.take() else {
            debug!("leave requested but not in a room");
            return;
        };

        if let Err(e) = self.signaling.send(ClientMessage::UserLeft {
            room_id: joined.room_id.clone(),
            user_id: self.local_caller_id(&joined.user_name),
            user_name: joined.user_name.clone(),
        }) {
            warn!("failed to send leave notification: {}", e);
        }

        for mut record in std::mem::take(&mut self.peers) {
            record.connection.close().await;
            self.emit(RoomUpdate::PeerRemoved {
                peer_id: record.peer_id,
                user_name: record.user_name,
            });
        }
        if let Some(mut media) = self.media.take() {
            media.release();
        }
        self.membership.clear();
        self.checked_name = None;

        info!("left room {}", joined.room_id);
        self.emit(RoomUpdate::Left);
    }

    pub async fn start_screen_share(&mut self) -> Result<(), RoomError> {
        let media = self.media.as_mut().ok_or(RoomError::NotJoined)?;
        let connections = connections_mut(&mut self.peers);
        let screen = self
            .renegotiator
            .start_screen_share(media, connections)
            .await?;

        // пользователь может остановить демонстрацию из системного окна
        let events = self.events.clone();
        tokio::spawn(async move {
            screen.ended().await;
            let _ = events.send(RoomEvent::ScreenTrackEnded {
                track_id: screen.id().to_owned(),
            });
        });

        self.emit(RoomUpdate::ScreenShareStarted);
        Ok(())
    }

    pub async fn stop_screen_share(&mut self) -> Result<(), RoomError> {
        let media = self.media.as_mut().ok_or(RoomError::NotJoined)?;
        let connections = connections_mut(&mut self.peers);
        self.renegotiator
            .stop_screen_share(media, connections)
            .await?;
        self.emit(RoomUpdate::ScreenShareStopped);
        Ok(())
    }

    async fn handle_screen_ended(&mut self, track_id: &str) {
        let active = self
            .media
            .as_ref()
            .and_then(|m| m.screen())
            .is_some_and(|screen| screen.id() == track_id);
        if !active {
            return;
        }

        info!("screen track ended by the capture source");
        if let Err(e) = self.stop_screen_share().await {
            warn!("failed to stop screen share: {}", e);
        }
    }

    pub async fn switch_camera_device(&mut self, device_id: &str) -> Result<(), RoomError> {
        let media = self.media.as_mut().ok_or(RoomError::NotJoined)?;
        let connections = connections_mut(&mut self.peers);
        self.renegotiator
            .switch_camera_device(media, connections, device_id)
            .await?;
        Ok(())
    }

    /// Инвертирует локальный трек, обновляет таблицу и оповещает участников
    pub fn toggle_local_track(&mut self, kind: TrackKind) -> Result<bool, RoomError> {
        let joined = self.joined.clone().ok_or(RoomError::NotJoined)?;
        let media = self.media.as_ref().ok_or(RoomError::NotJoined)?;

        let enabled = self.renegotiator.toggle_local_track(media, kind)?;
        self.membership.set(&joined.user_name, kind, enabled);

        if let Err(e) = self.signaling.send(ClientMessage::ToggleTrack {
            room_id: joined.room_id,
            target: kind,
        }) {
            warn!("failed to notify peers about {} toggle: {}", kind, e);
        }

        self.emit(RoomUpdate::MembershipChanged {
            user_name: joined.user_name,
            target: kind,
            enabled,
        });
        Ok(enabled)
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.joined.as_ref().map(|j| j.room_id.clone()),
            user_name: self.joined.as_ref().map(|j| j.user_name.clone()),
            membership: self.membership.clone(),
            peers: self
                .peers
                .iter()
                .map(|p| PeerView {
                    peer_id: p.peer_id.clone(),
                    user_name: p.user_name.clone(),
                    state: p.connection.state(),
                    stream: p.connection.remote_stream().clone(),
                    outgoing_video: p.connection.outgoing_video(),
                })
                .collect(),
            media_mode: self.media.as_ref().map(|m| m.mode()),
            camera_video: self.media.as_ref().and_then(|m| m.camera_video()),
        }
    }
}

/// Собирает ссылки заранее: ленивый `map` с замыканием, удерживаемый
/// через `.await`, делает будущее цикла не-`Send`.
fn connections_mut(peers: &mut [PeerRecord]) -> Vec<&mut PeerConnection> {
    peers.iter_mut().map(|p| &mut p.connection).collect()
}

/// Создаёт транспорт и прикрепляет к нему текущие исходящие треки.
/// Во время демонстрации экрана камера запоминается для восстановления.
async fn connect_transport(
    transports: &dyn TransportFactory,
    events: &mpsc::UnboundedSender<RoomEvent>,
    media: Option<&LocalMediaSession>,
    connection: &mut PeerConnection,
) -> Result<(), PeerError> {
    let link = PeerLink::new(
        connection.peer_id().to_owned(),
        connection.generation(),
        events.clone(),
    );
    let (tracks, video, restore) = match media {
        Some(media) => (
            media.outgoing_tracks(),
            media.active_video(),
            match media.mode() {
                MediaMode::Screen => media.camera_video(),
                MediaMode::Camera => None,
            },
        ),
        None => (Vec::new(), None, None),
    };

    let transport = transports.connect(link, tracks).await?;
    connection.attach(transport, video);
    if restore.is_some() {
        connection.save_restore_video(restore);
    }
    Ok(())
}
