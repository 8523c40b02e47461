use crate::error::PeerError;
use crate::media::{LocalTrack, RemoteStream, RemoteTrack};
use crate::peer::state::{transition, PeerInput, PeerState, Step};
use crate::peer::transport::PeerTransport;
use crate::peer::types::Role;
use crate::signaling::{ClientMessage, Signal, SignalingChannel, UserInfo};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Результат применения входа к машине состояний
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Entered(PeerState),
    Discarded,
}

/// Что делать с ошибкой соединения
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOutcome {
    /// Пересоздать соединение и повторить offer после паузы
    Recover,
    /// Соединение упало, запись нужно удалить
    Escalate,
    Ignore,
}

/// Состояние рукопожатия и транспорт одного удалённого участника
pub struct PeerConnection {
    peer_id: String,
    role: Role,
    state: PeerState,
    generation: u64,
    transport: Option<Box<dyn PeerTransport>>,
    recovery_used: bool,
    recovery_task: Option<JoinHandle<()>>,
    outgoing_video: Option<Arc<LocalTrack>>,
    restore_video: Option<Arc<LocalTrack>>,
    remote: RemoteStream,
}

impl PeerConnection {
    pub fn new(peer_id: impl Into<String>, role: Role, generation: u64) -> Self {
        Self {
            peer_id: peer_id.into(),
            role,
            state: PeerState::New,
            generation,
            transport: None,
            recovery_used: false,
            recovery_task: None,
            outgoing_video: None,
            restore_video: None,
            remote: RemoteStream::default(),
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    pub fn recovery_pending(&self) -> bool {
        self.recovery_task.is_some()
    }

    pub fn outgoing_video(&self) -> Option<Arc<LocalTrack>> {
        self.outgoing_video.clone()
    }

    pub fn remote_stream(&self) -> &RemoteStream {
        &self.remote
    }

    /// Привязывает свежий транспорт; исходящее видео уже прикреплено к нему
    pub fn attach(&mut self, transport: Box<dyn PeerTransport>, video: Option<Arc<LocalTrack>>) {
        self.transport = Some(transport);
        self.outgoing_video = video;
    }

    fn enter(&mut self, next: PeerState) {
        if self.state != next {
            debug!("[{}] {} -> {}", self.peer_id, self.state, next);
            self.state = next;
        }
    }

    fn step(&self, input: &PeerInput) -> Step {
        transition(self.state, input, !self.recovery_used)
    }

    fn transport(&self) -> Result<&dyn PeerTransport, PeerError> {
        self.transport.as_deref().ok_or(PeerError::Closed)
    }

    /// New → OfferSent: создаёт offer и отправляет ровно один `call-offer`
    pub async fn start_offer(
        &mut self,
        signaling: &SignalingChannel,
        from: &str,
        info: &UserInfo,
    ) -> Result<Applied, PeerError> {
        let next = match self.step(&PeerInput::Initiate) {
            Step::Enter(next) => next,
            _ => return Ok(Applied::Discarded),
        };

        let signal = self.transport()?.create_offer().await?;
        info!("[{}] sending initial offer", self.peer_id);
        signaling
            .send(ClientMessage::CallOffer {
                user_to_call: self.peer_id.clone(),
                from: from.to_owned(),
                signal,
                info: info.clone(),
            })
            .map_err(|e| PeerError::Transport(e.to_string()))?;

        self.enter(next);
        Ok(Applied::Entered(next))
    }

    /// New → AnswerSent: применяет входящий offer и отправляет `call-answer`
    pub async fn accept_offer(
        &mut self,
        signaling: &SignalingChannel,
        offer: Signal,
    ) -> Result<Applied, PeerError> {
        let next = match self.step(&PeerInput::RemoteOffer) {
            Step::Enter(next) => next,
            _ => {
                debug!("[{}] ignoring offer in state {}", self.peer_id, self.state);
                return Ok(Applied::Discarded);
            }
        };

        let answer = self.transport()?.accept_offer(offer).await?;
        info!("[{}] sending answer", self.peer_id);
        signaling
            .send(ClientMessage::CallAnswer {
                signal: answer,
                to: self.peer_id.clone(),
            })
            .map_err(|e| PeerError::Transport(e.to_string()))?;

        self.enter(next);
        Ok(Applied::Entered(next))
    }

    /// OfferSent → Connected. В Connected/Closed повторный answer отбрасывается.
    pub async fn apply_answer(&mut self, answer: Signal) -> Result<Applied, PeerError> {
        let next = match self.step(&PeerInput::RemoteAnswer) {
            Step::Enter(next) => next,
            _ => {
                debug!("[{}] ignoring answer in state {}", self.peer_id, self.state);
                return Ok(Applied::Discarded);
            }
        };

        self.transport()?.apply_answer(answer).await?;
        self.enter(next);
        Ok(Applied::Entered(next))
    }

    /// AnswerSent → Connected по подтверждению от транспорта
    pub fn confirm_handshake(&mut self) -> Applied {
        match self.step(&PeerInput::HandshakeConfirmed) {
            Step::Enter(next) => {
                self.enter(next);
                Applied::Entered(next)
            }
            _ => Applied::Discarded,
        }
    }

    pub fn add_remote_track(&mut self, track: RemoteTrack) {
        self.remote.add(track);
    }

    pub fn classify_error(&self, err: &PeerError) -> ErrorOutcome {
        match self.step(&PeerInput::Error(err.clone())) {
            Step::Recover => ErrorOutcome::Recover,
            Step::Enter(_) => ErrorOutcome::Escalate,
            Step::Discard => ErrorOutcome::Ignore,
        }
    }

    /// Уничтожает текущий транспорт и возвращается в New с новым поколением.
    /// Попытка восстановления расходуется до конца рукопожатия.
    pub async fn reset_for_recovery(&mut self, generation: u64) {
        warn!("[{}] recovering from wrong state, destroying connection", self.peer_id);
        self.release().await;
        self.recovery_used = true;
        self.generation = generation;
        self.remote = RemoteStream::default();
        self.state = PeerState::New;
    }

    pub fn schedule_recovery(&mut self, task: JoinHandle<()>) {
        self.cancel_recovery();
        self.recovery_task = Some(task);
    }

    /// Вызывается, когда отложенный повтор сработал
    pub fn recovery_fired(&mut self) {
        self.recovery_task = None;
    }

    pub fn cancel_recovery(&mut self) {
        if let Some(task) = self.recovery_task.take() {
            debug!("[{}] cancelling pending recovery", self.peer_id);
            task.abort();
        }
    }

    pub async fn close(&mut self) -> Applied {
        self.finish(PeerInput::Close).await
    }

    pub async fn fail(&mut self, err: PeerError) -> Applied {
        self.finish(PeerInput::Error(err)).await
    }

    async fn finish(&mut self, input: PeerInput) -> Applied {
        self.cancel_recovery();
        // в терминальное состояние ведёт любой фатальный вход, включая исчерпанное восстановление
        let next = match self.step(&input) {
            Step::Enter(next) if next.is_terminal() => next,
            Step::Recover | Step::Enter(_) => PeerState::Failed,
            Step::Discard if !self.state.is_terminal() => PeerState::Failed,
            Step::Discard => return Applied::Discarded,
        };
        self.release().await;
        self.enter(next);
        Applied::Entered(next)
    }

    /// Освобождает транспорт; повторный вызов ничего не делает
    async fn release(&mut self) {
        if let Some(transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                warn!("[{}] error while closing connection: {}", self.peer_id, e);
            }
        }
    }

    /// Подменяет исходящее видео, возвращает прежний трек
    pub async fn swap_video(
        &mut self,
        track: Arc<LocalTrack>,
    ) -> Result<Option<Arc<LocalTrack>>, PeerError> {
        if let Some(transport) = self.transport.as_deref() {
            transport
                .replace_video_track(track.clone())
                .await
                .map_err(|e| match e {
                    PeerError::TrackReplace(_) => e,
                    other => PeerError::TrackReplace(other.to_string()),
                })?;
        }
        Ok(self.outgoing_video.replace(track))
    }

    pub fn save_restore_video(&mut self, track: Option<Arc<LocalTrack>>) {
        self.restore_video = track;
    }

    pub fn take_restore_video(&mut self) -> Option<Arc<LocalTrack>> {
        self.restore_video.take()
    }

    pub fn restore_video(&self) -> Option<&Arc<LocalTrack>> {
        self.restore_video.as_ref()
    }
}

impl Drop for PeerConnection {
    fn drop(&mut self) {
        self.cancel_recovery();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SignalingError;
    use crate::signaling::{MessageKind, SdpType, SignalingTransport};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Counters {
        offers: AtomicUsize,
        answers_applied: AtomicUsize,
        closes: AtomicUsize,
    }

    struct StubTransport {
        counters: Arc<Counters>,
        answer_error: Option<PeerError>,
    }

    #[async_trait]
    impl PeerTransport for StubTransport {
        async fn create_offer(&self) -> Result<Signal, PeerError> {
            self.counters.offers.fetch_add(1, Ordering::SeqCst);
            Ok(Signal::offer("v=0 offer".into()))
        }

        async fn accept_offer(&self, offer: Signal) -> Result<Signal, PeerError> {
            Ok(Signal::answer("v=0 answer".into(), offer.id))
        }

        async fn apply_answer(&self, _answer: Signal) -> Result<(), PeerError> {
            self.counters.answers_applied.fetch_add(1, Ordering::SeqCst);
            match &self.answer_error {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }

        async fn replace_video_track(&self, _track: Arc<LocalTrack>) -> Result<(), PeerError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), PeerError> {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Outbox(Mutex<Vec<String>>);

    impl SignalingTransport for Outbox {
        fn send(&self, frame: String) -> Result<(), SignalingError> {
            self.0.lock().unwrap().push(frame);
            Ok(())
        }

        fn local_id(&self) -> Option<String> {
            Some("a1".into())
        }

        fn listen(&self, _kind: MessageKind) {}
    }

    fn info() -> UserInfo {
        UserInfo {
            user_name: "A".into(),
            video: true,
            audio: true,
        }
    }

    fn answer() -> Signal {
        Signal {
            sdp_type: SdpType::Answer,
            sdp: "v=0".into(),
            id: "x".into(),
            ts: 0,
        }
    }

    fn connection(counters: &Arc<Counters>, answer_error: Option<PeerError>) -> PeerConnection {
        let mut conn = PeerConnection::new("b1", Role::Initiator, 1);
        conn.attach(
            Box::new(StubTransport {
                counters: counters.clone(),
                answer_error,
            }),
            None,
        );
        conn
    }

    #[tokio::test]
    async fn offer_then_answer_connects_once() {
        let counters = Arc::new(Counters::default());
        let outbox = Arc::new(Outbox::default());
        let signaling = SignalingChannel::new(outbox.clone());
        let mut conn = connection(&counters, None);

        assert_eq!(
            conn.start_offer(&signaling, "a1", &info()).await.unwrap(),
            Applied::Entered(PeerState::OfferSent)
        );
        assert_eq!(
            conn.start_offer(&signaling, "a1", &info()).await.unwrap(),
            Applied::Discarded
        );
        assert_eq!(outbox.0.lock().unwrap().len(), 1);

        assert_eq!(
            conn.apply_answer(answer()).await.unwrap(),
            Applied::Entered(PeerState::Connected)
        );
        assert_eq!(conn.apply_answer(answer()).await.unwrap(), Applied::Discarded);
        assert_eq!(counters.answers_applied.load(Ordering::SeqCst), 1);
        assert_eq!(counters.offers.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_releases_transport_once() {
        let counters = Arc::new(Counters::default());
        let mut conn = connection(&counters, None);

        assert_eq!(conn.close().await, Applied::Entered(PeerState::Closed));
        assert_eq!(conn.close().await, Applied::Discarded);
        assert_eq!(conn.fail(PeerError::Closed).await, Applied::Discarded);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
        assert!(!conn.has_transport());
    }

    #[tokio::test]
    async fn wrong_state_answer_is_recoverable_once() {
        let counters = Arc::new(Counters::default());
        let signaling = SignalingChannel::new(Arc::new(Outbox::default()));
        let mut conn = connection(&counters, Some(PeerError::WrongState("stable".into())));
        conn.start_offer(&signaling, "a1", &info()).await.unwrap();

        let err = conn.apply_answer(answer()).await.unwrap_err();
        assert_eq!(conn.classify_error(&err), ErrorOutcome::Recover);

        conn.reset_for_recovery(2).await;
        assert_eq!(conn.state(), PeerState::New);
        assert_eq!(conn.generation(), 2);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);

        conn.attach(
            Box::new(StubTransport {
                counters: counters.clone(),
                answer_error: Some(PeerError::WrongState("stable".into())),
            }),
            None,
        );
        conn.start_offer(&signaling, "a1", &info()).await.unwrap();
        let err = conn.apply_answer(answer()).await.unwrap_err();
        assert_eq!(conn.classify_error(&err), ErrorOutcome::Escalate);

        assert_eq!(conn.fail(err).await, Applied::Entered(PeerState::Failed));
    }

    #[tokio::test]
    async fn drop_aborts_pending_recovery() {
        let conn_task = tokio::spawn(std::future::pending::<()>());
        let abort = conn_task.abort_handle();
        {
            let mut conn = PeerConnection::new("b1", Role::Initiator, 1);
            conn.schedule_recovery(conn_task);
            assert!(conn.recovery_pending());
        }
        for _ in 0..10 {
            if abort.is_finished() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(abort.is_finished());
    }
}
