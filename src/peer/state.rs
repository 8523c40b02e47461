//! Машина состояний рукопожатия с одним удалённым участником.
//!
//! ```text
//! New --Initiate--> OfferSent --RemoteAnswer--> Connected
//! New --RemoteOffer--> AnswerSent --HandshakeConfirmed--> Connected
//! New --any error--> Failed
//! any non-terminal --fatal error--> Failed
//! any non-terminal --Close--> Closed
//! ```

use crate::error::PeerError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerState {
    New,
    OfferSent,
    AnswerSent,
    Connected,
    Failed,
    Closed,
}

impl PeerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PeerState::Failed | PeerState::Closed)
    }

    /// Рукопожатие ещё идёт
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            PeerState::New | PeerState::OfferSent | PeerState::AnswerSent
        )
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeerState::New => "new",
            PeerState::OfferSent => "offer-sent",
            PeerState::AnswerSent => "answer-sent",
            PeerState::Connected => "connected",
            PeerState::Failed => "failed",
            PeerState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Входы машины состояний
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerInput {
    /// Мы начинаем исходящее рукопожатие
    Initiate,
    RemoteOffer,
    RemoteAnswer,
    /// Транспорт подтвердил установку соединения
    HandshakeConfirmed,
    Error(PeerError),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Enter(PeerState),
    /// Вход устарел или дублирует уже применённый
    Discard,
    /// Гонка рукопожатия: пересоздать соединение и повторить offer
    Recover,
}

/// Чистая функция переходов.
///
/// `recovery_available`: не израсходована ли единственная попытка
/// восстановления для текущего рукопожатия.
pub fn transition(state: PeerState, input: &PeerInput, recovery_available: bool) -> Step {
    use PeerInput::*;
    use PeerState::*;

    if state.is_terminal() {
        return Step::Discard;
    }

    match (state, input) {
        (New, Initiate) => Step::Enter(OfferSent),
        (New, RemoteOffer) => Step::Enter(AnswerSent),
        (OfferSent, RemoteAnswer) => Step::Enter(Connected),
        (AnswerSent, HandshakeConfirmed) => Step::Enter(Connected),

        // рукопожатие ещё не начато: записи без транспорта не остаётся
        (New, Error(_)) => Step::Enter(Failed),
        (OfferSent, Error(e)) if e.is_benign() => {
            if recovery_available {
                Step::Recover
            } else {
                Step::Enter(Failed)
            }
        }
        (_, Error(e)) if e.is_benign() => Step::Discard,
        (_, Error(_)) => Step::Enter(Failed),

        (_, Close) => Step::Enter(Closed),

        _ => Step::Discard,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn benign() -> PeerInput {
        PeerInput::Error(PeerError::WrongState("stable".into()))
    }

    fn fatal() -> PeerInput {
        PeerInput::Error(PeerError::Rtc("dtls".into()))
    }

    #[test]
    fn outbound_handshake() {
        assert_eq!(
            transition(PeerState::New, &PeerInput::Initiate, true),
            Step::Enter(PeerState::OfferSent)
        );
        assert_eq!(
            transition(PeerState::OfferSent, &PeerInput::RemoteAnswer, true),
            Step::Enter(PeerState::Connected)
        );
    }

    #[test]
    fn inbound_handshake() {
        assert_eq!(
            transition(PeerState::New, &PeerInput::RemoteOffer, true),
            Step::Enter(PeerState::AnswerSent)
        );
        assert_eq!(
            transition(PeerState::AnswerSent, &PeerInput::HandshakeConfirmed, true),
            Step::Enter(PeerState::Connected)
        );
    }

    #[test]
    fn signals_after_connect_are_discarded() {
        for input in [PeerInput::RemoteAnswer, PeerInput::RemoteOffer, PeerInput::Initiate] {
            assert_eq!(transition(PeerState::Connected, &input, true), Step::Discard);
        }
    }

    #[test]
    fn terminal_states_ignore_everything() {
        for state in [PeerState::Closed, PeerState::Failed] {
            for input in [PeerInput::RemoteAnswer, PeerInput::Close, fatal(), benign()] {
                assert_eq!(transition(state, &input, true), Step::Discard);
            }
        }
    }

    #[test]
    fn benign_error_recovers_once_while_offer_sent() {
        assert_eq!(transition(PeerState::OfferSent, &benign(), true), Step::Recover);
        assert_eq!(
            transition(PeerState::OfferSent, &benign(), false),
            Step::Enter(PeerState::Failed)
        );
    }

    #[test]
    fn any_error_before_handshake_fails() {
        for recovery in [true, false] {
            assert_eq!(
                transition(PeerState::New, &benign(), recovery),
                Step::Enter(PeerState::Failed)
            );
        }
    }

    #[test]
    fn benign_error_elsewhere_is_ignored() {
        assert_eq!(transition(PeerState::AnswerSent, &benign(), true), Step::Discard);
        assert_eq!(transition(PeerState::Connected, &benign(), true), Step::Discard);
    }

    #[test]
    fn fatal_error_fails_any_live_state() {
        for state in [
            PeerState::New,
            PeerState::OfferSent,
            PeerState::AnswerSent,
            PeerState::Connected,
        ] {
            assert_eq!(transition(state, &fatal(), true), Step::Enter(PeerState::Failed));
        }
    }

    #[test]
    fn close_from_live_states() {
        for state in [
            PeerState::New,
            PeerState::OfferSent,
            PeerState::AnswerSent,
            PeerState::Connected,
        ] {
            assert_eq!(
                transition(state, &PeerInput::Close, true),
                Step::Enter(PeerState::Closed)
            );
        }
    }

    #[test]
    fn answer_out_of_order_is_discarded() {
        assert_eq!(transition(PeerState::New, &PeerInput::RemoteAnswer, true), Step::Discard);
        assert_eq!(
            transition(PeerState::AnswerSent, &PeerInput::RemoteAnswer, true),
            Step::Discard
        );
        assert_eq!(
            transition(PeerState::OfferSent, &PeerInput::HandshakeConfirmed, true),
            Step::Discard
        );
    }
}
