use medchat_llm::ExchangeId;

/// Lifecycle of the single in-flight exchange.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExchangeState {
    #[default]
    Idle,
    AwaitingFirstToken(ExchangeId),
    Streaming(ExchangeId),
    Finalized(ExchangeId),
    Failed {
        exchange: ExchangeId,
        message: String,
    },
}

/// State transition input for the exchange lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeTransition {
    Start(ExchangeId),
    Token(ExchangeId),
    Complete(ExchangeId),
    Fail {
        exchange: ExchangeId,
        message: String,
    },
    ResetToIdle,
}

/// Rejection reason for illegal exchange transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeTransitionRejection {
    AlreadyInFlight {
        active: ExchangeId,
        attempted: ExchangeId,
    },
    NoActiveExchange,
    ExchangeMismatch {
        active: ExchangeId,
        attempted: ExchangeId,
    },
}

pub type ExchangeTransitionResult = Result<ExchangeState, ExchangeTransitionRejection>;

impl ExchangeState {
    /// Returns the exchange still waiting on the stream, if any.
    pub fn active_exchange(&self) -> Option<ExchangeId> {
        match self {
            Self::AwaitingFirstToken(exchange) | Self::Streaming(exchange) => Some(*exchange),
            Self::Idle | Self::Finalized(_) | Self::Failed { .. } => None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.active_exchange().is_some()
    }

    /// Returns true when incoming stream data belongs to the active exchange.
    pub fn accepts_stream_event(&self, exchange: ExchangeId) -> bool {
        self.active_exchange() == Some(exchange)
    }

    /// Applies one transition deterministically.
    ///
    /// Only a settled state may start a new exchange. Token and terminal transitions
    /// must name the active exchange exactly.
    pub fn apply(&self, transition: ExchangeTransition) -> ExchangeTransitionResult {
        match transition {
            ExchangeTransition::Start(exchange) => self.apply_start(exchange),
            ExchangeTransition::Token(exchange) => {
                self.require_active(exchange).map(|_| Self::Streaming(exchange))
            }
            ExchangeTransition::Complete(exchange) => {
                self.require_active(exchange).map(|_| Self::Finalized(exchange))
            }
            ExchangeTransition::Fail { exchange, message } => self
                .require_active(exchange)
                .map(|_| Self::Failed { exchange, message }),
            ExchangeTransition::ResetToIdle => self.apply_reset(),
        }
    }

    fn apply_start(&self, exchange: ExchangeId) -> ExchangeTransitionResult {
        match self.active_exchange() {
            Some(active) => Err(ExchangeTransitionRejection::AlreadyInFlight {
                active,
                attempted: exchange,
            }),
            None => Ok(Self::AwaitingFirstToken(exchange)),
        }
    }

    fn apply_reset(&self) -> ExchangeTransitionResult {
        match self.active_exchange() {
            // An exchange always runs to completion or failure before the next one.
            Some(active) => Err(ExchangeTransitionRejection::AlreadyInFlight {
                active,
                attempted: active,
            }),
            None => Ok(Self::Idle),
        }
    }

    fn require_active(&self, exchange: ExchangeId) -> Result<ExchangeId, ExchangeTransitionRejection> {
        match self.active_exchange() {
            Some(active) if active == exchange => Ok(active),
            Some(active) => Err(ExchangeTransitionRejection::ExchangeMismatch {
                active,
                attempted: exchange,
            }),
            None => Err(ExchangeTransitionRejection::NoActiveExchange),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIRST: ExchangeId = ExchangeId::new(1);
    const SECOND: ExchangeId = ExchangeId::new(2);

    #[test]
    fn happy_path_walks_every_state() {
        let state = ExchangeState::Idle;
        let state = state.apply(ExchangeTransition::Start(FIRST)).unwrap();
        assert_eq!(state, ExchangeState::AwaitingFirstToken(FIRST));

        let state = state.apply(ExchangeTransition::Token(FIRST)).unwrap();
        assert_eq!(state, ExchangeState::Streaming(FIRST));

        let state = state.apply(ExchangeTransition::Token(FIRST)).unwrap();
        assert_eq!(state, ExchangeState::Streaming(FIRST));

        let state = state.apply(ExchangeTransition::Complete(FIRST)).unwrap();
        assert_eq!(state, ExchangeState::Finalized(FIRST));

        let state = state.apply(ExchangeTransition::ResetToIdle).unwrap();
        assert_eq!(state, ExchangeState::Idle);
    }

    #[test]
    fn completion_without_tokens_is_allowed() {
        let state = ExchangeState::AwaitingFirstToken(FIRST);
        assert_eq!(
            state.apply(ExchangeTransition::Complete(FIRST)),
            Ok(ExchangeState::Finalized(FIRST))
        );
    }

    #[test]
    fn failure_from_either_in_flight_state() {
        for state in [
            ExchangeState::AwaitingFirstToken(FIRST),
            ExchangeState::Streaming(FIRST),
        ] {
            let next = state
                .apply(ExchangeTransition::Fail {
                    exchange: FIRST,
                    message: "broken pipe".to_string(),
                })
                .unwrap();
            assert_eq!(
                next,
                ExchangeState::Failed {
                    exchange: FIRST,
                    message: "broken pipe".to_string(),
                }
            );
            assert!(!next.is_in_flight());
        }
    }

    #[test]
    fn start_is_rejected_while_in_flight() {
        let state = ExchangeState::Streaming(FIRST);
        assert_eq!(
            state.apply(ExchangeTransition::Start(SECOND)),
            Err(ExchangeTransitionRejection::AlreadyInFlight {
                active: FIRST,
                attempted: SECOND,
            })
        );
        assert!(state.apply(ExchangeTransition::ResetToIdle).is_err());
    }

    #[test]
    fn stale_exchange_events_are_rejected() {
        let state = ExchangeState::Streaming(SECOND);
        assert!(!state.accepts_stream_event(FIRST));
        assert_eq!(
            state.apply(ExchangeTransition::Token(FIRST)),
            Err(ExchangeTransitionRejection::ExchangeMismatch {
                active: SECOND,
                attempted: FIRST,
            })
        );
        assert_eq!(
            ExchangeState::Idle.apply(ExchangeTransition::Complete(FIRST)),
            Err(ExchangeTransitionRejection::NoActiveExchange)
        );
    }
}
