use medchat_llm::{ExchangeId, StreamEvent};
use snafu::Snafu;
use tokio::sync::mpsc;

use crate::chat::transcript::TranscriptError;

/// Message delivered to the exchange controller from the stream reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeEvent {
    Stream(StreamEvent),
    /// The provider stream closed; sent after the last event of an exchange.
    StreamClosed(ExchangeId),
}

/// Why a submission was ignored. The transcript is untouched in every case.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SubmitRejection {
    #[snafu(display("submission is empty after trimming"))]
    EmptyInput,
    #[snafu(display("chat session is not open"))]
    NotReady,
    #[snafu(display("exchange {active:?} is still in flight"))]
    ExchangeInFlight { active: ExchangeId },
    #[snafu(display("transcript refused the new turn: {source}"))]
    Transcript { source: TranscriptError },
}

/// Receiving end of the controller's event channel, owned by the event loop.
pub struct ExchangeEvents {
    events: mpsc::UnboundedReceiver<ExchangeEvent>,
}

impl ExchangeEvents {
    pub(crate) fn new(events: mpsc::UnboundedReceiver<ExchangeEvent>) -> Self {
        Self { events }
    }

    pub async fn recv(&mut self) -> Option<ExchangeEvent> {
        self.events.recv().await
    }
}
