use std::sync::Arc;

use medchat_llm::{
    ChatSession, ExchangeId, ProviderResult, ProviderStreamHandle, StreamEvent,
    StreamEventPayload,
};
use snafu::ResultExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::chat::events::{
    EmptyInputSnafu, ExchangeEvent, ExchangeEvents, ExchangeInFlightSnafu, NotReadySnafu,
    SubmitRejection, TranscriptSnafu,
};
use crate::chat::exchange::{ExchangeState, ExchangeTransition};
use crate::chat::message::MessageId;
use crate::chat::transcript::Transcript;

/// Replacement text for an assistant message whose stream failed.
pub const APOLOGY_TEXT: &str =
    "I apologize, but I encountered an error processing your request. Please try again.";

/// Shown once when the session cannot be opened at startup.
pub const CONFIGURATION_ERROR_TEXT: &str =
    "Error: API Key missing or invalid. Please check your configuration.";

/// Coordinator-level metadata for the exchange in flight.
#[derive(Debug, Clone, Copy)]
struct ActiveExchange {
    exchange: ExchangeId,
    assistant_message_id: MessageId,
}

/// Owns the transcript and the chat session, and runs one turn at a time.
///
/// Every mutation happens through `&mut self` on the task that owns the controller.
/// Stream IO runs on spawned tasks that only talk back through [`ExchangeEvents`].
pub struct ExchangeController {
    transcript: Transcript,
    session: Option<Arc<dyn ChatSession>>,
    state: ExchangeState,
    active: Option<ActiveExchange>,
    next_exchange_id: u64,
    event_tx: mpsc::UnboundedSender<ExchangeEvent>,
    worker_task: Option<JoinHandle<()>>,
    reader_task: Option<JoinHandle<()>>,
}

impl ExchangeController {
    /// Opens the session exactly once and returns the controller with its event receiver.
    ///
    /// A failed open leaves the controller permanently not ready, with one system
    /// message in the transcript describing the problem.
    pub fn bootstrap<F>(open: F) -> (Self, ExchangeEvents)
    where
        F: FnOnce() -> ProviderResult<Arc<dyn ChatSession>>,
    {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut transcript = Transcript::new();

        let session = match open() {
            Ok(session) => {
                tracing::info!(model_id = %session.model_id(), "chat session ready");
                Some(session)
            }
            Err(error) => {
                tracing::error!(
                    stage = error.stage(),
                    configuration = error.is_configuration(),
                    error = %error,
                    "failed to open chat session"
                );
                if let Err(error) = transcript.push_system(CONFIGURATION_ERROR_TEXT) {
                    tracing::error!(error = %error, "could not record bootstrap failure");
                }
                None
            }
        };

        let controller = Self {
            transcript,
            session,
            state: ExchangeState::Idle,
            active: None,
            next_exchange_id: 1,
            event_tx,
            worker_task: None,
            reader_task: None,
        };

        (controller, ExchangeEvents::new(event_rx))
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn state(&self) -> &ExchangeState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.session.is_some()
    }

    pub fn can_submit(&self) -> bool {
        self.is_ready() && !self.state.is_in_flight()
    }

    pub fn model_id(&self) -> Option<&str> {
        self.session.as_deref().map(|session| session.model_id())
    }

    /// Starts a new turn with the trimmed `text`.
    ///
    /// Must be called from within a tokio runtime: the provider stream is spawned.
    pub fn submit(&mut self, text: &str) -> Result<ExchangeId, SubmitRejection> {
        let text = text.trim();
        if text.is_empty() {
            return EmptyInputSnafu.fail();
        }

        let Some(session) = self.session.clone() else {
            return NotReadySnafu.fail();
        };

        if let Some(active) = self.state.active_exchange() {
            // Single-stream rule: the running exchange always finishes first.
            return ExchangeInFlightSnafu { active }.fail();
        }

        let exchange = ExchangeId::new(self.next_exchange_id);
        let next_state = self
            .state
            .apply(ExchangeTransition::Start(exchange))
            .map_err(|_| SubmitRejection::ExchangeInFlight { active: exchange })?;

        self.transcript.push_user(text).context(TranscriptSnafu)?;
        let assistant_message_id = self
            .transcript
            .open_placeholder(exchange)
            .context(TranscriptSnafu)?;

        // Reserve the id immediately so a later exchange never reuses it.
        self.next_exchange_id = self.next_exchange_id.saturating_add(1);
        self.state = next_state;
        self.active = Some(ActiveExchange {
            exchange,
            assistant_message_id,
        });

        tracing::debug!(exchange = ?exchange, prompt_len = text.len(), "exchange started");

        match session.send(exchange, text.to_string()) {
            Ok(handle) => self.spawn_stream_pipeline(handle),
            Err(error) => {
                tracing::error!(exchange = ?exchange, error = %error, "failed to send turn");
                self.fail_exchange(exchange, error.to_string());
            }
        }

        Ok(exchange)
    }

    /// Applies one event from the stream reader.
    pub fn handle_event(&mut self, event: ExchangeEvent) {
        match event {
            ExchangeEvent::Stream(event) => self.handle_stream_event(event),
            ExchangeEvent::StreamClosed(exchange) => self.handle_stream_closed(exchange),
        }
    }

    /// Processes events until the current exchange has settled.
    pub async fn drive_until_idle(&mut self, events: &mut ExchangeEvents) {
        while self.state.is_in_flight() {
            let Some(event) = events.recv().await else {
                break;
            };
            self.handle_event(event);
        }
    }

    fn spawn_stream_pipeline(&mut self, handle: ProviderStreamHandle) {
        let ProviderStreamHandle { mut stream, worker } = handle;
        self.worker_task = Some(tokio::spawn(worker));

        let event_tx = self.event_tx.clone();
        self.reader_task = Some(tokio::spawn(async move {
            let exchange = stream.exchange();
            while let Some(event) = stream.recv().await {
                if event_tx.send(ExchangeEvent::Stream(event)).is_err() {
                    return;
                }
            }
            let _ = event_tx.send(ExchangeEvent::StreamClosed(exchange));
        }));
    }

    fn handle_stream_event(&mut self, event: StreamEvent) {
        if !self.stream_event_is_current(event.exchange) {
            // Strict id equality keeps a settled exchange from leaking into the next one.
            tracing::debug!(exchange = ?event.exchange, "dropping stale stream event");
            return;
        }

        match event.payload {
            StreamEventPayload::Delta(chunk) => self.apply_delta(event.exchange, &chunk),
            StreamEventPayload::Done => self.finish_exchange(event.exchange),
            StreamEventPayload::Error(message) => self.fail_exchange(event.exchange, message),
        }
    }

    fn handle_stream_closed(&mut self, exchange: ExchangeId) {
        if !self.stream_event_is_current(exchange) {
            return;
        }

        tracing::warn!(exchange = ?exchange, "provider stream closed before a terminal event");
        self.fail_exchange(
            exchange,
            "provider stream ended before a terminal event".to_string(),
        );
    }

    fn apply_delta(&mut self, exchange: ExchangeId, chunk: &str) {
        let Some(active) = self.active else {
            return;
        };

        match self.state.apply(ExchangeTransition::Token(exchange)) {
            Ok(next_state) => self.state = next_state,
            Err(rejection) => {
                tracing::warn!(exchange = ?exchange, ?rejection, "delta rejected");
                return;
            }
        }

        if let Err(error) = self
            .transcript
            .append_text(active.assistant_message_id, chunk)
        {
            // A fragment that cannot be stored must not vanish silently.
            self.fail_exchange(exchange, error.to_string());
        }
    }

    fn finish_exchange(&mut self, exchange: ExchangeId) {
        let Some(active) = self.active_for(exchange) else {
            return;
        };

        match self.state.apply(ExchangeTransition::Complete(exchange)) {
            Ok(next_state) => self.state = next_state,
            Err(rejection) => {
                tracing::warn!(exchange = ?exchange, ?rejection, "completion rejected");
                return;
            }
        }

        if let Err(error) = self.transcript.finalize(active.assistant_message_id) {
            tracing::error!(exchange = ?exchange, error = %error, "failed to finalize reply");
        }

        tracing::info!(exchange = ?exchange, "exchange finalized");
        self.settle();
    }

    fn fail_exchange(&mut self, exchange: ExchangeId, message: String) {
        let Some(active) = self.active_for(exchange) else {
            return;
        };

        match self.state.apply(ExchangeTransition::Fail {
            exchange,
            message: message.clone(),
        }) {
            Ok(next_state) => self.state = next_state,
            Err(rejection) => {
                tracing::warn!(exchange = ?exchange, ?rejection, "failure rejected");
                return;
            }
        }

        if let Err(error) = self
            .transcript
            .fail(active.assistant_message_id, APOLOGY_TEXT, message.as_str())
        {
            tracing::error!(exchange = ?exchange, error = %error, "failed to record failed reply");
        }

        tracing::warn!(exchange = ?exchange, error = %message, "exchange failed");
        self.settle();
    }

    /// Finalized and Failed hand straight back to Idle.
    fn settle(&mut self) {
        match self.state.apply(ExchangeTransition::ResetToIdle) {
            Ok(next_state) => self.state = next_state,
            Err(rejection) => tracing::error!(?rejection, "cannot return to idle"),
        }

        self.active = None;
        // Both tasks wind down on their own once the stream is exhausted.
        self.worker_task = None;
        self.reader_task = None;
    }

    fn active_for(&self, exchange: ExchangeId) -> Option<ActiveExchange> {
        self.active.filter(|active| active.exchange == exchange)
    }

    fn stream_event_is_current(&self, exchange: ExchangeId) -> bool {
        self.active_for(exchange).is_some() && self.state.accepts_stream_event(exchange)
    }
}

impl Drop for ExchangeController {
    fn drop(&mut self) {
        // Aborting the reader drops the provider stream, which stops the worker too.
        if let Some(reader_task) = self.reader_task.take() {
            reader_task.abort();
        }
        if let Some(worker_task) = self.worker_task.take() {
            worker_task.abort();
        }
    }
}
