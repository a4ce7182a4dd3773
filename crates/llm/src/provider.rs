use std::future::Future;
use std::pin::Pin;

use snafu::Snafu;
use tokio::sync::{mpsc, oneshot};

/// Identifier for one user turn and the stream it opened.
///
/// A new id is allocated on every submit so events from a finished turn can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExchangeId(pub u64);

impl ExchangeId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_key: String,
    pub endpoint: String,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into().trim().to_string(),
            endpoint: endpoint.into().trim().to_string(),
        }
    }
}

/// Provider-agnostic stream payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventPayload {
    /// Non-empty reply fragment, in generation order.
    Delta(String),
    Done,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub exchange: ExchangeId,
    pub payload: StreamEventPayload,
}

impl StreamEvent {
    pub fn new(exchange: ExchangeId, payload: StreamEventPayload) -> Self {
        Self { exchange, payload }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.payload,
            StreamEventPayload::Done | StreamEventPayload::Error(_)
        )
    }
}

pub type ProviderWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderError {
    #[snafu(display("missing API key for the Gemini provider"))]
    MissingApiKey { stage: &'static str },
    #[snafu(display("http client failed on `{stage}`, {source}"))]
    HttpClient {
        stage: &'static str,
        source: rig::http_client::Error,
    },
    #[snafu(display("cannot send an empty prompt for {exchange:?}"))]
    EmptyPrompt {
        stage: &'static str,
        exchange: ExchangeId,
    },
    #[snafu(display("completions failed on `{stage}`, {source}"))]
    CompletionsFailed {
        stage: &'static str,
        source: rig::completion::CompletionError,
    },
    #[snafu(display("scripted session has no turn left for {exchange:?}"))]
    ScriptExhausted {
        stage: &'static str,
        exchange: ExchangeId,
    },
}

impl ProviderError {
    /// Returns true for errors that come from credentials or client setup rather than
    /// from a turn in flight.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingApiKey { .. } | Self::HttpClient { .. })
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::MissingApiKey { stage }
            | Self::HttpClient { stage, .. }
            | Self::EmptyPrompt { stage, .. }
            | Self::CompletionsFailed { stage, .. }
            | Self::ScriptExhausted { stage, .. } => stage,
        }
    }
}

pub struct ProviderEventStream {
    exchange: ExchangeId,
    events: mpsc::UnboundedReceiver<StreamEvent>,
    stop_tx: Option<oneshot::Sender<()>>,
}

pub struct ProviderStreamHandle {
    pub stream: ProviderEventStream,
    pub worker: ProviderWorker,
}

impl ProviderEventStream {
    pub(crate) fn new(
        exchange: ExchangeId,
        events: mpsc::UnboundedReceiver<StreamEvent>,
        stop_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            exchange,
            events,
            stop_tx: Some(stop_tx),
        }
    }

    pub fn exchange(&self) -> ExchangeId {
        self.exchange
    }

    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StreamEvent> {
        self.events.try_recv().ok()
    }
}

impl Drop for ProviderEventStream {
    fn drop(&mut self) {
        // Tells the worker nobody is listening anymore so provider IO stops.
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}

/// An open conversation with a remote model.
///
/// The session owns the conversational context. Callers must not have two `send`
/// streams in flight at once.
pub trait ChatSession: Send + Sync {
    fn model_id(&self) -> &str;
    fn send(&self, exchange: ExchangeId, text: String) -> ProviderResult<ProviderStreamHandle>;
}

pub(crate) fn make_event_stream(
    exchange: ExchangeId,
) -> (
    mpsc::UnboundedSender<StreamEvent>,
    ProviderEventStream,
    oneshot::Receiver<()>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = oneshot::channel();
    (
        event_tx,
        ProviderEventStream::new(exchange, event_rx, stop_tx),
        stop_rx,
    )
}
