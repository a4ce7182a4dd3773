use std::sync::Arc;

use futures::StreamExt;
use rig::completion::{CompletionModel, Message as RigMessage};
use rig::prelude::CompletionClient;
use rig::providers::gemini;
use rig::streaming::{StreamedAssistantContent, StreamingCompletionResponse};
use snafu::{ResultExt, ensure};
use tokio::sync::{Mutex, mpsc, oneshot};

use super::model::GenerationSettings;
use super::provider::{
    ChatSession, CompletionsFailedSnafu, EmptyPromptSnafu, ExchangeId, HttpClientSnafu,
    MissingApiKeySnafu, ProviderConfig, ProviderError, ProviderResult, ProviderStreamHandle,
    ProviderWorker, StreamEvent, StreamEventPayload, make_event_stream,
};

/// Gemini chat session backed by rig.
///
/// Completed turns are appended to `history` so every request carries the whole
/// conversation, the same way a hosted chat object would.
pub struct GeminiSession {
    client: gemini::Client,
    settings: GenerationSettings,
    history: Arc<Mutex<Vec<RigMessage>>>,
}

impl GeminiSession {
    pub fn open(config: ProviderConfig, settings: GenerationSettings) -> ProviderResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "gemini-session-open",
            }
        );

        let client = Self::build_client(&config)?;
        tracing::info!(model_id = %settings.model_id, "opened gemini chat session");

        Ok(Self {
            client,
            settings,
            history: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn build_client(config: &ProviderConfig) -> ProviderResult<gemini::Client> {
        let mut builder = gemini::Client::builder().api_key(config.api_key.as_str());
        if !config.endpoint.is_empty() {
            builder = builder.base_url(config.endpoint.as_str());
        }
        builder.build().context(HttpClientSnafu {
            stage: "build-client",
        })
    }

    async fn open_stream<M>(
        model: &M,
        settings: &GenerationSettings,
        prior_turns: Vec<RigMessage>,
        text: &str,
    ) -> ProviderResult<StreamingCompletionResponse<M::StreamingResponse>>
    where
        M: CompletionModel,
    {
        let mut builder = model
            .completion_request(RigMessage::user(text))
            .messages(prior_turns)
            .preamble(settings.preamble.clone())
            .temperature(settings.temperature);

        if let Some(max_tokens) = settings.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }

        builder.stream().await.context(CompletionsFailedSnafu {
            stage: "open-stream",
        })
    }

    fn emit_error_event(
        event_tx: &mpsc::UnboundedSender<StreamEvent>,
        exchange: ExchangeId,
        error: ProviderError,
    ) {
        let _ = event_tx.send(StreamEvent::new(
            exchange,
            StreamEventPayload::Error(error.to_string()),
        ));
    }

    fn map_stream_item<R>(item: StreamedAssistantContent<R>) -> Option<String>
    where
        R: Clone + Unpin,
    {
        match item {
            StreamedAssistantContent::Text(text) if !text.text.is_empty() => Some(text.text),
            // Reasoning, tool calls, and the usage trailer are not part of the reply text.
            _ => None,
        }
    }

    async fn run_stream_worker<M>(
        model: M,
        settings: GenerationSettings,
        history: Arc<Mutex<Vec<RigMessage>>>,
        exchange: ExchangeId,
        text: String,
        event_tx: mpsc::UnboundedSender<StreamEvent>,
        mut stop_rx: oneshot::Receiver<()>,
    ) where
        M: CompletionModel,
    {
        let prior_turns = history.lock().await.clone();
        let prior_turn_count = prior_turns.len();

        let mut stream = match Self::open_stream(&model, &settings, prior_turns, &text).await {
            Ok(stream) => stream,
            Err(error) => {
                tracing::error!(
                    exchange = ?exchange,
                    model_id = %settings.model_id,
                    prior_turn_count,
                    error = %error,
                    "failed to open gemini stream"
                );
                Self::emit_error_event(&event_tx, exchange, error);
                return;
            }
        };

        let mut reply = String::new();

        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    tracing::debug!(exchange = ?exchange, "event stream dropped; stopping gemini stream");
                    stream.cancel();
                    return;
                }
                next_item = stream.next() => {
                    match next_item {
                        Some(Ok(item)) => {
                            let Some(chunk) = Self::map_stream_item(item) else {
                                continue;
                            };
                            reply.push_str(&chunk);
                            if event_tx
                                .send(StreamEvent::new(exchange, StreamEventPayload::Delta(chunk)))
                                .is_err()
                            {
                                return;
                            }
                        }
                        Some(Err(source)) => {
                            tracing::warn!(
                                exchange = ?exchange,
                                error = %source,
                                "gemini stream emitted an error chunk"
                            );
                            let error = ProviderError::CompletionsFailed {
                                stage: "stream-chunk",
                                source,
                            };
                            Self::emit_error_event(&event_tx, exchange, error);
                            return;
                        }
                        None => break,
                    }
                }
            }
        }

        {
            let mut history = history.lock().await;
            history.push(RigMessage::user(text));
            history.push(RigMessage::assistant(reply));
        }

        let _ = event_tx.send(StreamEvent::new(exchange, StreamEventPayload::Done));
    }
}

impl ChatSession for GeminiSession {
    fn model_id(&self) -> &str {
        &self.settings.model_id
    }

    fn send(&self, exchange: ExchangeId, text: String) -> ProviderResult<ProviderStreamHandle> {
        ensure!(
            !text.trim().is_empty(),
            EmptyPromptSnafu {
                stage: "gemini-send",
                exchange,
            }
        );

        let model = self.client.completion_model(self.settings.model_id.clone());
        let (event_tx, stream, stop_rx) = make_event_stream(exchange);
        let worker: ProviderWorker = Box::pin(Self::run_stream_worker(
            model,
            self.settings.clone(),
            Arc::clone(&self.history),
            exchange,
            text,
            event_tx,
            stop_rx,
        ));

        Ok(ProviderStreamHandle { stream, worker })
    }
}
