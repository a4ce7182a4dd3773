use std::collections::VecDeque;
use std::sync::Mutex;

use snafu::OptionExt;

use super::provider::{
    ChatSession, ExchangeId, ProviderResult, ProviderStreamHandle, ProviderWorker,
    ScriptExhaustedSnafu, StreamEvent, StreamEventPayload, make_event_stream,
};

/// How a scripted turn ends after its deltas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedEnding {
    Done,
    Error(String),
    /// Close the stream without a terminal event.
    Hangup,
}

/// One canned reply: deltas in order, then an ending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedTurn {
    pub deltas: Vec<String>,
    pub ending: ScriptedEnding,
}

impl ScriptedTurn {
    pub fn reply<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            deltas: deltas.into_iter().map(Into::into).collect(),
            ending: ScriptedEnding::Done,
        }
    }

    pub fn failing<I, S>(deltas: I, message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            deltas: deltas.into_iter().map(Into::into).collect(),
            ending: ScriptedEnding::Error(message.into()),
        }
    }

    pub fn hangup<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            deltas: deltas.into_iter().map(Into::into).collect(),
            ending: ScriptedEnding::Hangup,
        }
    }
}

/// Deterministic in-memory session that replays scripted turns without network access.
pub struct ScriptedSession {
    model_id: String,
    turns: Mutex<VecDeque<ScriptedTurn>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedSession {
    pub fn new(turns: impl IntoIterator<Item = ScriptedTurn>) -> Self {
        Self {
            model_id: "scripted".to_string(),
            turns: Mutex::new(turns.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far, in send order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }

    pub fn remaining_turns(&self) -> usize {
        self.turns.lock().map(|turns| turns.len()).unwrap_or(0)
    }
}

impl ChatSession for ScriptedSession {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn send(&self, exchange: ExchangeId, text: String) -> ProviderResult<ProviderStreamHandle> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(text);
        }

        let turn = self
            .turns
            .lock()
            .ok()
            .and_then(|mut turns| turns.pop_front())
            .context(ScriptExhaustedSnafu {
                stage: "scripted-send",
                exchange,
            })?;

        let (event_tx, stream, _stop_rx) = make_event_stream(exchange);
        let worker: ProviderWorker = Box::pin(async move {
            for delta in turn.deltas.into_iter().filter(|delta| !delta.is_empty()) {
                if event_tx
                    .send(StreamEvent::new(exchange, StreamEventPayload::Delta(delta)))
                    .is_err()
                {
                    return;
                }
            }

            let payload = match turn.ending {
                ScriptedEnding::Done => StreamEventPayload::Done,
                ScriptedEnding::Error(message) => StreamEventPayload::Error(message),
                ScriptedEnding::Hangup => return,
            };
            let _ = event_tx.send(StreamEvent::new(exchange, payload));
        });

        Ok(ProviderStreamHandle { stream, worker })
    }
}
