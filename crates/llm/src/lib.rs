use std::sync::Arc;

mod model;
pub mod persona;
mod provider;
mod rig_adapter;
pub mod scripted;

pub use model::{DEFAULT_GEMINI_MODEL, DEFAULT_TEMPERATURE, GenerationSettings};
pub use persona::DOCTOR_PROFILE;
pub use provider::{
    ChatSession, ExchangeId, ProviderConfig, ProviderError, ProviderEventStream, ProviderResult,
    ProviderStreamHandle, ProviderWorker, StreamEvent, StreamEventPayload,
};
pub use rig_adapter::GeminiSession;
pub use scripted::{ScriptedEnding, ScriptedSession, ScriptedTurn};

/// Opens the Gemini chat session used for the lifetime of the application.
pub fn open_session(
    config: ProviderConfig,
    settings: GenerationSettings,
) -> ProviderResult<Arc<dyn ChatSession>> {
    Ok(Arc::new(GeminiSession::open(config, settings)?))
}
