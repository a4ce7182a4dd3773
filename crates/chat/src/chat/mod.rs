pub mod controller;
/// Event contracts between the stream reader and the controller.
pub mod events;
/// Deterministic exchange state boundaries.
pub mod exchange;
/// Domain entities for the transcript.
pub mod message;
pub mod transcript;

pub use controller::{APOLOGY_TEXT, CONFIGURATION_ERROR_TEXT, ExchangeController};
pub use events::{ExchangeEvent, ExchangeEvents, SubmitRejection};
pub use exchange::{
    ExchangeState, ExchangeTransition, ExchangeTransitionRejection, ExchangeTransitionResult,
};
pub use message::{Message, MessageId, MessageStatus, Role};
pub use transcript::{Transcript, TranscriptError, TranscriptResult};
