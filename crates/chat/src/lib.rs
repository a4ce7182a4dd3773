#![deny(unsafe_code)]

/// Symptom-checker chat core: transcript, exchange lifecycle and controller.
pub mod chat;
/// Layered application settings.
pub mod settings;
pub mod terminal;
