//! Line-oriented presentation of the transcript.
//!
//! The view never mutates the transcript. It remembers how much of each message it has
//! already written so streaming replies print as a growing line.

use std::collections::HashMap;
use std::io::{self, Write};

use chrono::Local;
use medchat_llm::DOCTOR_PROFILE;
use medchat_llm::persona::{self, FOOTER_DISCLAIMER, WELCOME_DISCLAIMER, WELCOME_SUGGESTIONS};

use crate::chat::{Message, MessageId, MessageStatus, Role, Transcript};

pub const QUIT_COMMAND: &str = "/quit";
pub const PROMPT: &str = "> ";

/// What one line of user input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    Quit,
    Submit(String),
}

/// Maps a raw input line to a command.
///
/// `#1`..`#4` pick a welcome suggestion while the conversation has not started.
pub fn parse_input(line: &str, conversation_started: bool) -> InputCommand {
    let trimmed = line.trim();
    if trimmed == QUIT_COMMAND {
        return InputCommand::Quit;
    }

    if !conversation_started {
        let picked = trimmed
            .strip_prefix('#')
            .and_then(|index| index.parse::<usize>().ok())
            .and_then(persona::suggestion);
        if let Some(text) = picked {
            return InputCommand::Submit(text.to_string());
        }
    }

    InputCommand::Submit(line.to_string())
}

#[derive(Debug, Clone, Default)]
struct PrintedMessage {
    text: String,
    closed: bool,
}

#[derive(Debug, Default)]
pub struct TerminalView {
    printed: HashMap<MessageId, PrintedMessage>,
}

impl TerminalView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render_header(&self, out: &mut impl Write, model_id: Option<&str>) -> io::Result<()> {
        writeln!(out, "{} | {}", DOCTOR_PROFILE.name, DOCTOR_PROFILE.specialty)?;
        match model_id {
            Some(model_id) => writeln!(out, "model: {model_id}")?,
            None => writeln!(out, "offline")?,
        }
        writeln!(out, "{FOOTER_DISCLAIMER}")?;
        writeln!(out)
    }

    pub fn render_welcome(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "Hello, I'm {}.", DOCTOR_PROFILE.name)?;
        writeln!(
            out,
            "Describe your symptoms, or pick a common concern by typing its number:"
        )?;
        for (index, suggestion) in WELCOME_SUGGESTIONS.iter().enumerate() {
            writeln!(out, "  #{} {suggestion}", index + 1)?;
        }
        writeln!(out)?;
        writeln!(out, "{WELCOME_DISCLAIMER}")?;
        writeln!(out, "Type {QUIT_COMMAND} to exit.")?;
        writeln!(out)
    }

    /// Writes everything in `transcript` that has not been written yet.
    pub fn render(&mut self, transcript: &Transcript, out: &mut impl Write) -> io::Result<()> {
        for message in transcript.messages() {
            self.render_message(message, out)?;
        }
        out.flush()
    }

    fn render_message(&mut self, message: &Message, out: &mut impl Write) -> io::Result<()> {
        if !self.printed.contains_key(&message.id) {
            if message.is_streaming() {
                writeln!(out, "{} is typing...", DOCTOR_PROFILE.name)?;
            }
            write!(out, "{}: ", message_label(message))?;
        }

        let printed = self.printed.entry(message.id).or_default();
        if printed.closed {
            return Ok(());
        }

        if let Some(suffix) = message.text.strip_prefix(printed.text.as_str()) {
            write!(out, "{suffix}")?;
        } else {
            // The failure apology replaces the partial reply.
            writeln!(out)?;
            write!(out, "{}: {}", message_label(message), message.text)?;
        }
        printed.text.clone_from(&message.text);

        match &message.status {
            MessageStatus::Streaming(_) => {}
            MessageStatus::Done => {
                writeln!(out)?;
                printed.closed = true;
            }
            MessageStatus::Failed(diagnostic) => {
                tracing::debug!(message = ?message.id, %diagnostic, "rendered failed reply");
                writeln!(out)?;
                printed.closed = true;
            }
        }

        Ok(())
    }
}

/// Speaker and local send time, e.g. `You (14:02)`.
pub fn message_label(message: &Message) -> String {
    format!(
        "{} ({})",
        role_label(message.role),
        message.created_at.with_timezone(&Local).format("%H:%M")
    )
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "You",
        Role::Assistant => DOCTOR_PROFILE.name,
        Role::System => "System",
    }
}
