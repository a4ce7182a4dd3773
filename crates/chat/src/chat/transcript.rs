use medchat_llm::ExchangeId;
use snafu::{OptionExt, Snafu, ensure};

use crate::chat::message::{Message, MessageId, MessageStatus, Role};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TranscriptError {
    #[snafu(display("message {id:?} is not in the transcript"))]
    UnknownMessage { stage: &'static str, id: MessageId },
    #[snafu(display("message {id:?} is not streaming and can no longer change"))]
    NotStreaming { stage: &'static str, id: MessageId },
    #[snafu(display("message {open:?} is still streaming"))]
    StreamingAlreadyOpen { stage: &'static str, open: MessageId },
}

pub type TranscriptResult<T> = Result<T, TranscriptError>;

/// Ordered, in-memory list of chat messages.
///
/// At most one message streams at a time and it is always the last one. Messages are
/// never removed.
#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
    next_message_id: u64,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            next_message_id: 1,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Returns the open placeholder, if one is streaming.
    pub fn streaming_message(&self) -> Option<&Message> {
        self.messages.last().filter(|message| message.is_streaming())
    }

    pub fn has_user_messages(&self) -> bool {
        self.messages
            .iter()
            .any(|message| matches!(message.role, Role::User))
    }

    pub fn push_user(&mut self, text: impl Into<String>) -> TranscriptResult<MessageId> {
        self.ensure_no_open_stream("push-user")?;
        let id = self.alloc_message_id();
        self.messages.push(Message::user(id, text));
        Ok(id)
    }

    pub fn push_system(&mut self, text: impl Into<String>) -> TranscriptResult<MessageId> {
        self.ensure_no_open_stream("push-system")?;
        let id = self.alloc_message_id();
        self.messages.push(Message::system(id, text));
        Ok(id)
    }

    pub fn open_placeholder(&mut self, exchange: ExchangeId) -> TranscriptResult<MessageId> {
        self.ensure_no_open_stream("open-placeholder")?;
        let id = self.alloc_message_id();
        self.messages.push(Message::assistant_placeholder(id, exchange));
        Ok(id)
    }

    /// Appends one increment to the streaming placeholder, without separators.
    pub fn append_text(&mut self, id: MessageId, chunk: &str) -> TranscriptResult<()> {
        let message = self.streaming_mut(id, "append-text")?;
        message.text.push_str(chunk);
        Ok(())
    }

    /// Freezes the placeholder text as accumulated so far.
    pub fn finalize(&mut self, id: MessageId) -> TranscriptResult<()> {
        let message = self.streaming_mut(id, "finalize")?;
        message.status = MessageStatus::Done;
        Ok(())
    }

    /// Replaces the placeholder text with `text` and closes it.
    pub fn fail(
        &mut self,
        id: MessageId,
        text: impl Into<String>,
        diagnostic: impl Into<String>,
    ) -> TranscriptResult<()> {
        let message = self.streaming_mut(id, "fail")?;
        message.text = text.into();
        message.status = MessageStatus::Failed(diagnostic.into());
        Ok(())
    }

    fn streaming_mut(&mut self, id: MessageId, stage: &'static str) -> TranscriptResult<&mut Message> {
        let message = self
            .messages
            .iter_mut()
            .find(|message| message.id == id)
            .context(UnknownMessageSnafu { stage, id })?;
        ensure!(message.is_streaming(), NotStreamingSnafu { stage, id });
        Ok(message)
    }

    fn ensure_no_open_stream(&self, stage: &'static str) -> TranscriptResult<()> {
        match self.streaming_message() {
            Some(open) => StreamingAlreadyOpenSnafu {
                stage,
                open: open.id,
            }
            .fail(),
            None => Ok(()),
        }
    }

    fn alloc_message_id(&mut self) -> MessageId {
        let id = MessageId::new(self.next_message_id);
        self.next_message_id = self.next_message_id.saturating_add(1);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXCHANGE: ExchangeId = ExchangeId::new(1);

    #[test]
    fn ids_increase_in_creation_order() {
        let mut transcript = Transcript::new();
        let user = transcript.push_user("hello").unwrap();
        let assistant = transcript.open_placeholder(EXCHANGE).unwrap();

        assert!(user < assistant);
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.messages()[0].role, Role::User);
        assert_eq!(transcript.messages()[1].role, Role::Assistant);
    }

    #[test]
    fn default_transcript_still_allocates_from_one() {
        let mut transcript = Transcript::default();
        assert_eq!(transcript.push_user("hi").unwrap(), MessageId::new(1));
    }

    #[test]
    fn increments_concatenate_without_separators() {
        let mut transcript = Transcript::new();
        transcript.push_user("I have a headache").unwrap();
        let id = transcript.open_placeholder(EXCHANGE).unwrap();

        for chunk in ["Common ", "causes ", "include..."] {
            transcript.append_text(id, chunk).unwrap();
        }
        transcript.finalize(id).unwrap();

        let message = transcript.get(id).unwrap();
        assert_eq!(message.text, "Common causes include...");
        assert!(!message.is_streaming());
    }

    #[test]
    fn finalized_messages_are_frozen() {
        let mut transcript = Transcript::new();
        let id = transcript.open_placeholder(EXCHANGE).unwrap();
        transcript.finalize(id).unwrap();

        assert!(matches!(
            transcript.append_text(id, "late"),
            Err(TranscriptError::NotStreaming { .. })
        ));
        assert_eq!(transcript.get(id).unwrap().text, "");
    }

    #[test]
    fn only_one_placeholder_streams_at_a_time() {
        let mut transcript = Transcript::new();
        let open = transcript.open_placeholder(EXCHANGE).unwrap();

        assert!(matches!(
            transcript.open_placeholder(ExchangeId::new(2)),
            Err(TranscriptError::StreamingAlreadyOpen { open: id, .. }) if id == open
        ));
        assert!(transcript.push_user("again").is_err());
        assert_eq!(transcript.streaming_message().map(|message| message.id), Some(open));
    }

    #[test]
    fn fail_replaces_partial_text() {
        let mut transcript = Transcript::new();
        let id = transcript.open_placeholder(EXCHANGE).unwrap();
        transcript.append_text(id, "partial").unwrap();
        transcript.fail(id, "sorry", "connection reset").unwrap();

        let message = transcript.get(id).unwrap();
        assert_eq!(message.text, "sorry");
        assert_eq!(
            message.status,
            MessageStatus::Failed("connection reset".to_string())
        );
    }

    #[test]
    fn unknown_ids_are_reported() {
        let mut transcript = Transcript::new();
        assert!(matches!(
            transcript.finalize(MessageId::new(99)),
            Err(TranscriptError::UnknownMessage { .. })
        ));
    }
}
