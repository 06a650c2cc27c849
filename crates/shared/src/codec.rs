//! Envelope wrapping and the message codec.
//!
//! Every message crossing the bridge is wrapped as
//! `{"id": ..., "timestamp": <epoch ms>, "command"|"event": {...}}`.
//! The id is for tracing only; the protocol never correlates replies.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::{ClockPort, SystemClock};
use crate::messages::{Command, Event};

/// Maximum number of characters of a rejected payload kept for diagnostics.
pub const PREVIEW_LIMIT: usize = 200;

/// Id + timestamp + one command or event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    /// Capture time in epoch milliseconds
    pub timestamp: i64,
    #[serde(flatten)]
    pub message: Message,
}

/// Body of an envelope; serialized under the `command` or `event` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Message {
    Command(Command),
    Event(Event),
}

impl Envelope {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn into_command(self) -> Option<Command> {
        match self.message {
            Message::Command(command) => Some(command),
            Message::Event(_) => None,
        }
    }

    pub fn into_event(self) -> Option<Event> {
        match self.message {
            Message::Event(event) => Some(event),
            Message::Command(_) => None,
        }
    }
}

/// Raw input that could not be read as an envelope.
///
/// The channel also carries unrelated framework chatter, so callers log this
/// and move on.
#[derive(Debug, thiserror::Error)]
pub enum ParseFailure {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Wraps outgoing messages and reads incoming ones.
#[derive(Clone)]
pub struct Codec {
    clock: Arc<dyn ClockPort>,
}

impl Codec {
    pub fn new(clock: Arc<dyn ClockPort>) -> Self {
        Self { clock }
    }

    /// Codec stamping envelopes with wall-clock time.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock::new()))
    }

    /// Wrap a message with a fresh id and the current timestamp.
    pub fn encode(&self, message: Message) -> Envelope {
        Envelope {
            id: Uuid::now_v7().to_string(),
            timestamp: self.clock.now().timestamp_millis(),
            message,
        }
    }

    pub fn encode_command(&self, command: Command) -> Envelope {
        self.encode(Message::Command(command))
    }

    pub fn encode_event(&self, event: Event) -> Envelope {
        self.encode(Message::Event(event))
    }

    /// Read an envelope. Never panics; anything non-conforming is a
    /// `ParseFailure`. Unknown tags are not failures.
    pub fn decode(raw: &str) -> Result<Envelope, ParseFailure> {
        let envelope = serde_json::from_str::<Envelope>(raw)?;
        tracing::trace!(id = %envelope.id, "Decoded envelope");
        Ok(envelope)
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::system()
    }
}

/// First `PREVIEW_LIMIT` characters of a raw payload, for log lines.
pub fn preview(raw: &str) -> &str {
    match raw.char_indices().nth(PREVIEW_LIMIT) {
        Some((end, _)) => &raw[..end],
        None => raw,
    }
}
