//! # Server Event Writer
//!
//! Serializes `{id, event type, payload}` triples onto a persistent text
//! stream:
//!
//! ```text
//! id:<id>
//! event:<TYPE>
//! data: <json line>
//! data: <json line>
//!
//! ```
//!
//! The very first chunk written to a stream is preceded by a comment line of
//! 2048 spaces (`:` + padding + `\n`); some clients buffer the first 2 KB of
//! a response before dispatching anything. Each event is handed to the sink
//! as one chunk, so the peer always receives whole events.

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::PushError;
use crate::push::event_types::ServerEventType;

/// Spaces in the initial padding comment.
pub const PADDING_LEN: usize = 2048;

/// # Event Sink
///
/// Where finished events go. Each call carries exactly one event (the first
/// one also carries the padding) and must be delivered without further
/// buffering.
pub trait EventSink {
    /// Writes and flushes one chunk.
    fn write_chunk(&mut self, chunk: Bytes) -> Result<(), PushError>;
}

impl EventSink for mpsc::UnboundedSender<Bytes> {
    fn write_chunk(&mut self, chunk: Bytes) -> Result<(), PushError> {
        self.send(chunk).map_err(|_| PushError::Closed)
    }
}

impl EventSink for Vec<u8> {
    fn write_chunk(&mut self, chunk: Bytes) -> Result<(), PushError> {
        self.extend_from_slice(&chunk);
        Ok(())
    }
}

/// # Server Event
///
/// Stateful writer bound to one subscriber's stream.
pub struct ServerEvent<S: EventSink> {
    sink: S,
    buffer: BytesMut,
    padded: bool,
}

impl<S: EventSink> ServerEvent<S> {
    /// Wraps a sink. Nothing is written until the first [`emit`](Self::emit).
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            buffer: BytesMut::new(),
            padded: false,
        }
    }

    /// Starts an event with `id:<id>`.
    pub fn set_id(&mut self, id: u64) -> &mut Self {
        self.buffer.extend_from_slice(format!("id:{id}\n").as_bytes());
        self
    }

    /// Adds the `event:<type>` line.
    pub fn set_type(&mut self, event_type: ServerEventType) -> &mut Self {
        self.buffer
            .extend_from_slice(format!("event:{}\n", event_type.as_str()).as_bytes());
        self
    }

    /// JSON-encodes `data` and adds one `data: ` line per line of output.
    pub fn add_data<T: Serialize + ?Sized>(&mut self, data: &T) -> Result<&mut Self, PushError> {
        let json = serde_json::to_string(data)?;
        for line in json.split('\n') {
            self.buffer.extend_from_slice(b"data: ");
            self.buffer.extend_from_slice(line.as_bytes());
            self.buffer.extend_from_slice(b"\n");
        }
        Ok(self)
    }

    /// Terminates the pending event with a blank line and writes it out.
    pub fn emit(&mut self) -> Result<(), PushError> {
        let mut chunk = if self.padded {
            BytesMut::with_capacity(self.buffer.len() + 1)
        } else {
            let mut padded = BytesMut::with_capacity(PADDING_LEN + 2 + self.buffer.len() + 1);
            padded.extend_from_slice(b":");
            padded.extend_from_slice(&[b' '; PADDING_LEN]);
            padded.extend_from_slice(b"\n");
            padded
        };
        chunk.extend_from_slice(&self.buffer);
        chunk.extend_from_slice(b"\n");
        self.buffer.clear();

        self.sink.write_chunk(chunk.freeze())?;
        self.padded = true;
        Ok(())
    }

    /// `set_id`, `set_type`, `add_data` and `emit` in one call.
    pub fn send<T: Serialize + ?Sized>(&mut self, id: u64, event_type: ServerEventType, data: &T) -> Result<(), PushError> {
        self.set_id(id).set_type(event_type);
        if let Err(error) = self.add_data(data) {
            self.buffer.clear();
            return Err(error);
        }
        self.emit()
    }

    /// The sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Unwraps the sink.
    pub fn into_inner(self) -> S {
        self.sink
    }
}
