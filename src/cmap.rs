//! The wire-level contract the operation layer drives: commands, raw replies, and the
//! capability/limits snapshot a connection carries (spec §6's `Connection`/`StreamDescription`).
//!
//! This module is an external-interface stand-in: it owns the envelope types and the trait a
//! real connection must implement, not socket or TLS handling, which belongs to the layer below
//! the operation core.

use bson::RawDocumentBuf;
use serde::Serialize;

use crate::{
    concern::WriteConcern,
    error::Result,
    sdam::{ServerAddress, ServerDescription},
};

/// A command ready to be sent over the wire: a target database and a BSON document body.
///
/// Mirrors the teacher's `cmap::conn::Command` envelope, narrowed to what an `Operation` needs to
/// hand a connection — no compression or exhaust-cursor flags, which belong to transport
/// concerns out of scope here.
#[derive(Debug, Clone)]
pub struct Command {
    /// The database the command targets.
    pub target_db: String,

    /// The command body, including the leading `{ <commandName>: ... }` element.
    pub body: RawDocumentBuf,
}

impl Command {
    pub fn new(target_db: impl Into<String>, body: RawDocumentBuf) -> Self {
        Self {
            target_db: target_db.into(),
            body,
        }
    }

    pub(crate) fn new_from_serializable<T: Serialize>(
        target_db: impl Into<String>,
        body: &T,
    ) -> Result<Self> {
        let body = bson::to_raw_document_buf(body)?;
        Ok(Self::new(target_db, body))
    }
}

/// A reply to a [`Command`] exactly as the server sent it, not yet deserialized into a typed
/// response body. Operations deserialize the fields they need via [`RawCommandResponse::body`].
#[derive(Debug, Clone)]
pub struct RawCommandResponse {
    raw: RawDocumentBuf,
}

impl RawCommandResponse {
    pub fn new(raw: RawDocumentBuf) -> Self {
        Self { raw }
    }

    pub(crate) fn raw_document(&self) -> &RawDocumentBuf {
        &self.raw
    }

    pub(crate) fn body<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(bson::from_slice(self.raw.as_bytes())?)
    }
}

/// The capability and limits snapshot attached to a connection, derived from the last `hello`
/// handshake against the server it is connected to (spec §6: `ServerDescription` projected onto
/// a single connection).
#[derive(Debug, Clone)]
pub struct StreamDescription {
    /// The highest wire protocol version this server supports.
    pub max_wire_version: Option<i32>,

    /// The number of minutes a server-side logical session may go unused before expiring.
    pub logical_session_timeout: Option<i64>,

    /// The largest single message this server will accept, in bytes.
    pub max_message_size_bytes: i32,

    /// The largest single document this server will accept, in bytes.
    pub max_bson_object_size_bytes: i32,

    /// The largest number of write operations this server will accept in one batch.
    pub max_write_batch_size: i32,
}

impl StreamDescription {
    pub(crate) fn from_server_description(description: &ServerDescription) -> Self {
        Self {
            max_wire_version: description.max_wire_version,
            logical_session_timeout: description.logical_session_timeout_minutes,
            max_message_size_bytes: description.max_message_size_bytes,
            max_bson_object_size_bytes: description.max_bson_object_size_bytes,
            max_write_batch_size: description.max_write_batch_size,
        }
    }

    /// Whether this server supports commands introduced at or before the given wire version.
    pub(crate) fn supports_wire_version(&self, min: i32) -> bool {
        self.max_wire_version.map(|v| v >= min).unwrap_or(false)
    }

    /// A conservative description for a connection that has not yet completed its handshake.
    pub fn initial() -> Self {
        Self {
            max_wire_version: None,
            logical_session_timeout: None,
            max_message_size_bytes: 48 * 1024 * 1024,
            max_bson_object_size_bytes: 16 * 1024 * 1024,
            max_write_batch_size: 100_000,
        }
    }
}

/// A single acquired connection to a server, the minimal surface an
/// [`crate::operation::Operation`] drives (spec §6). Implemented by the transport layer this
/// crate is handed at construction time; dialing, TLS, and authentication are out of scope here.
pub trait Connection: Send + Sync {
    /// The description of the server this connection is attached to.
    fn stream_description(&self) -> &StreamDescription;

    /// The address of the server this connection is attached to.
    fn address(&self) -> &ServerAddress;

    /// Send a command and read back its raw reply.
    fn command(&mut self, command: Command) -> Result<RawCommandResponse>;

    /// Issue a classic `getMore`, returning the raw batch reply.
    fn get_more(&mut self, command: Command) -> Result<RawCommandResponse> {
        self.command(command)
    }

    /// Issue a classic `killCursors`.
    fn kill_cursors(&mut self, command: Command) -> Result<RawCommandResponse> {
        self.command(command)
    }

    /// Issue a classic write command (`insert`/`update`/`delete`) against `namespace`.
    fn write(
        &mut self,
        namespace: &crate::Namespace,
        ordered: bool,
        write_concern: Option<&WriteConcern>,
        command: Command,
    ) -> Result<RawCommandResponse> {
        let _ = (namespace, ordered, write_concern);
        self.command(command)
    }

    /// Release this connection back to its pool. Connections are also released on drop; this
    /// exists so callers can release eagerly without waiting for the end of scope.
    fn release(self: Box<Self>) {}
}

#[cfg(test)]
mod test {
    use super::StreamDescription;

    #[test]
    fn initial_stream_description_has_conservative_limits() {
        let sd = StreamDescription::initial();
        assert_eq!(sd.max_wire_version, None);
        assert!(sd.max_bson_object_size_bytes > 0);
    }

    #[test]
    fn supports_wire_version_is_false_before_handshake() {
        let sd = StreamDescription::initial();
        assert!(!sd.supports_wire_version(6));
    }
}
