//! Just enough server topology awareness to drive capability negotiation: the server types and
//! limits a connection reports via its `hello` handshake (spec §6's `Server Description`).
//!
//! A full driver's SDAM (Server Discovery and Monitoring) keeps a continuously-updated topology
//! of every server in a deployment; that monitoring loop is out of scope here. This module only
//! keeps the shape of a single server's description as a binding needs it.

use std::fmt;

/// The address of a single `mongod`/`mongos` process.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    /// The hostname or IP address.
    pub host: String,

    /// The TCP port, defaulting to the standard MongoDB port.
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::new("localhost", 27017)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}:{}", self.host, self.port)
    }
}

/// The role a server plays within its deployment, as reported by `hello`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ServerType {
    Standalone,
    ReplicaSetMember,
    ShardRouter,
}

/// The capability/limits snapshot for a single server, the input to [`crate::cmap::StreamDescription`]
/// and to the legacy/modern command-shape decisions an operation makes.
#[derive(Clone, Debug)]
pub(crate) struct ServerDescription {
    pub(crate) address: ServerAddress,
    pub(crate) server_type: ServerType,

    /// `(major, minor, patch)`, if known.
    pub(crate) version: Option<(u32, u32, u32)>,

    pub(crate) logical_session_timeout_minutes: Option<i64>,
    pub(crate) max_wire_version: Option<i32>,
    pub(crate) max_message_size_bytes: i32,
    pub(crate) max_bson_object_size_bytes: i32,
    pub(crate) max_write_batch_size: i32,
}

/// The lowest wire version at which the server accepts the modern `find`/`getMore` command
/// family instead of the legacy `OP_QUERY`/`OP_GET_MORE` opcodes.
const FIND_COMMAND_MIN_WIRE_VERSION: i32 = 4;

/// The lowest wire version at which `createIndexes` accepts the `commitQuorum` option, which in
/// turn is the version this crate treats as the floor for "modern" index-management commands.
const MODERN_CREATE_INDEXES_MIN_WIRE_VERSION: i32 = 9;

/// The lowest wire version at which retryable writes are supported at all.
const RETRYABLE_WRITES_MIN_WIRE_VERSION: i32 = 6;

/// The lowest wire version at which change streams are supported.
const CHANGE_STREAMS_MIN_WIRE_VERSION: i32 = 4;

impl ServerDescription {
    pub(crate) fn new(address: ServerAddress, server_type: ServerType, max_wire_version: i32) -> Self {
        Self {
            address,
            server_type,
            version: None,
            logical_session_timeout_minutes: None,
            max_wire_version: Some(max_wire_version),
            max_message_size_bytes: 48 * 1024 * 1024,
            max_bson_object_size_bytes: 16 * 1024 * 1024,
            max_write_batch_size: 100_000,
        }
    }

    /// The capability profile this crate's operations consult to decide between legacy and
    /// modern wire-command shapes (`SPEC_FULL.md` §9 Design Notes).
    pub(crate) fn capabilities(&self) -> CapabilityProfile {
        let wire_version = self.max_wire_version.unwrap_or(0);
        CapabilityProfile {
            supports_find_command: wire_version >= FIND_COMMAND_MIN_WIRE_VERSION,
            supports_write_commands: wire_version >= FIND_COMMAND_MIN_WIRE_VERSION,
            supports_modern_create_indexes: wire_version >= MODERN_CREATE_INDEXES_MIN_WIRE_VERSION,
            supports_retryable_writes: wire_version >= RETRYABLE_WRITES_MIN_WIRE_VERSION
                && self.server_type != ServerType::Standalone,
            supports_change_streams: wire_version >= CHANGE_STREAMS_MIN_WIRE_VERSION
                && self.server_type != ServerType::Standalone,
        }
    }
}

/// Which command shapes a server understands, derived once per server from its wire version
/// (spec §9 Design Notes: "capability profile" pattern).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct CapabilityProfile {
    pub(crate) supports_find_command: bool,
    pub(crate) supports_write_commands: bool,
    pub(crate) supports_modern_create_indexes: bool,
    pub(crate) supports_retryable_writes: bool,
    pub(crate) supports_change_streams: bool,
}

#[cfg(test)]
mod test {
    use super::{ServerAddress, ServerDescription, ServerType};

    #[test]
    fn modern_server_supports_find_command() {
        let sd = ServerDescription::new(ServerAddress::default(), ServerType::ReplicaSetMember, 8);
        let caps = sd.capabilities();
        assert!(caps.supports_find_command);
        assert!(caps.supports_retryable_writes);
        assert!(!caps.supports_modern_create_indexes);
    }

    #[test]
    fn legacy_server_has_no_modern_capabilities() {
        let sd = ServerDescription::new(ServerAddress::default(), ServerType::Standalone, 2);
        let caps = sd.capabilities();
        assert!(!caps.supports_find_command);
        assert!(!caps.supports_retryable_writes);
    }

    #[test]
    fn standalone_never_supports_retryable_writes() {
        let sd = ServerDescription::new(ServerAddress::default(), ServerType::Standalone, 20);
        assert!(!sd.capabilities().supports_retryable_writes);
    }
}
