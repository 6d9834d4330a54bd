//! The `Error` and `Result` types this crate uses, and the classifier that maps server replies
//! and transport failures onto them.

use std::{any::Any, collections::HashMap, fmt, sync::Arc};

use bson::Bson;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bson::Document;

const RECOVERING_CODES: [i32; 5] = [11600, 11602, 13436, 189, 91];
const NOTWRITABLEPRIMARY_CODES: [i32; 3] = [10107, 13435, 10058];
const RETRYABLE_READ_CODES: [i32; 13] = [
    11600, 11602, 10107, 13435, 13436, 189, 91, 7, 6, 89, 9001, 134, 262,
];
const RETRYABLE_WRITE_CODES: [i32; 12] = [
    11600, 11602, 10107, 13435, 13436, 189, 91, 7, 6, 89, 9001, 262,
];
/// Change-stream error codes that must never be treated as resumable, per the change streams
/// resume algorithm.
const UNRETRYABLE_CHANGE_STREAM_CODES: [i32; 4] = [136, 237, 280, 11601];
const DUPLICATE_KEY_CODE: i32 = 11000;
const NAMESPACE_NOT_FOUND_CODE: i32 = 26;
const CURSOR_NOT_FOUND_CODE: i32 = 43;
const MAX_TIME_MS_EXPIRED_CODE: i32 = 50;

/// Label added to an error for which a retryable write should be attempted a second time.
pub const RETRYABLE_WRITE_ERROR: &str = "RetryableWriteError";

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error produced by the operation layer. Cheaply [`Clone`]able so it can be handed to
/// multiple awaiting contexts (a shared cursor buffer, retry bookkeeping) without re-running the
/// classification that produced it.
#[derive(Clone, Debug, Error)]
#[error("{kind}")]
#[non_exhaustive]
pub struct Error {
    /// The classified kind of failure.
    pub kind: Arc<ErrorKind>,
    labels: Vec<String>,
    pub(crate) wire_version: Option<i32>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, labels: impl IntoIterator<Item = String>) -> Self {
        Self {
            kind: Arc::new(kind),
            labels: labels.into_iter().collect(),
            wire_version: None,
        }
    }

    /// Create a new error carrying a custom payload. Useful for surfacing application errors
    /// through call sites that only know how to propagate this crate's `Error` type.
    pub fn custom(e: impl Any + Send + Sync) -> Self {
        Self::new(ErrorKind::Custom(Arc::new(e)), None)
    }

    /// Retrieve a reference to a value provided to [`Error::custom`]. Returns `None` if this is
    /// not a custom error or if the payload types mismatch.
    pub fn get_custom<E: Any>(&self) -> Option<&E> {
        match self.kind.as_ref() {
            ErrorKind::Custom(c) => c.downcast_ref(),
            _ => None,
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Error {
        ErrorKind::InvalidArgument {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn internal(message: impl Into<String>) -> Error {
        ErrorKind::Internal {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn network_timeout() -> Error {
        ErrorKind::Io(Arc::new(std::io::ErrorKind::TimedOut.into())).into()
    }

    /// The labels attached to this error. Retryable-write orchestration attaches
    /// [`RETRYABLE_WRITE_ERROR`] here rather than inventing a new error kind, matching how the
    /// server itself labels replies.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn contains_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub(crate) fn add_label(&mut self, label: impl Into<String>) {
        let label = label.into();
        if !self.contains_label(&label) {
            self.labels.push(label);
        }
    }

    /// The server-reported numeric code for this error, if any.
    pub fn code(&self) -> Option<i32> {
        match self.kind.as_ref() {
            ErrorKind::Command(e) => Some(e.code),
            ErrorKind::Write(WriteFailure::WriteConcernError(e)) => Some(e.code),
            ErrorKind::Write(WriteFailure::WriteError(e)) => Some(e.code),
            ErrorKind::BulkWrite(b) => b.write_concern_error.as_ref().map(|e| e.code),
            _ => None,
        }
    }

    /// Whether this is a transport-level failure (socket closed, timed out, or otherwise did not
    /// produce a server reply at all).
    pub fn is_network_error(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::Io(_))
    }

    pub(crate) fn is_command_error(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::Command(_))
    }

    /// Whether this error reports "ns not found", the sentinel the server uses for
    /// `listCollections`/`listIndexes`/`dropCollection` on a namespace that does not exist.
    pub fn is_ns_not_found(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::Command(e) if e.code == NAMESPACE_NOT_FOUND_CODE)
            || matches!(self.kind.as_ref(), ErrorKind::Command(e) if e.message.contains("ns not found"))
    }

    /// Whether the targeted server reported it is no longer primary.
    pub fn is_not_primary(&self) -> bool {
        self.code()
            .map(|c| NOTWRITABLEPRIMARY_CODES.contains(&c))
            .unwrap_or(false)
    }

    /// Whether the targeted server reported it is currently recovering (stepping down/up).
    pub fn is_recovering(&self) -> bool {
        self.code().map(|c| RECOVERING_CODES.contains(&c)).unwrap_or(false)
    }

    /// Whether the server cursor targeted by a `getMore`/`killCursors` no longer exists.
    pub fn is_cursor_not_found(&self) -> bool {
        self.code() == Some(CURSOR_NOT_FOUND_CODE)
            || matches!(self.kind.as_ref(), ErrorKind::CursorNotFound { .. })
    }

    /// Whether this is a duplicate-key write failure.
    pub fn is_duplicate_key(&self) -> bool {
        self.code() == Some(DUPLICATE_KEY_CODE)
    }

    /// Whether the operation exceeded `maxTimeMS`.
    pub fn is_max_time_ms_expired(&self) -> bool {
        self.code() == Some(MAX_TIME_MS_EXPIRED_CODE) || matches!(self.kind.as_ref(), ErrorKind::Timeout { .. })
    }

    /// `is_retryable_write(e)` from the error classifier: true only for network errors and
    /// not-primary replies, never for an arbitrary `CommandFailure` code.
    pub fn is_retryable_write(&self) -> bool {
        self.is_network_error() || self.is_not_primary() || self.is_recovering()
    }

    /// A read is retryable for network errors and any code in the retryable-read list.
    pub fn is_retryable_read(&self) -> bool {
        if self.is_network_error() {
            return true;
        }
        self.code().map(|c| RETRYABLE_READ_CODES.contains(&c)).unwrap_or(false)
    }

    pub(crate) fn is_write_retryable(&self) -> bool {
        if self.is_network_error() || self.is_not_primary() {
            return true;
        }
        self.code().map(|c| RETRYABLE_WRITE_CODES.contains(&c)).unwrap_or(false)
    }

    /// `is_retryable(e)` from the change-stream resume algorithm (spec §4.6): network errors,
    /// cursor-not-found, not-primary, and any server error whose code is not in the unretryable
    /// list — except a missing resume token, which is always fatal.
    pub fn is_resumable(&self) -> bool {
        if matches!(self.kind.as_ref(), ErrorKind::ChangeStream(ChangeStreamErrorKind::MissingResumeToken)) {
            return false;
        }
        if self.is_network_error() || self.is_cursor_not_found() || self.is_not_primary() {
            return true;
        }
        match self.code() {
            Some(code) => !UNRETRYABLE_CHANGE_STREAM_CODES.contains(&code),
            // a transport-layer error with no server code at all is resumable
            None => !self.is_command_error(),
        }
    }

    /// `rethrowIfNotNamespaceError(e)`: swallow "ns not found" failures, propagate everything
    /// else.
    pub(crate) fn ignore_ns_not_found(self) -> Result<()> {
        if self.is_ns_not_found() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind, None)
    }
}

impl From<bson::ser::Error> for Error {
    fn from(e: bson::ser::Error) -> Self {
        ErrorKind::BsonSerialization(e).into()
    }
}

impl From<bson::de::Error> for Error {
    fn from(e: bson::de::Error) -> Self {
        ErrorKind::BsonDeserialization(e).into()
    }
}

impl From<bson::raw::Error> for Error {
    fn from(e: bson::raw::Error) -> Self {
        ErrorKind::InvalidResponse {
            message: e.to_string(),
        }
        .into()
    }
}

impl Error {
    fn new_opt(kind: ErrorKind, labels: Option<Vec<String>>) -> Self {
        Self::new(kind, labels.unwrap_or_default())
    }
}

impl From<(ErrorKind, Option<Vec<String>>)> for Error {
    fn from((kind, labels): (ErrorKind, Option<Vec<String>>)) -> Self {
        Self::new_opt(kind, labels)
    }
}

/// The distinct categories of failure this crate classifies errors into (spec §4.8). These are
/// categories, not a 1:1 mirror of server error codes: several server codes map onto the same
/// kind (e.g. every "not primary" code maps to a `Command` whose `is_not_primary()` is true).
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An invalid argument was provided by the caller (e.g. an empty bulk write, an empty update
    /// document).
    #[error("an invalid argument was provided: {message}")]
    InvalidArgument { message: String },

    /// Wrapper around [`bson::de::Error`].
    #[error("{0}")]
    BsonDeserialization(bson::de::Error),

    /// Wrapper around [`bson::ser::Error`].
    #[error("{0}")]
    BsonSerialization(bson::ser::Error),

    /// A classic-protocol bulk write encountered one or more per-item or write-concern errors.
    #[error("an error occurred during a bulk write: {0:?}")]
    BulkWrite(BulkWriteFailure),

    /// The server returned a non-zero `code` for a command.
    #[error("command failed: {0}")]
    Command(CommandError),

    /// The server cursor targeted by a follow-up command no longer exists.
    #[error("cursor {id} not found")]
    CursorNotFound { id: i64 },

    /// Unexpected shape of a server reply (missing `cursor` field, empty explain result, etc).
    #[error("internal error: {message}")]
    Internal { message: String },

    /// Wrapper around [`std::io::Error`] — surfaces as a retryable network error.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// The server returned a reply this crate could not make sense of.
    #[error("the server returned an invalid reply: {message}")]
    InvalidResponse { message: String },

    /// An error occurred during a write operation that was not due to an unsatisfied write
    /// concern alone.
    #[error("a write error occurred: {0:?}")]
    Write(WriteFailure),

    /// The operation's `maxTimeMS` (or an equivalent local deadline) was exceeded.
    #[error("operation exceeded its time limit: {message}")]
    Timeout { message: String },

    /// A change-stream specific failure: a missing resume token, or an unretryable
    /// change-stream error code.
    #[error("change stream error: {0}")]
    ChangeStream(ChangeStreamErrorKind),

    /// A custom value produced by caller code (see [`Error::custom`]).
    #[error("custom error")]
    Custom(Arc<dyn Any + Send + Sync>),
}

/// Change-stream specific failure detail.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ChangeStreamErrorKind {
    /// A delivered change event was missing its `_id` resume token; resumption is impossible.
    #[error("cannot provide resume functionality when the resume token is missing")]
    MissingResumeToken,

    /// The server reported a change-stream error code not eligible for resume.
    #[error("unretryable change stream error: {message}")]
    Unretryable { message: String },
}

/// An error reported by the server for a failed command.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub struct CommandError {
    /// The numeric error code.
    pub code: i32,

    /// The name associated with the error code.
    #[serde(rename = "codeName", default)]
    pub code_name: String,

    /// A human-readable description of the error.
    #[serde(rename = "errmsg", default = "String::new")]
    pub message: String,
}

impl fmt::Display for CommandError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "error code {} ({}): {}", self.code, self.code_name, self.message)
    }
}

/// An error reported because a write could not satisfy the requested write concern.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[non_exhaustive]
pub struct WriteConcernError {
    pub code: i32,
    #[serde(rename = "codeName", default)]
    pub code_name: String,
    #[serde(rename = "errmsg", default = "String::new")]
    pub message: String,
    #[serde(rename = "errInfo")]
    pub details: Option<Document>,
}

/// An error that occurred during a single-request write that was not a write-concern failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct WriteError {
    pub code: i32,
    #[serde(rename = "codeName", default)]
    pub code_name: Option<String>,
    #[serde(rename = "errmsg", default = "String::new")]
    pub message: String,
}

/// A single item's error within a classic bulk write reply.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct BulkWriteError {
    /// The batch-local index this error corresponds to (already remapped to the user's original
    /// submitted position by the time it reaches [`BulkWriteFailure`]).
    #[serde(default)]
    pub index: usize,
    pub code: i32,
    #[serde(rename = "codeName", default)]
    pub code_name: Option<String>,
    #[serde(rename = "errmsg", default = "String::new")]
    pub message: String,
}

/// The combined set of errors surfaced at the end of a classic bulk write (spec §4.4/§4.8: bulk
/// writes never throw per-item errors mid-stream).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct BulkWriteFailure {
    pub write_errors: Option<Vec<BulkWriteError>>,
    pub write_concern_error: Option<WriteConcernError>,
    #[serde(skip)]
    pub inserted_ids: HashMap<usize, Bson>,
}

impl BulkWriteFailure {
    pub(crate) fn new() -> Self {
        BulkWriteFailure {
            write_errors: None,
            write_concern_error: None,
            inserted_ids: Default::default(),
        }
    }
}

/// An error from a single (non-bulk) write operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum WriteFailure {
    WriteConcernError(WriteConcernError),
    WriteError(WriteError),
}

impl WriteFailure {
    pub(crate) fn from_bulk_failure(bulk: BulkWriteFailure) -> Result<Self> {
        if let Some(err) = bulk.write_errors.and_then(|es| es.into_iter().next()) {
            Ok(WriteFailure::WriteError(WriteError {
                code: err.code,
                code_name: err.code_name,
                message: err.message,
            }))
        } else if let Some(wc_error) = bulk.write_concern_error {
            Ok(WriteFailure::WriteConcernError(wc_error))
        } else {
            Err(ErrorKind::InvalidResponse {
                message: "error missing write errors and write concern errors".to_string(),
            }
            .into())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn not_primary_codes_are_retryable_writes() {
        let err: Error = ErrorKind::Command(CommandError {
            code: 10107,
            code_name: "NotWritablePrimary".to_string(),
            message: "not master".to_string(),
        })
        .into();
        assert!(err.is_not_primary());
        assert!(err.is_retryable_write());
        assert!(err.is_write_retryable());
    }

    #[test]
    fn arbitrary_command_failure_is_not_a_retryable_write() {
        let err: Error = ErrorKind::Command(CommandError {
            code: 2,
            code_name: "BadValue".to_string(),
            message: "bad value".to_string(),
        })
        .into();
        assert!(!err.is_retryable_write());
    }

    #[test]
    fn missing_resume_token_is_never_resumable() {
        let err: Error = ErrorKind::ChangeStream(ChangeStreamErrorKind::MissingResumeToken).into();
        assert!(!err.is_resumable());
    }

    #[test]
    fn network_error_is_resumable() {
        let err = Error::network_timeout();
        assert!(err.is_resumable());
        assert!(err.is_retryable_read());
    }

    #[test]
    fn unretryable_change_stream_code_is_not_resumable() {
        let err: Error = ErrorKind::Command(CommandError {
            code: 280,
            code_name: "ChangeStreamFatalError".to_string(),
            message: "fatal".to_string(),
        })
        .into();
        assert!(!err.is_resumable());
    }

    #[test]
    fn duplicate_key_code_is_classified() {
        let err: Error = ErrorKind::Command(CommandError {
            code: 11000,
            code_name: "DuplicateKey".to_string(),
            message: "E11000 duplicate key error".to_string(),
        })
        .into();
        assert!(err.is_duplicate_key());
    }

    #[test]
    fn ns_not_found_by_message_is_recognized() {
        let err: Error = ErrorKind::Command(CommandError {
            code: 0,
            code_name: "".to_string(),
            message: "ns not found".to_string(),
        })
        .into();
        assert!(err.is_ns_not_found());
        assert!(err.ignore_ns_not_found().is_ok());
    }
}
