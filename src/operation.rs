//! The `Operation` trait and the C7 operation catalog: one type per server command, each knowing
//! how to build its command document and interpret the server's reply (spec §4.7).

pub(crate) mod aggregate;
pub(crate) mod count;
pub(crate) mod count_documents;
pub(crate) mod create_indexes;
pub(crate) mod delete;
pub(crate) mod distinct;
pub(crate) mod find;
pub(crate) mod find_and_modify;
pub(crate) mod insert;
pub(crate) mod list_collections;
pub(crate) mod list_databases;
pub(crate) mod list_indexes;
pub(crate) mod run_command;
pub(crate) mod update;
pub(crate) mod watch;

use std::{collections::VecDeque, ops::Deref};

use bson::{RawBsonRef, RawDocument, RawDocumentBuf, Timestamp};
use serde::{Deserialize, Serialize};

use crate::{
    bson_util::extend_raw_document_buf,
    cmap::{Command, RawCommandResponse, StreamDescription},
    error::{
        BulkWriteError,
        BulkWriteFailure,
        Error,
        ErrorKind,
        Result,
        WriteConcernError,
        WriteFailure,
    },
    options::WriteConcern,
    selection_criteria::SelectionCriteria,
    Namespace,
};

pub(crate) use aggregate::Aggregate;
pub(crate) use count::Count;
pub(crate) use count_documents::CountDocuments;
pub(crate) use create_indexes::CreateIndexes;
pub(crate) use delete::Delete;
pub(crate) use distinct::Distinct;
pub(crate) use find::Find;
pub(crate) use find_and_modify::FindAndModify;
pub(crate) use insert::Insert;
pub(crate) use list_collections::ListCollections;
pub(crate) use list_databases::ListDatabases;
pub(crate) use list_indexes::ListIndexes;
pub(crate) use run_command::RunCommand;
pub(crate) use update::{Update, UpdateOrReplace};
pub(crate) use watch::Watch;

/// The server's minimum wire version for the modern `createIndexes` command shape (spec §9's
/// server capability profile).
pub(crate) const SERVER_4_2_0_WIRE_VERSION: i32 = 8;
pub(crate) const SERVER_4_4_0_WIRE_VERSION: i32 = 9;

/// The amount of overhead bytes to account for when building a document sequence, so a batch of
/// document-sequence payloads never pushes the message past the server's maximum size.
pub(crate) const COMMAND_OVERHEAD_SIZE: u64 = 16_000;

/// A single server-side command: how to build it, how to interpret its reply, and what retry
/// policy governs it (spec §4.2/§4.7). Every entry in the operation catalog implements this once;
/// the dispatcher (`client::Client::execute_operation`) is generic over it.
pub(crate) trait Operation {
    /// The output type this operation produces once a response has been interpreted.
    type O;

    /// The name of the server-side command this operation issues.
    const NAME: &'static str;

    /// Builds the command to send to the server, given the capabilities of the connection it will
    /// be sent over. May record state (e.g. generated `_id`s) needed later in `handle_response`.
    fn build(&mut self, description: &StreamDescription) -> Result<Command>;

    /// Interprets a server response into this operation's output type.
    fn handle_response(
        &self,
        response: RawCommandResponse,
        description: &StreamDescription,
    ) -> Result<Self::O>;

    /// Interprets an error encountered while sending the built command, potentially recovering
    /// (e.g. "ns not found" on a drop is treated as success, per spec §8).
    fn handle_error(&self, error: Error) -> Result<Self::O> {
        Err(error)
    }

    /// Criteria used to select the server this operation runs against, if any.
    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        None
    }

    /// Whether this operation's write concern requests acknowledgment from the server.
    fn is_acknowledged(&self) -> bool {
        self.write_concern()
            .map(WriteConcern::is_acknowledged)
            .unwrap_or(true)
    }

    /// The write concern to use for this operation, if any.
    fn write_concern(&self) -> Option<&WriteConcern> {
        None
    }

    /// Whether this command accepts a `readConcern` field on the given server.
    fn supports_read_concern(&self, _description: &StreamDescription) -> bool {
        false
    }

    /// The level of retryability the dispatcher's single-retry policy should apply (spec §4.2).
    fn retryability(&self) -> Retryability {
        Retryability::None
    }

    /// Updates this operation as needed before a retry attempt (e.g. clearing state built by a
    /// partially-applied first attempt).
    fn update_for_retry(&mut self) {}

    fn name(&self) -> &str {
        Self::NAME
    }
}

/// Appends a serializable struct's fields onto a raw command document. The serializable struct
/// MUST serialize to a document; otherwise an error is returned.
pub(crate) fn append_options_to_raw_document<T: Serialize>(
    doc: &mut RawDocumentBuf,
    options: Option<&T>,
) -> Result<()> {
    if let Some(options) = options {
        let options_raw_doc = bson::to_raw_document_buf(options)?;
        extend_raw_document_buf(doc, options_raw_doc)?;
    }
    Ok(())
}

#[derive(Deserialize, Debug)]
pub(crate) struct EmptyBody {}

/// Body of a write response that could possibly have a write concern error but not write errors.
#[derive(Debug, Deserialize, Default, Clone)]
pub(crate) struct WriteConcernOnlyBody {
    #[serde(rename = "writeConcernError")]
    write_concern_error: Option<WriteConcernError>,

    #[serde(rename = "errorLabels")]
    labels: Option<Vec<String>>,
}

impl WriteConcernOnlyBody {
    pub(crate) fn validate(&self) -> Result<()> {
        match self.write_concern_error {
            Some(ref wc_error) => Err(Error::new(
                ErrorKind::Write(WriteFailure::WriteConcernError(wc_error.clone())),
                self.labels.clone().unwrap_or_default(),
            )),
            None => Ok(()),
        }
    }
}

/// Body of a classic `insert`/`update`/`delete` command response: a count plus optional
/// per-document write errors and a write concern error (spec §4.7's single-batch write rows).
#[derive(Deserialize, Debug)]
pub(crate) struct WriteResponseBody<T = EmptyBody> {
    #[serde(flatten)]
    body: T,

    pub(crate) n: u64,

    #[serde(rename = "writeErrors")]
    pub(crate) write_errors: Option<Vec<BulkWriteError>>,

    #[serde(rename = "writeConcernError")]
    pub(crate) write_concern_error: Option<WriteConcernError>,

    #[serde(rename = "errorLabels")]
    pub(crate) labels: Option<Vec<String>>,
}

impl<T> WriteResponseBody<T> {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.write_errors.is_none() && self.write_concern_error.is_none() {
            return Ok(());
        };

        let failure = BulkWriteFailure {
            write_errors: self.write_errors.clone(),
            write_concern_error: self.write_concern_error.clone(),
            inserted_ids: Default::default(),
        };

        Err(Error::new(
            ErrorKind::BulkWrite(failure),
            self.labels.clone().unwrap_or_default(),
        ))
    }
}

impl<T> Deref for WriteResponseBody<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.body
    }
}

/// Body of a command whose reply carries a cursor's first batch (spec §4.5).
#[derive(Debug, Deserialize)]
pub(crate) struct CursorBody {
    pub(crate) cursor: CursorInfo,
}

impl CursorBody {
    pub(crate) fn extract_at_cluster_time(response: &RawDocument) -> Result<Option<Timestamp>> {
        Ok(response
            .get("cursor")?
            .and_then(RawBsonRef::as_document)
            .map(|d| d.get("atClusterTime"))
            .transpose()?
            .flatten()
            .and_then(RawBsonRef::as_timestamp))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CursorInfo {
    pub(crate) id: i64,

    pub(crate) ns: Namespace,

    pub(crate) first_batch: VecDeque<RawDocumentBuf>,

    pub(crate) post_batch_resume_token: Option<RawDocumentBuf>,
}

/// Deserializes just the first result from a cursor reply, if any (used by operations that only
/// ever expect a single document back, e.g. `findAndModify`).
#[derive(Debug, Clone)]
pub(crate) struct SingleCursorResult<T>(pub(crate) Option<T>);

impl<'de, T> Deserialize<'de> for SingleCursorResult<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct FullCursorBody<T> {
            cursor: InteriorBody<T>,
        }

        #[derive(Deserialize)]
        struct InteriorBody<T> {
            #[serde(rename = "firstBatch")]
            first_batch: Vec<T>,
        }

        let mut full_body = FullCursorBody::deserialize(deserializer)?;
        Ok(SingleCursorResult(full_body.cursor.first_batch.pop()))
    }
}

/// The level of retryability the dispatcher's single-retry policy (spec §4.2) applies to an
/// operation.
#[derive(Debug, PartialEq, Clone, Copy)]
pub(crate) enum Retryability {
    Write,
    Read,
    None,
}

macro_rules! remove_empty_write_concern {
    ($opts:expr) => {
        if let Some(ref mut options) = $opts {
            if let Some(ref write_concern) = options.write_concern {
                if write_concern.is_empty() {
                    options.write_concern = None;
                }
            }
        }
    };
}

pub(crate) use remove_empty_write_concern;
