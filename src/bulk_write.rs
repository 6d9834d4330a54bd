//! The write request encoder and bulk write batcher (spec §4.3/§4.4): turns a user-ordered
//! sequence of heterogeneous write requests into homogeneous per-namespace batches, and combines
//! their replies into a single result.

use std::collections::HashMap;

use bson::{Bson, RawDocumentBuf};

use crate::{
    bson_util,
    collation::Collation,
    concern::WriteConcern,
    error::{BulkWriteError, BulkWriteFailure, Error, ErrorKind, Result},
    namespace::Namespace,
    results::{DeleteResult, InsertManyResult, UpdateResult},
};

/// One write, tagged by kind, carrying the user's original submitted position (spec §3 "Write
/// Request").
#[derive(Debug, Clone)]
pub(crate) struct WriteRequest {
    pub(crate) original_index: usize,
    pub(crate) kind: WriteRequestKind,
}

#[derive(Debug, Clone)]
pub(crate) enum WriteRequestKind {
    Insert {
        document: RawDocumentBuf,
    },
    Update {
        filter: RawDocumentBuf,
        update: RawDocumentBuf,
        multi: bool,
        upsert: Option<bool>,
        collation: Option<Collation>,
    },
    Replace {
        filter: RawDocumentBuf,
        replacement: RawDocumentBuf,
        upsert: Option<bool>,
        collation: Option<Collation>,
    },
    Delete {
        filter: RawDocumentBuf,
        multi: bool,
        collation: Option<Collation>,
    },
}

/// The server command name a given request kind maps to. Update and Replace both map to
/// `"update"`, just validated differently (spec §4.3/§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum BatchType {
    Insert,
    Update,
    Delete,
}

impl WriteRequestKind {
    fn batch_type(&self) -> BatchType {
        match self {
            WriteRequestKind::Insert { .. } => BatchType::Insert,
            WriteRequestKind::Update { .. } | WriteRequestKind::Replace { .. } => BatchType::Update,
            WriteRequestKind::Delete { .. } => BatchType::Delete,
        }
    }

    fn command_name(&self) -> &'static str {
        match self.batch_type() {
            BatchType::Insert => "insert",
            BatchType::Update => "update",
            BatchType::Delete => "delete",
        }
    }

    /// Encode this request into the document the server expects within the batch's payload
    /// sequence (spec §4.3's per-kind encoding rules).
    fn encode(&self) -> Result<RawDocumentBuf> {
        match self {
            WriteRequestKind::Insert { document } => {
                bson_util::first_key(document)?;
                Ok(document.clone())
            }
            WriteRequestKind::Update {
                filter,
                update,
                multi,
                upsert,
                collation,
            } => {
                bson_util::update_document_check(update)?;
                let mut doc = bson::rawdoc! { "q": filter.clone(), "u": update.clone() };
                if *multi {
                    doc.append("multi", true);
                }
                if let Some(upsert) = upsert {
                    doc.append("upsert", *upsert);
                }
                append_collation(&mut doc, collation)?;
                Ok(doc)
            }
            WriteRequestKind::Replace {
                filter,
                replacement,
                upsert,
                collation,
            } => {
                bson_util::replacement_document_check(replacement)?;
                let mut doc = bson::rawdoc! { "q": filter.clone(), "u": replacement.clone() };
                if let Some(upsert) = upsert {
                    doc.append("upsert", *upsert);
                }
                append_collation(&mut doc, collation)?;
                Ok(doc)
            }
            WriteRequestKind::Delete {
                filter,
                multi,
                collation,
            } => {
                let mut doc = bson::rawdoc! {
                    "q": filter.clone(),
                    "limit": if *multi { 0 } else { 1 },
                };
                append_collation(&mut doc, collation)?;
                Ok(doc)
            }
        }
    }
}

fn append_collation(doc: &mut RawDocumentBuf, collation: &Option<Collation>) -> Result<()> {
    if let Some(collation) = collation {
        let raw = bson::to_raw_document_buf(collation)?;
        doc.append("collation", raw);
    }
    Ok(())
}

/// A single homogeneous server command built from a run of same-kind requests (spec §3 "Bulk
/// Write Batch").
pub(crate) struct Batch {
    pub(crate) namespace: Namespace,
    pub(crate) ordered: bool,
    pub(crate) write_concern: Option<WriteConcern>,
    pub(crate) batch_type: BatchType,
    pub(crate) payload: Vec<RawDocumentBuf>,
    /// payload position -> original user-submitted position. Strictly increasing.
    pub(crate) index_map: Vec<usize>,
    pub(crate) unprocessed: Vec<WriteRequest>,
    /// `_id` of each inserted document, keyed by original user-submitted position. Empty for
    /// update/delete batches.
    pub(crate) inserted_ids: HashMap<usize, Bson>,
}

impl Batch {
    pub(crate) fn command_name(&self) -> &'static str {
        match self.batch_type {
            BatchType::Insert => "insert",
            BatchType::Update => "update",
            BatchType::Delete => "delete",
        }
    }

    pub(crate) fn command_document(&self) -> Result<RawDocumentBuf> {
        let payload_key = match self.batch_type {
            BatchType::Insert => "documents",
            BatchType::Update => "updates",
            BatchType::Delete => "deletes",
        };
        let mut doc = bson::rawdoc! {
            self.command_name(): self.namespace.coll.clone(),
            "ordered": self.ordered,
        };
        let mut documents = bson::raw::RawArrayBuf::new();
        for d in &self.payload {
            documents.push(d.clone());
        }
        doc.append(payload_key, documents);
        if let Some(wc) = &self.write_concern {
            if !wc.is_empty() {
                doc.append("writeConcern", bson::to_raw_document_buf(wc)?);
            }
        }
        Ok(doc)
    }
}

/// Splits an ordered sequence of heterogeneous requests into one or more homogeneous [`Batch`]es,
/// honoring the server's max batch document count and the byte-size limits carried by a
/// connection's `StreamDescription` (spec §4.4 "Batch formation").
pub(crate) struct Batcher {
    namespace: Namespace,
    ordered: bool,
    write_concern: Option<WriteConcern>,
    max_batch_len: usize,
    max_message_size_bytes: usize,
}

impl Batcher {
    pub(crate) fn new(
        namespace: Namespace,
        ordered: bool,
        write_concern: Option<WriteConcern>,
        max_batch_len: usize,
        max_message_size_bytes: usize,
    ) -> Self {
        Self {
            namespace,
            ordered,
            write_concern,
            max_batch_len,
            max_message_size_bytes,
        }
    }

    /// Consume the front of `requests` (in place) into the next homogeneous batch.
    pub(crate) fn next_batch(&self, requests: &mut Vec<WriteRequest>) -> Result<Option<Batch>> {
        if requests.is_empty() {
            return Ok(None);
        }

        let batch_type = requests[0].kind.batch_type();
        let mut payload = Vec::new();
        let mut index_map = Vec::new();
        let mut unprocessed = Vec::new();
        let mut inserted_ids = HashMap::new();
        let mut size_so_far = 0usize;
        let mut remaining = requests.drain(..).collect::<Vec<_>>();
        let mut iter = remaining.drain(..);

        for request in iter.by_ref() {
            if request.kind.batch_type() != batch_type {
                if self.ordered {
                    unprocessed.push(request);
                    // everything else also becomes unprocessed, preserving order
                    unprocessed.extend(iter.by_ref());
                    break;
                } else {
                    unprocessed.push(request);
                    continue;
                }
            }

            let encoded = request.kind.encode()?;
            let entry_size = bson_util::array_entry_size_bytes(payload.len(), encoded.as_bytes().len());

            if payload.len() >= self.max_batch_len
                || (!payload.is_empty() && size_so_far + entry_size > self.max_message_size_bytes)
            {
                unprocessed.push(WriteRequest {
                    original_index: request.original_index,
                    kind: request.kind,
                });
                unprocessed.extend(iter.by_ref());
                break;
            }

            if let WriteRequestKind::Insert { document } = &request.kind {
                if let Ok(Some(id)) = document.get("_id") {
                    if let Ok(id) = Bson::try_from(id) {
                        inserted_ids.insert(request.original_index, id);
                    }
                }
            }

            size_so_far += entry_size;
            index_map.push(request.original_index);
            payload.push(encoded);
        }

        *requests = unprocessed;

        if payload.is_empty() {
            return Ok(None);
        }

        Ok(Some(Batch {
            namespace: self.namespace.clone(),
            ordered: self.ordered,
            write_concern: self.write_concern.clone(),
            batch_type,
            payload,
            index_map,
            unprocessed: Vec::new(),
            inserted_ids,
        }))
    }
}

/// The server's reply to one batch: affected-document count, and for update/replace commands the
/// modified count, upserts, and any per-item/write-concern errors (spec §4.4 "Combining
/// results").
#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BatchResponse {
    pub(crate) n: i64,
    #[serde(default)]
    pub(crate) n_modified: Option<i64>,
    #[serde(default)]
    pub(crate) upserted: Vec<Upserted>,
    #[serde(default, rename = "writeErrors")]
    pub(crate) write_errors: Vec<BulkWriteError>,
    #[serde(default, rename = "writeConcernError")]
    pub(crate) write_concern_error: Option<crate::error::WriteConcernError>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Upserted {
    pub(crate) index: usize,
    #[serde(rename = "_id")]
    pub(crate) id: Bson,
}

use serde::Deserialize;

/// Accumulates replies across every batch of one bulk write into a single, user-facing result
/// plus any errors. Owned by one batching session, never shared across operations (spec §5).
#[derive(Debug, Default)]
pub(crate) struct Combiner {
    pub(crate) inserted_count: i64,
    pub(crate) matched_count: i64,
    pub(crate) modified_count: i64,
    pub(crate) deleted_count: i64,
    pub(crate) inserted_ids: HashMap<usize, Bson>,
    pub(crate) upserted_ids: HashMap<usize, Bson>,
    pub(crate) write_errors: Vec<BulkWriteError>,
    pub(crate) write_concern_error: Option<crate::error::WriteConcernError>,
}

impl Combiner {
    /// Fold one batch's reply in, remapping payload-local indices to the user's original
    /// submitted positions via `index_map` (spec §4.4's remapping rule).
    pub(crate) fn add_batch_response(&mut self, batch_type: BatchType, index_map: &[usize], response: BatchResponse) {
        match batch_type {
            BatchType::Insert => self.inserted_count += response.n,
            BatchType::Update => {
                self.matched_count += response.n;
                self.modified_count += response.n_modified.unwrap_or(0);
            }
            BatchType::Delete => self.deleted_count += response.n,
        }

        for upserted in response.upserted {
            if let Some(&original_index) = index_map.get(upserted.index) {
                self.upserted_ids.insert(original_index, upserted.id);
            }
        }

        for mut err in response.write_errors {
            if let Some(&original_index) = index_map.get(err.index) {
                err.index = original_index;
            }
            self.write_errors.push(err);
        }

        if let Some(wce) = response.write_concern_error {
            // a single bulk write only surfaces one write-concern error: the first one seen
            self.write_concern_error.get_or_insert(wce);
        }
    }

    /// Records the `_id` of a document this batch successfully inserted, keyed by its original
    /// submitted position.
    pub(crate) fn add_inserted_ids(&mut self, ids: HashMap<usize, Bson>) {
        self.inserted_ids.extend(ids);
    }

    /// True once any per-item error or write-concern error has been observed (spec §4.4
    /// `has_errors`).
    pub(crate) fn has_errors(&self) -> bool {
        !self.write_errors.is_empty() || self.write_concern_error.is_some()
    }

    pub(crate) fn into_result(self) -> Result<InsertManyResult> {
        if self.has_errors() {
            let mut failure = BulkWriteFailure::new();
            if !self.write_errors.is_empty() {
                failure.write_errors = Some(self.write_errors);
            }
            failure.write_concern_error = self.write_concern_error;
            failure.inserted_ids = self.inserted_ids;
            return Err(ErrorKind::BulkWrite(failure).into());
        }

        Ok(InsertManyResult {
            inserted_ids: self.inserted_ids,
        })
    }

    pub(crate) fn into_update_result(self) -> Result<UpdateResult> {
        if self.has_errors() {
            return Err(combiner_errors_to_write_failure(self));
        }
        Ok(UpdateResult {
            matched_count: self.matched_count.max(0) as u64,
            modified_count: self.modified_count.max(0) as u64,
            upserted_id: self.upserted_ids.values().next().cloned(),
        })
    }

    pub(crate) fn into_delete_result(self) -> Result<DeleteResult> {
        if self.has_errors() {
            return Err(combiner_errors_to_write_failure(self));
        }
        Ok(DeleteResult {
            deleted_count: self.deleted_count.max(0) as u64,
        })
    }
}

fn combiner_errors_to_write_failure(combiner: Combiner) -> Error {
    let mut failure = BulkWriteFailure::new();
    if !combiner.write_errors.is_empty() {
        failure.write_errors = Some(combiner.write_errors);
    }
    failure.write_concern_error = combiner.write_concern_error;
    ErrorKind::BulkWrite(failure).into()
}

/// Validates a bulk write isn't empty before any batching is attempted (spec §4.3/§7: an empty
/// bulk write is an invalid argument, not a zero-batch no-op).
pub(crate) fn validate_nonempty(requests: &[WriteRequest]) -> Result<()> {
    if requests.is_empty() {
        return Err(ErrorKind::InvalidArgument {
            message: "bulk write must contain at least one write request".to_string(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn insert(i: usize, id: i32) -> WriteRequest {
        WriteRequest {
            original_index: i,
            kind: WriteRequestKind::Insert {
                document: bson::to_raw_document_buf(&bson::doc! { "_id": id }).unwrap(),
            },
        }
    }

    #[test]
    fn single_batch_for_homogeneous_requests() {
        let batcher = Batcher::new(Namespace::new("db", "coll"), true, None, 100_000, 48 * 1024 * 1024);
        let mut requests = vec![insert(0, 0), insert(1, 1), insert(2, 2)];
        let batch = batcher.next_batch(&mut requests).unwrap().unwrap();
        assert_eq!(batch.payload.len(), 3);
        assert_eq!(batch.index_map, vec![0, 1, 2]);
        assert!(requests.is_empty());
    }

    #[test]
    fn ordered_batch_stops_at_first_kind_change() {
        let batcher = Batcher::new(Namespace::new("db", "coll"), true, None, 100_000, 48 * 1024 * 1024);
        let mut requests = vec![
            insert(0, 0),
            WriteRequest {
                original_index: 1,
                kind: WriteRequestKind::Delete {
                    filter: RawDocumentBuf::new(),
                    multi: false,
                    collation: None,
                },
            },
            insert(2, 2),
        ];
        let batch = batcher.next_batch(&mut requests).unwrap().unwrap();
        assert_eq!(batch.index_map, vec![0]);
        assert_eq!(requests.len(), 2);
    }

    #[test]
    fn combiner_remaps_write_errors_to_original_index() {
        let mut combiner = Combiner::default();
        combiner.add_batch_response(
            BatchType::Insert,
            &[5, 6, 7],
            BatchResponse {
                n: 2,
                write_errors: vec![BulkWriteError {
                    index: 1,
                    code: 11000,
                    code_name: None,
                    message: "dup".to_string(),
                }],
                ..Default::default()
            },
        );
        assert_eq!(combiner.write_errors[0].index, 6);
        assert!(combiner.has_errors());
    }

    #[test]
    fn empty_bulk_write_is_rejected() {
        assert!(validate_nonempty(&[]).is_err());
    }

    #[test]
    fn batch_collects_inserted_ids_from_documents() {
        let batcher = Batcher::new(Namespace::new("db", "coll"), true, None, 100_000, 48 * 1024 * 1024);
        let mut requests = vec![insert(0, 0), insert(1, 1)];
        let batch = batcher.next_batch(&mut requests).unwrap().unwrap();
        assert_eq!(batch.inserted_ids.get(&0), Some(&Bson::Int32(0)));
        assert_eq!(batch.inserted_ids.get(&1), Some(&Bson::Int32(1)));
    }

    #[test]
    fn successful_insert_many_reports_ids_by_original_index() {
        let mut combiner = Combiner::default();
        let mut ids = HashMap::new();
        ids.insert(0usize, Bson::Int32(0));
        combiner.add_inserted_ids(ids);
        combiner.add_batch_response(BatchType::Insert, &[0], BatchResponse { n: 1, ..Default::default() });
        let result = combiner.into_result().unwrap();
        assert_eq!(result.inserted_ids.get(&0), Some(&Bson::Int32(0)));
    }
}
