use std::collections::HashMap;

use bson::{oid::ObjectId, Bson, RawArrayBuf, RawDocumentBuf};
use serde::Serialize;

use crate::{
    cmap::{Command, RawCommandResponse, StreamDescription},
    error::{BulkWriteFailure, Error, ErrorKind, Result},
    operation::{Operation, Retryability, WriteResponseBody, COMMAND_OVERHEAD_SIZE},
    options::WriteConcern,
    results::InsertManyResult,
    serde_util,
    Namespace,
};

/// Options for an `insert` command (spec §4.7's "insert / update / delete (single batch)" row).
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Options {
    pub(crate) ordered: Option<bool>,

    #[serde(skip_serializing)]
    pub(crate) write_concern: Option<WriteConcern>,

    pub(crate) bypass_document_validation: Option<bool>,
}

#[derive(Debug)]
pub(crate) struct Insert<'a, T> {
    ns: Namespace,
    documents: Vec<&'a T>,
    inserted_ids: Vec<Bson>,
    options: Options,
}

impl<'a, T> Insert<'a, T> {
    pub(crate) fn new(ns: Namespace, documents: Vec<&'a T>, options: Option<Options>) -> Self {
        let mut options = options.unwrap_or_default();
        if options.ordered.is_none() {
            options.ordered = Some(true);
        }

        Self {
            ns,
            options,
            documents,
            inserted_ids: vec![],
        }
    }
}

impl<'a, T: Serialize> Operation for Insert<'a, T> {
    type O = InsertManyResult;

    const NAME: &'static str = "insert";

    fn build(&mut self, description: &StreamDescription) -> Result<Command> {
        let mut docs = Vec::new();
        let mut size = 0u64;

        let max_doc_size = description.max_bson_object_size_bytes as u64;
        let max_doc_sequence_size =
            description.max_message_size_bytes as u64 - COMMAND_OVERHEAD_SIZE;

        for d in self
            .documents
            .iter()
            .take(description.max_write_batch_size as usize)
        {
            let mut doc = serde_util::to_raw_document_buf_with_options(d, false)?;
            let id = match doc.get("_id")? {
                Some(b) => Bson::try_from(b)?,
                None => {
                    let mut new_doc = RawDocumentBuf::new();
                    let oid = ObjectId::new();
                    new_doc.append("_id", oid);

                    let mut new_bytes = new_doc.into_bytes();
                    new_bytes.pop(); // remove trailing null byte

                    let mut bytes = doc.into_bytes();
                    let oid_slice = &new_bytes[4..];
                    // insert oid at beginning of document
                    bytes.splice(4..4, oid_slice.iter().cloned());

                    // overwrite old length
                    let new_length = (bytes.len() as i32).to_le_bytes();
                    bytes[0..4].copy_from_slice(&new_length);
                    doc = RawDocumentBuf::from_bytes(bytes)?;

                    Bson::ObjectId(oid)
                }
            };

            let doc_size = doc.as_bytes().len() as u64;
            if doc_size > max_doc_size {
                return Err(ErrorKind::InvalidArgument {
                    message: format!(
                        "insert document must be within {} bytes, but document provided is {} \
                         bytes",
                        max_doc_size, doc_size
                    ),
                }
                .into());
            }

            if size + doc_size > max_doc_sequence_size {
                break;
            }

            self.inserted_ids.push(id);
            docs.push(doc);
            size += doc_size;
        }

        let mut body = bson::rawdoc! {
            Self::NAME: self.ns.coll.clone(),
        };
        super::append_options_to_raw_document(&mut body, Some(&self.options))?;

        let mut array = RawArrayBuf::new();
        for doc in docs {
            array.push(doc);
        }
        body.append("documents", array);

        Ok(Command::new(self.ns.db.clone(), body))
    }

    fn handle_response(
        &self,
        raw_response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        let response: WriteResponseBody = raw_response.body()?;

        let mut map = HashMap::new();
        if self.options.ordered == Some(true) {
            // in ordered inserts, only the first n were attempted.
            for (i, id) in self
                .inserted_ids
                .iter()
                .enumerate()
                .take(response.n as usize)
            {
                map.insert(i, id.clone());
            }
        } else {
            // for unordered, add all the attempted ids and then remove the ones that have
            // associated write errors.
            for (i, id) in self.inserted_ids.iter().enumerate() {
                map.insert(i, id.clone());
            }

            if let Some(write_errors) = response.write_errors.as_ref() {
                for err in write_errors {
                    map.remove(&err.index);
                }
            }
        }

        if response.write_errors.is_some() || response.write_concern_error.is_some() {
            return Err(Error::new(
                ErrorKind::BulkWrite(BulkWriteFailure {
                    write_errors: response.write_errors,
                    write_concern_error: response.write_concern_error,
                    inserted_ids: map,
                }),
                response.labels.unwrap_or_default(),
            ));
        }

        Ok(InsertManyResult { inserted_ids: map })
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.options.write_concern.as_ref()
    }

    fn retryability(&self) -> Retryability {
        Retryability::Write
    }
}

#[cfg(test)]
mod test {
    use bson::doc;

    use super::*;

    #[test]
    fn build_generates_missing_ids_and_leaves_supplied_ones_alone() {
        let ns = Namespace::new("db", "coll");
        let with_id = doc! { "_id": 1, "a": 1 };
        let without_id = doc! { "a": 2 };
        let mut insert = Insert::new(ns, vec![&with_id, &without_id], None);

        let command = insert.build(&StreamDescription::initial()).unwrap();
        assert_eq!(command.target_db, "db");
        assert_eq!(insert.inserted_ids.len(), 2);
        assert_eq!(insert.inserted_ids[0], Bson::Int32(1));
        assert!(matches!(insert.inserted_ids[1], Bson::ObjectId(_)));
    }

    #[test]
    fn ordered_is_true_by_default() {
        let ns = Namespace::new("db", "coll");
        let doc = doc! { "a": 1 };
        let insert = Insert::new(ns, vec![&doc], None);
        assert_eq!(insert.options.ordered, Some(true));
    }
}
