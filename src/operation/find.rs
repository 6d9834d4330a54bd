use std::time::Duration;

use bson::{rawdoc, Document};
use serde::Serialize;

use crate::{
    cmap::{Command, RawCommandResponse, StreamDescription},
    cursor::CursorSpecification,
    error::{ErrorKind, Result},
    operation::{append_options_to_raw_document, CursorBody, Operation, Retryability},
    options::{Collation, ReadConcern, SelectionCriteria},
    serde_util,
    Namespace,
};

/// Whether the cursor this `find` opens should poll the server for new documents after the
/// result set is momentarily exhausted (spec §4.7's `find` row, `tailable`/`awaitData`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CursorType {
    NonTailable,
    Tailable,
    TailableAwait,
}

/// Options for a `find` command (spec §4.7's `find` row).
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Options {
    pub(crate) projection: Option<Document>,
    pub(crate) sort: Option<Document>,
    pub(crate) skip: Option<u64>,
    #[serde(skip_serializing)]
    pub(crate) limit: Option<i64>,
    pub(crate) batch_size: Option<u32>,
    pub(crate) no_cursor_timeout: Option<bool>,
    pub(crate) allow_partial_results: Option<bool>,
    pub(crate) collation: Option<Collation>,
    pub(crate) comment: Option<String>,

    #[serde(
        rename = "maxTimeMS",
        serialize_with = "serde_util::serialize_duration_option_as_int_millis"
    )]
    pub(crate) max_time: Option<Duration>,

    #[serde(skip_serializing)]
    pub(crate) max_await_time: Option<Duration>,

    #[serde(skip_serializing)]
    pub(crate) cursor_type: Option<CursorType>,

    #[serde(skip_serializing)]
    pub(crate) read_concern: Option<ReadConcern>,

    #[serde(skip_serializing)]
    pub(crate) selection_criteria: Option<SelectionCriteria>,
}

#[derive(Debug)]
pub(crate) struct Find {
    ns: Namespace,
    filter: Document,
    options: Option<Options>,
}

impl Find {
    pub(crate) fn new(ns: Namespace, filter: Document, options: Option<Options>) -> Self {
        Self {
            ns,
            filter,
            options,
        }
    }
}

impl Operation for Find {
    type O = CursorSpecification;

    const NAME: &'static str = "find";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let mut body = rawdoc! {
            Self::NAME: self.ns.coll.clone(),
            "filter": serde_util::to_raw_document_buf_with_options(&self.filter, false)?,
        };

        if let Some(ref options) = self.options {
            if let Some(limit) = options.limit {
                if limit < 0 {
                    body.append("limit", -limit);
                    body.append("singleBatch", true);
                } else if limit > 0 {
                    body.append("limit", limit);
                }
            }

            if options
                .batch_size
                .map(|batch_size| batch_size > i32::MAX as u32)
                == Some(true)
            {
                return Err(ErrorKind::InvalidArgument {
                    message: "The batch size must fit into a signed 32-bit integer".to_string(),
                }
                .into());
            }

            match options.cursor_type {
                Some(CursorType::Tailable) => {
                    body.append("tailable", true);
                }
                Some(CursorType::TailableAwait) => {
                    body.append("tailable", true);
                    body.append("awaitData", true);
                }
                _ => {}
            }
        }

        append_options_to_raw_document(&mut body, self.options.as_ref())?;

        Ok(Command::new(self.ns.db.clone(), body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        let response: CursorBody = response.body()?;

        Ok(CursorSpecification::new(
            response.cursor,
            self.options.as_ref().and_then(|opts| opts.batch_size),
            self.options.as_ref().and_then(|opts| opts.max_await_time),
        ))
    }

    fn supports_read_concern(&self, _description: &StreamDescription) -> bool {
        true
    }

    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        self.options
            .as_ref()
            .and_then(|opts| opts.selection_criteria.as_ref())
    }

    fn retryability(&self) -> Retryability {
        Retryability::Read
    }
}

#[cfg(test)]
mod test {
    use bson::doc;

    use super::*;

    #[test]
    fn negative_limit_forces_single_batch() {
        let ns = Namespace::new("db", "coll");
        let options = Options {
            limit: Some(-5),
            ..Default::default()
        };
        let mut find = Find::new(ns, doc! {}, Some(options));

        let command = find.build(&StreamDescription::initial()).unwrap();
        assert_eq!(command.body.get_i64("limit").unwrap(), 5);
        assert!(command.body.get_bool("singleBatch").unwrap());
    }

    #[test]
    fn oversized_batch_size_is_rejected() {
        let ns = Namespace::new("db", "coll");
        let options = Options {
            batch_size: Some(i32::MAX as u32 + 1),
            ..Default::default()
        };
        let mut find = Find::new(ns, doc! {}, Some(options));

        assert!(find.build(&StreamDescription::initial()).is_err());
    }
}
