use bson::{rawdoc, Document};
use serde::Serialize;

use crate::{
    cmap::{Command, RawCommandResponse, StreamDescription},
    error::Result,
    operation::{append_options_to_raw_document, Operation, Retryability, WriteResponseBody},
    options::{Collation, WriteConcern},
    results::DeleteResult,
    serde_util,
    Namespace,
};

/// Options for a `delete` command (spec §4.7's "insert / update / delete (single batch)" row).
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Options {
    pub(crate) collation: Option<Collation>,

    #[serde(skip_serializing)]
    pub(crate) write_concern: Option<WriteConcern>,
}

#[derive(Debug)]
pub(crate) struct Delete {
    ns: Namespace,
    filter: Document,
    multi: bool,
    options: Option<Options>,
}

impl Delete {
    pub(crate) fn new(ns: Namespace, filter: Document, multi: bool, options: Option<Options>) -> Self {
        Self {
            ns,
            filter,
            multi,
            options,
        }
    }
}

impl Operation for Delete {
    type O = DeleteResult;

    const NAME: &'static str = "delete";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let mut delete = rawdoc! {
            "q": serde_util::to_raw_document_buf_with_options(&self.filter, false)?,
            "limit": if self.multi { 0_i32 } else { 1_i32 },
        };
        if let Some(collation) = self.options.as_ref().and_then(|o| o.collation.as_ref()) {
            delete.append("collation", bson::to_raw_document_buf(collation)?);
        }

        let mut deletes = bson::RawArrayBuf::new();
        deletes.push(delete);

        let body = rawdoc! {
            Self::NAME: self.ns.coll.clone(),
            "deletes": deletes,
        };

        Ok(Command::new(self.ns.db.clone(), body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        let response: WriteResponseBody = response.body()?;
        response.validate()?;

        Ok(DeleteResult {
            deleted_count: response.n,
        })
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.options.as_ref().and_then(|o| o.write_concern.as_ref())
    }

    fn retryability(&self) -> Retryability {
        if self.multi {
            Retryability::None
        } else {
            Retryability::Write
        }
    }
}

#[cfg(test)]
mod test {
    use bson::doc;

    use super::*;

    #[test]
    fn single_delete_sets_limit_to_one() {
        let ns = Namespace::new("db", "coll");
        let mut delete = Delete::new(ns, doc! { "a": 1 }, false, None);

        let command = delete.build(&StreamDescription::initial()).unwrap();
        let deletes = command.body.get_array("deletes").unwrap();
        let first = deletes.into_iter().next().unwrap().unwrap();
        let first = first.as_document().unwrap();
        assert_eq!(first.get_i32("limit").unwrap(), 1);
    }

    #[test]
    fn multi_delete_sets_limit_to_zero_and_is_not_retryable() {
        let ns = Namespace::new("db", "coll");
        let mut delete = Delete::new(ns, doc! { "a": 1 }, true, None);

        let command = delete.build(&StreamDescription::initial()).unwrap();
        let deletes = command.body.get_array("deletes").unwrap();
        let first = deletes.into_iter().next().unwrap().unwrap();
        let first = first.as_document().unwrap();
        assert_eq!(first.get_i32("limit").unwrap(), 0);
        assert_eq!(delete.retryability(), Retryability::None);
    }
}
