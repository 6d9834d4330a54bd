use std::time::Duration;

use bson::{from_slice, rawdoc, Document, RawBson};
use serde::{Deserialize, Serialize};

use crate::{
    cmap::{Command, RawCommandResponse, StreamDescription},
    error::{ErrorKind, Result},
    operation::{
        append_options_to_raw_document,
        remove_empty_write_concern,
        update::UpdateOrReplace,
        Operation,
        Retryability,
    },
    options::{Collation, WriteConcern},
    serde_util,
    Namespace,
};

/// The modification a `findAndModify` command applies: either a delete, or an update/replace
/// sharing `update`'s `UpdateOrReplace` distinction (spec §4.7's `findAndModify` row).
#[derive(Debug)]
pub(crate) enum Modification {
    Delete,
    Update(UpdateOrReplace),
}

/// Options for a `findAndModify` command.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Options {
    pub(crate) sort: Option<Document>,
    pub(crate) projection: Option<Document>,
    #[serde(rename = "new")]
    pub(crate) return_document_after_change: Option<bool>,
    pub(crate) upsert: Option<bool>,
    pub(crate) collation: Option<Collation>,
    pub(crate) array_filters: Option<Vec<Document>>,
    pub(crate) bypass_document_validation: Option<bool>,

    #[serde(
        rename = "maxTimeMS",
        serialize_with = "serde_util::serialize_duration_option_as_int_millis"
    )]
    pub(crate) max_time: Option<Duration>,

    #[serde(skip_serializing)]
    pub(crate) write_concern: Option<WriteConcern>,
}

#[derive(Debug)]
pub(crate) struct FindAndModify {
    ns: Namespace,
    query: Document,
    modification: Modification,
    options: Option<Options>,
}

impl FindAndModify {
    pub(crate) fn with_delete(ns: Namespace, query: Document, options: Option<Options>) -> Self {
        Self {
            ns,
            query,
            modification: Modification::Delete,
            options,
        }
    }

    pub(crate) fn with_update(
        ns: Namespace,
        query: Document,
        update: UpdateOrReplace,
        options: Option<Options>,
    ) -> Self {
        Self {
            ns,
            query,
            modification: Modification::Update(update),
            options,
        }
    }
}

impl Operation for FindAndModify {
    type O = Option<Document>;

    const NAME: &'static str = "findAndModify";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        remove_empty_write_concern!(self.options);

        let mut body = rawdoc! {
            Self::NAME: self.ns.coll.clone(),
            "query": serde_util::to_raw_document_buf_with_options(&self.query, false)?,
        };

        match &self.modification {
            Modification::Delete => {
                body.append("remove", true);
            }
            Modification::Update(update_or_replace) => {
                body.append("update", update_or_replace.to_raw_bson(false)?);
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
        #[derive(Debug, Deserialize)]
        struct Response {
            value: RawBson,
        }
        let response: Response = response.body()?;

        match response.value {
            RawBson::Document(doc) => Ok(Some(from_slice(doc.as_bytes())?)),
            RawBson::Null => Ok(None),
            other => Err(ErrorKind::InvalidResponse {
                message: format!(
                    "expected document for value field of findAndModify response, but instead \
                     got {:?}",
                    other
                ),
            }
            .into()),
        }
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.options.as_ref().and_then(|o| o.write_concern.as_ref())
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
    fn delete_sets_remove_flag() {
        let ns = Namespace::new("db", "coll");
        let mut find_and_modify = FindAndModify::with_delete(ns, doc! { "a": 1 }, None);

        let command = find_and_modify.build(&StreamDescription::initial()).unwrap();
        assert!(command.body.get_bool("remove").unwrap());
    }

    #[test]
    fn update_sets_update_field() {
        let ns = Namespace::new("db", "coll");
        let update = UpdateOrReplace::UpdateModifications(doc! { "$set": { "a": 2 } });
        let mut find_and_modify = FindAndModify::with_update(ns, doc! { "a": 1 }, update, None);

        let command = find_and_modify.build(&StreamDescription::initial()).unwrap();
        assert!(command.body.get_document("update").is_ok());
        assert!(command.body.get("remove").unwrap().is_none());
    }
}
