use bson::{rawdoc, Document, RawBson};
use serde::Serialize;

use crate::{
    bson_util,
    cmap::{Command, RawCommandResponse, StreamDescription},
    error::Result,
    operation::{
        append_options_to_raw_document,
        remove_empty_write_concern,
        Operation,
        Retryability,
        WriteResponseBody,
    },
    options::{Collation, WriteConcern},
    results::UpdateResult,
    serde_util,
    Namespace,
};

/// Either an update-modifications document (must start with a `$`-prefixed key, or be an
/// aggregation pipeline) or a full replacement document (spec §4.3's per-kind encoding rule,
/// shared with `findAndModify`'s `update`/`remove` choice).
#[derive(Clone, Debug)]
pub(crate) enum UpdateOrReplace {
    UpdateModifications(Document),
    Replacement(Document),
}

impl UpdateOrReplace {
    pub(crate) fn to_raw_bson(&self, human_readable_serialization: bool) -> Result<RawBson> {
        let (doc, check): (&Document, fn(&bson::RawDocument) -> Result<()>) = match self {
            UpdateOrReplace::UpdateModifications(doc) => (doc, bson_util::update_document_check),
            UpdateOrReplace::Replacement(doc) => (doc, bson_util::replacement_document_check),
        };
        let raw = serde_util::to_raw_document_buf_with_options(doc, human_readable_serialization)?;
        check(&raw)?;
        Ok(RawBson::Document(raw))
    }
}

/// Options for an `update` command (spec §4.7's "insert / update / delete (single batch)" row).
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Options {
    pub(crate) upsert: Option<bool>,
    pub(crate) array_filters: Option<Vec<Document>>,
    pub(crate) bypass_document_validation: Option<bool>,
    pub(crate) collation: Option<Collation>,

    #[serde(skip_serializing)]
    pub(crate) write_concern: Option<WriteConcern>,
}

#[derive(Debug)]
pub(crate) struct Update {
    ns: Namespace,
    filter: Document,
    update: UpdateOrReplace,
    multi: bool,
    options: Option<Options>,
}

impl Update {
    pub(crate) fn new(
        ns: Namespace,
        filter: Document,
        update: UpdateOrReplace,
        multi: bool,
        options: Option<Options>,
    ) -> Self {
        Self {
            ns,
            filter,
            update,
            multi,
            options,
        }
    }
}

impl Operation for Update {
    type O = UpdateResult;

    const NAME: &'static str = "update";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        remove_empty_write_concern!(self.options);

        let mut update = rawdoc! {
            "q": serde_util::to_raw_document_buf_with_options(&self.filter, false)?,
            "u": self.update.to_raw_bson(false)?,
        };
        if self.multi {
            update.append("multi", true);
        }
        if let Some(ref options) = self.options {
            if let Some(upsert) = options.upsert {
                update.append("upsert", upsert);
            }
        }

        let mut updates = bson::RawArrayBuf::new();
        updates.push(update);

        let mut body = rawdoc! {
            Self::NAME: self.ns.coll.clone(),
            "updates": updates,
        };
        append_options_to_raw_document(&mut body, self.options.as_ref())?;

        Ok(Command::new(self.ns.db.clone(), body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        let response: WriteResponseBody<UpdateBody> = response.body()?;
        response.validate()?;

        let upserted_id = response
            .upserted
            .as_ref()
            .and_then(|docs| docs.first())
            .and_then(|doc| doc.get("_id"))
            .cloned();

        Ok(UpdateResult {
            matched_count: response.n,
            modified_count: response.n_modified,
            upserted_id,
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

#[derive(Debug, serde::Deserialize)]
pub(crate) struct UpdateBody {
    #[serde(rename = "nModified")]
    pub(crate) n_modified: u64,
    pub(crate) upserted: Option<Vec<Document>>,
}

#[cfg(test)]
mod test {
    use bson::doc;

    use super::*;

    #[test]
    fn multi_update_is_not_retryable() {
        let ns = Namespace::new("db", "coll");
        let update = Update::new(
            ns,
            doc! { "a": 1 },
            UpdateOrReplace::UpdateModifications(doc! { "$set": { "a": 2 } }),
            true,
            None,
        );
        assert_eq!(update.retryability(), Retryability::None);
    }

    #[test]
    fn replacement_document_is_rejected_when_it_has_dollar_keys() {
        let replacement = UpdateOrReplace::Replacement(doc! { "$set": { "a": 2 } });
        assert!(replacement.to_raw_bson(false).is_err());
    }

    #[test]
    fn build_single_update_sets_upsert_and_multi() {
        let ns = Namespace::new("db", "coll");
        let options = Options {
            upsert: Some(true),
            ..Default::default()
        };
        let mut update = Update::new(
            ns,
            doc! { "a": 1 },
            UpdateOrReplace::UpdateModifications(doc! { "$set": { "a": 2 } }),
            false,
            Some(options),
        );

        let command = update.build(&StreamDescription::initial()).unwrap();
        let updates = command.body.get_array("updates").unwrap();
        let first = updates.into_iter().next().unwrap().unwrap();
        let first = first.as_document().unwrap();
        assert!(first.get("upsert").unwrap().unwrap().as_bool().unwrap());
        assert!(first.get("multi").unwrap().is_none());
    }
}
