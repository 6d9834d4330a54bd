use bson::{rawdoc, Bson, Document};
use serde::{Deserialize, Serialize};

use crate::{
    cmap::{Command, RawCommandResponse, StreamDescription},
    error::Result,
    operation::{append_options_to_raw_document, Operation, Retryability},
    options::{ReadConcern, SelectionCriteria},
    serde_util,
    Namespace,
};

/// Options for a `distinct` command (spec §4.7's `distinct` row).
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Options {
    #[serde(rename = "maxTimeMS")]
    pub(crate) max_time_ms: Option<u64>,

    #[serde(skip_serializing)]
    pub(crate) read_concern: Option<ReadConcern>,

    #[serde(skip_serializing)]
    pub(crate) selection_criteria: Option<SelectionCriteria>,
}

pub(crate) struct Distinct {
    ns: Namespace,
    field_name: String,
    query: Option<Document>,
    options: Option<Options>,
}

impl Distinct {
    pub(crate) fn new(
        ns: Namespace,
        field_name: String,
        query: Option<Document>,
        options: Option<Options>,
    ) -> Self {
        Distinct {
            ns,
            field_name,
            query,
            options,
        }
    }
}

impl Operation for Distinct {
    type O = Vec<Bson>;

    const NAME: &'static str = "distinct";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let mut body = rawdoc! {
            Self::NAME: self.ns.coll.clone(),
            "key": self.field_name.clone(),
        };

        if let Some(query) = &self.query {
            body.append(
                "query",
                serde_util::to_raw_document_buf_with_options(query, false)?,
            );
        }

        append_options_to_raw_document(&mut body, self.options.as_ref())?;

        Ok(Command::new(self.ns.db.clone(), body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        let response: Response = response.body()?;
        Ok(response.values)
    }

    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        self.options
            .as_ref()
            .and_then(|opts| opts.selection_criteria.as_ref())
    }

    fn retryability(&self) -> Retryability {
        Retryability::Read
    }

    fn supports_read_concern(&self, _description: &StreamDescription) -> bool {
        true
    }
}

#[derive(Debug, Deserialize)]
struct Response {
    values: Vec<Bson>,
}

#[cfg(test)]
mod test {
    use bson::doc;

    use super::*;

    #[test]
    fn build_includes_query_when_present() {
        let ns = Namespace::new("db", "coll");
        let mut distinct =
            Distinct::new(ns, "a".to_string(), Some(doc! { "a": { "$gt": 1 } }), None);

        let command = distinct.build(&StreamDescription::initial()).unwrap();
        assert!(command.body.get("query").unwrap().is_some());
    }

    #[test]
    fn build_omits_query_when_absent() {
        let ns = Namespace::new("db", "coll");
        let mut distinct = Distinct::new(ns, "a".to_string(), None, None);

        let command = distinct.build(&StreamDescription::initial()).unwrap();
        assert!(command.body.get("query").unwrap().is_none());
    }
}
