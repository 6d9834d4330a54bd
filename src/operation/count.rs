use bson::rawdoc;
use serde::{Deserialize, Serialize};

use crate::{
    cmap::{Command, RawCommandResponse, StreamDescription},
    error::{Error, Result},
    operation::{append_options_to_raw_document, Operation, Retryability},
    options::{ReadConcern, SelectionCriteria, WriteConcern},
    Namespace,
};

/// Options for an estimated `count` command (spec §4.7's `count` row).
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

pub(crate) struct Count {
    ns: Namespace,
    options: Option<Options>,
}

impl Count {
    pub(crate) fn new(ns: Namespace, options: Option<Options>) -> Self {
        Count { ns, options }
    }
}

impl Operation for Count {
    type O = u64;

    const NAME: &'static str = "count";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let mut body = rawdoc! {
            Self::NAME: self.ns.coll.clone(),
        };

        append_options_to_raw_document(&mut body, self.options.as_ref())?;

        Ok(Command::new(self.ns.db.clone(), body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        let response_body: ResponseBody = response.body()?;
        Ok(response_body.n)
    }

    fn handle_error(&self, error: Error) -> Result<Self::O> {
        if error.is_ns_not_found() {
            Ok(0)
        } else {
            Err(error)
        }
    }

    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        self.options
            .as_ref()
            .and_then(|o| o.selection_criteria.as_ref())
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        None
    }

    fn supports_read_concern(&self, _description: &StreamDescription) -> bool {
        true
    }

    fn retryability(&self) -> Retryability {
        Retryability::Read
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseBody {
    n: u64,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn build_sets_collection_name_and_db() {
        let ns = Namespace::new("db", "coll");
        let mut count = Count::new(ns, None);
        let command = count.build(&StreamDescription::initial()).unwrap();
        assert_eq!(command.target_db, "db");
        let name = command.body.get("count").unwrap().unwrap();
        assert_eq!(name.as_str(), Some("coll"));
    }
}
