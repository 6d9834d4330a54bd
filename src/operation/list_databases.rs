use bson::{rawdoc, Document};
use serde::{Deserialize, Serialize};

use crate::{
    cmap::{Command, RawCommandResponse, StreamDescription},
    error::Result,
    operation::{append_options_to_raw_document, Operation, Retryability},
    options::{ReadPreference, SelectionCriteria},
    results::DatabaseSpecification,
    serde_util,
};

/// Options for a `listDatabases` command (spec §4.7's `listDatabases` row).
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Options {
    pub(crate) authorized_databases: Option<bool>,
}

#[derive(Debug)]
pub(crate) struct ListDatabases {
    filter: Option<Document>,
    name_only: bool,
    options: Option<Options>,
    selection_criteria: SelectionCriteria,
}

impl ListDatabases {
    pub(crate) fn new(filter: Option<Document>, name_only: bool, options: Option<Options>) -> Self {
        Self {
            filter,
            name_only,
            options,
            selection_criteria: SelectionCriteria::from(ReadPreference::Primary),
        }
    }
}

impl Operation for ListDatabases {
    type O = Vec<DatabaseSpecification>;

    const NAME: &'static str = "listDatabases";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let mut body = rawdoc! {
            Self::NAME: 1_i32,
            "nameOnly": self.name_only,
        };

        if let Some(ref filter) = self.filter {
            body.append(
                "filter",
                serde_util::to_raw_document_buf_with_options(filter, false)?,
            );
        }

        append_options_to_raw_document(&mut body, self.options.as_ref())?;

        Ok(Command::new("admin".to_string(), body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        let response: Response = response.body()?;
        Ok(response.databases)
    }

    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        Some(&self.selection_criteria)
    }

    fn retryability(&self) -> Retryability {
        Retryability::Read
    }
}

#[derive(Debug, Deserialize)]
struct Response {
    databases: Vec<DatabaseSpecification>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn build_targets_admin_database() {
        let mut list_databases = ListDatabases::new(None, false, None);
        let command = list_databases.build(&StreamDescription::initial()).unwrap();
        assert_eq!(command.target_db, "admin");
    }

    #[test]
    fn build_includes_filter_when_present() {
        let mut list_databases =
            ListDatabases::new(Some(bson::doc! { "name": "db" }), false, None);
        let command = list_databases.build(&StreamDescription::initial()).unwrap();
        assert!(command.body.get("filter").unwrap().is_some());
    }
}
