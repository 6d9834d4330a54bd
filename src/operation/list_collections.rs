use bson::{rawdoc, Document};
use serde::Serialize;

use crate::{
    cmap::{Command, RawCommandResponse, StreamDescription},
    cursor::CursorSpecification,
    error::Result,
    operation::{append_options_to_raw_document, CursorBody, Operation, Retryability},
    options::{ReadPreference, SelectionCriteria},
};

/// Options for a `listCollections` command (spec §4.7's `listCollections` row).
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Options {
    #[serde(rename = "cursor")]
    pub(crate) batch_size: Option<u32>,

    pub(crate) filter: Option<Document>,
}

#[derive(Debug)]
pub(crate) struct ListCollections {
    db: String,
    name_only: bool,
    options: Option<Options>,
    selection_criteria: SelectionCriteria,
}

impl ListCollections {
    pub(crate) fn new(db: String, name_only: bool, options: Option<Options>) -> Self {
        Self {
            db,
            name_only,
            options,
            selection_criteria: SelectionCriteria::from(ReadPreference::Primary),
        }
    }
}

impl Operation for ListCollections {
    type O = CursorSpecification;

    const NAME: &'static str = "listCollections";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let mut body = rawdoc! {
            Self::NAME: 1_i32,
        };

        let mut name_only = self.name_only;
        if let Some(filter) = self.options.as_ref().and_then(|o| o.filter.as_ref()) {
            if name_only && filter.keys().any(|k| k != "name") {
                name_only = false;
            }
        }
        body.append("nameOnly", name_only);

        append_options_to_raw_document(&mut body, self.options.as_ref())?;

        Ok(Command::new(self.db.clone(), body))
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
            None,
        ))
    }

    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        Some(&self.selection_criteria)
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
    fn name_filter_keeps_name_only() {
        let options = Options {
            filter: Some(doc! { "name": "coll" }),
            ..Default::default()
        };
        let mut list_collections = ListCollections::new("db".to_string(), true, Some(options));

        let command = list_collections.build(&StreamDescription::initial()).unwrap();
        assert!(command.body.get_bool("nameOnly").unwrap());
    }

    #[test]
    fn non_name_filter_disables_name_only() {
        let options = Options {
            filter: Some(doc! { "options.capped": true }),
            ..Default::default()
        };
        let mut list_collections = ListCollections::new("db".to_string(), true, Some(options));

        let command = list_collections.build(&StreamDescription::initial()).unwrap();
        assert!(!command.body.get_bool("nameOnly").unwrap());
    }
}
