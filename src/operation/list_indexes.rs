use std::time::Duration;

use bson::rawdoc;
use serde::Serialize;

use crate::{
    cmap::{Command, RawCommandResponse, StreamDescription},
    cursor::CursorSpecification,
    error::{ErrorKind, Result},
    operation::{append_options_to_raw_document, CursorBody, Operation, Retryability},
    options::{ReadPreference, SelectionCriteria},
    serde_util,
    Namespace,
};

/// Options for a `listIndexes` command (spec §4.7's `listIndexes` row).
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Options {
    pub(crate) batch_size: Option<u32>,

    #[serde(
        rename = "maxTimeMS",
        serialize_with = "serde_util::serialize_duration_option_as_int_millis"
    )]
    pub(crate) max_time: Option<Duration>,
}

#[derive(Debug)]
pub(crate) struct ListIndexes {
    ns: Namespace,
    options: Option<Options>,
    selection_criteria: SelectionCriteria,
}

impl ListIndexes {
    pub(crate) fn new(ns: Namespace, options: Option<Options>) -> Self {
        Self {
            ns,
            options,
            selection_criteria: SelectionCriteria::from(ReadPreference::Primary),
        }
    }
}

impl Operation for ListIndexes {
    type O = CursorSpecification;

    const NAME: &'static str = "listIndexes";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        if let Some(batch_size) = self.options.as_ref().and_then(|o| o.batch_size) {
            if batch_size > i32::MAX as u32 {
                return Err(ErrorKind::InvalidArgument {
                    message: "batch_size must fit in a 32-bit signed integer".to_string(),
                }
                .into());
            }
        }

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
        let response: CursorBody = response.body()?;
        Ok(CursorSpecification::new(
            response.cursor,
            self.options.as_ref().and_then(|opts| opts.batch_size),
            self.options.as_ref().and_then(|opts| opts.max_time),
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
    use super::*;

    #[test]
    fn build_targets_the_collection_database() {
        let ns = Namespace::new("db", "coll");
        let mut list_indexes = ListIndexes::new(ns, None);

        let command = list_indexes.build(&StreamDescription::initial()).unwrap();
        assert_eq!(command.target_db, "db");
        assert_eq!(command.body.get_str(ListIndexes::NAME).unwrap(), "coll");
    }

    #[test]
    fn oversized_batch_size_is_rejected() {
        let ns = Namespace::new("db", "coll");
        let options = Options {
            batch_size: Some(u32::MAX),
            ..Default::default()
        };
        let mut list_indexes = ListIndexes::new(ns, Some(options));

        let result = list_indexes.build(&StreamDescription::initial());
        assert!(result.is_err());
    }
}
