use bson::{rawdoc, Document, RawArrayBuf};
use serde::Serialize;

use crate::{
    cmap::{Command, RawCommandResponse, StreamDescription},
    error::{ErrorKind, Result},
    index::IndexModel,
    operation::{append_options_to_raw_document, Operation, WriteConcernOnlyBody},
    options::WriteConcern,
    results::CreateIndexesResult,
    serde_util,
    Namespace,
};

/// The server's minimum wire version for the `commitQuorum` option on `createIndexes`.
const SERVER_4_4_0_WIRE_VERSION: i32 = 9;

/// Options for a `createIndexes` command (spec §4.7's `createIndexes` row).
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Options {
    pub(crate) commit_quorum: Option<Document>,

    #[serde(skip_serializing)]
    pub(crate) write_concern: Option<WriteConcern>,
}

#[derive(Debug)]
pub(crate) struct CreateIndexes {
    ns: Namespace,
    indexes: Vec<IndexModel>,
    options: Option<Options>,
}

impl CreateIndexes {
    pub(crate) fn new(ns: Namespace, indexes: Vec<IndexModel>, options: Option<Options>) -> Self {
        Self {
            ns,
            indexes,
            options,
        }
    }
}

impl Operation for CreateIndexes {
    type O = CreateIndexesResult;

    const NAME: &'static str = "createIndexes";

    fn build(&mut self, description: &StreamDescription) -> Result<Command> {
        if !description.supports_wire_version(SERVER_4_4_0_WIRE_VERSION)
            && self
                .options
                .as_ref()
                .is_some_and(|options| options.commit_quorum.is_some())
        {
            return Err(ErrorKind::InvalidArgument {
                message: "specifying a commit quorum to createIndexes is not supported on \
                          server versions < 4.4"
                    .to_string(),
            }
            .into());
        }

        self.indexes.iter_mut().for_each(|i| i.update_name());

        let mut indexes = RawArrayBuf::new();
        for index in &self.indexes {
            indexes.push(serde_util::to_raw_document_buf_with_options(index, false)?);
        }

        let mut body = rawdoc! {
            Self::NAME: self.ns.coll.clone(),
            "indexes": indexes,
        };

        append_options_to_raw_document(&mut body, self.options.as_ref())?;

        Ok(Command::new(self.ns.db.clone(), body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        let response: WriteConcernOnlyBody = response.body()?;
        response.validate()?;
        let index_names = self.indexes.iter().filter_map(|i| i.get_name()).collect();
        Ok(CreateIndexesResult { index_names })
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.options
            .as_ref()
            .and_then(|opts| opts.write_concern.as_ref())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn commit_quorum_is_rejected_below_4_4() {
        let ns = Namespace::new("db", "coll");
        let options = Options {
            commit_quorum: Some(bson::doc! { "w": "majority" }),
            write_concern: None,
        };
        let mut create_indexes = CreateIndexes::new(ns, vec![], Some(options));

        let mut description = StreamDescription::initial();
        description.max_wire_version = Some(SERVER_4_4_0_WIRE_VERSION - 1);

        assert!(create_indexes.build(&description).is_err());
    }

    #[test]
    fn unnamed_indexes_get_generated_names() {
        let ns = Namespace::new("db", "coll");
        let index = IndexModel::builder()
            .keys(bson::doc! { "a": 1 })
            .build();
        let mut create_indexes = CreateIndexes::new(ns, vec![index], None);

        create_indexes
            .build(&StreamDescription::initial())
            .unwrap();
        assert_eq!(create_indexes.indexes[0].get_name(), Some("a_1".to_string()));
    }
}
