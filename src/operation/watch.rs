use bson::{doc, Document};

use crate::{
    change_stream::options::ChangeStreamOptions,
    cmap::{Command, RawCommandResponse, StreamDescription},
    cursor::CursorSpecification,
    error::Result,
    operation::{
        aggregate::{Aggregate, AggregateTarget},
        Operation,
        Retryability,
    },
    options::{SelectionCriteria, WriteConcern},
    Namespace,
};

/// What a change stream watches: a single collection, every collection in a database, or the
/// whole deployment (spec §4.6).
#[derive(Clone, Debug)]
pub(crate) enum ChangeStreamTarget {
    Collection(Namespace),
    Database(String),
    Cluster(String),
}

impl From<Namespace> for ChangeStreamTarget {
    fn from(ns: Namespace) -> Self {
        ChangeStreamTarget::Collection(ns)
    }
}

/// Opens a change stream by issuing an `aggregate` command with a `$changeStream` stage prepended
/// to the caller's pipeline (spec §4.6). Delegates command-building and response-handling to the
/// `Aggregate` operation it wraps.
#[derive(Debug)]
pub(crate) struct Watch {
    aggregate: Aggregate,
}

impl Watch {
    pub(crate) fn new(
        target: ChangeStreamTarget,
        pipeline: Vec<Document>,
        options: Option<ChangeStreamOptions>,
    ) -> Result<Self> {
        let mut stage = bson::to_document(&options.clone().unwrap_or_default())?;

        let aggregate_target = match &target {
            ChangeStreamTarget::Collection(ns) => AggregateTarget::Collection(ns.clone()),
            ChangeStreamTarget::Database(db) => AggregateTarget::Database(db.clone()),
            ChangeStreamTarget::Cluster(db) => {
                stage.insert("allChangesForCluster", true);
                AggregateTarget::Database(db.clone())
            }
        };

        let mut full_pipeline = vec![doc! { "$changeStream": stage }];
        full_pipeline.extend(pipeline);

        let aggregate_options = options.map(|opts| opts.aggregate_options());
        Ok(Self {
            aggregate: Aggregate::new(aggregate_target, full_pipeline, aggregate_options),
        })
    }
}

impl Operation for Watch {
    type O = CursorSpecification;

    // The aggregate command this builds already carries its own name; this one is never sent.
    const NAME: &'static str = "aggregate";

    fn build(&mut self, description: &StreamDescription) -> Result<Command> {
        self.aggregate.build(description)
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        description: &StreamDescription,
    ) -> Result<Self::O> {
        self.aggregate.handle_response(response, description)
    }

    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        self.aggregate.selection_criteria()
    }

    fn supports_read_concern(&self, description: &StreamDescription) -> bool {
        self.aggregate.supports_read_concern(description)
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.aggregate.write_concern()
    }

    fn retryability(&self) -> Retryability {
        Retryability::Read
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn build_prepends_change_stream_stage() {
        let ns = Namespace::new("db", "coll");
        let mut watch = Watch::new(ns.into(), vec![], None).unwrap();

        let command = watch.build(&StreamDescription::initial()).unwrap();
        let pipeline = command.body.get_array("pipeline").unwrap();
        let first = pipeline.into_iter().next().unwrap().unwrap();
        assert!(first.as_document().unwrap().get("$changeStream").unwrap().is_some());
    }

    #[test]
    fn cluster_target_sets_all_changes_for_cluster() {
        let target = ChangeStreamTarget::Cluster("admin".to_string());
        let mut watch = Watch::new(target, vec![], None).unwrap();

        let command = watch.build(&StreamDescription::initial()).unwrap();
        assert_eq!(command.target_db, "admin");
        let pipeline = command.body.get_array("pipeline").unwrap();
        let first = pipeline.into_iter().next().unwrap().unwrap();
        let stage = first
            .as_document()
            .unwrap()
            .get_document("$changeStream")
            .unwrap()
            .unwrap();
        assert!(stage.get_bool("allChangesForCluster").unwrap());
    }
}
