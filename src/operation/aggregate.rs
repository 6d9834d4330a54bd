use std::time::Duration;

use bson::{Document, RawArrayBuf, RawDocumentBuf};
use serde::Serialize;

use crate::{
    cmap::{Command, RawCommandResponse, StreamDescription},
    cursor::CursorSpecification,
    error::Result,
    operation::{append_options_to_raw_document, CursorBody, Operation, Retryability},
    options::{Collation, ReadConcern, SelectionCriteria, WriteConcern},
    serde_util,
    Namespace,
};

/// Options for an `aggregate` command (spec §4.7's `aggregate` row).
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Options {
    pub(crate) allow_disk_use: Option<bool>,

    pub(crate) batch_size: Option<u32>,

    pub(crate) bypass_document_validation: Option<bool>,

    pub(crate) collation: Option<Collation>,

    pub(crate) comment: Option<String>,

    #[serde(
        rename = "maxTimeMS",
        serialize_with = "serde_util::serialize_duration_option_as_int_millis"
    )]
    pub(crate) max_time: Option<Duration>,

    #[serde(skip_serializing)]
    pub(crate) max_await_time: Option<Duration>,

    #[serde(skip_serializing)]
    pub(crate) read_concern: Option<ReadConcern>,

    #[serde(skip_serializing)]
    pub(crate) selection_criteria: Option<SelectionCriteria>,

    #[serde(skip_serializing)]
    pub(crate) write_concern: Option<WriteConcern>,
}

#[derive(Debug)]
pub(crate) struct Aggregate {
    target: AggregateTarget,
    pipeline: Vec<Document>,
    options: Option<Options>,
}

impl Aggregate {
    pub(crate) fn new(
        target: impl Into<AggregateTarget>,
        pipeline: impl IntoIterator<Item = Document>,
        options: Option<Options>,
    ) -> Self {
        Self {
            target: target.into(),
            pipeline: pipeline.into_iter().collect(),
            options,
        }
    }

    /// Returns whether this is a $out or $merge aggregation operation.
    fn is_out_or_merge(&self) -> bool {
        self.pipeline
            .last()
            .and_then(|stage| stage.keys().next())
            .map(|key| key == "$out" || key == "$merge")
            .unwrap_or(false)
    }
}

impl Operation for Aggregate {
    type O = CursorSpecification;

    const NAME: &'static str = "aggregate";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let mut pipeline = RawArrayBuf::new();
        for stage in &self.pipeline {
            pipeline.push(serde_util::to_raw_document_buf_with_options(stage, false)?);
        }

        let mut body = RawDocumentBuf::new();
        match &self.target {
            AggregateTarget::Database(_) => body.append(Self::NAME, 1_i32),
            AggregateTarget::Collection(ns) => body.append(Self::NAME, ns.coll.clone()),
        }
        body.append("pipeline", pipeline);

        let mut cursor = RawDocumentBuf::new();
        if !self.is_out_or_merge() {
            if let Some(batch_size) = self.options.as_ref().and_then(|o| o.batch_size) {
                cursor.append("batchSize", batch_size as i32);
            }
        }
        body.append("cursor", cursor);

        append_options_to_raw_document(&mut body, self.options.as_ref())?;

        Ok(Command::new(self.target.db_name().to_string(), body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        let cursor_response: CursorBody = response.body()?;

        Ok(CursorSpecification::new(
            cursor_response.cursor,
            self.options.as_ref().and_then(|opts| opts.batch_size),
            self.options.as_ref().and_then(|opts| opts.max_await_time),
        ))
    }

    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        self.options
            .as_ref()
            .and_then(|opts| opts.selection_criteria.as_ref())
    }

    fn supports_read_concern(&self, _description: &StreamDescription) -> bool {
        true
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.options
            .as_ref()
            .and_then(|opts| opts.write_concern.as_ref())
    }

    fn retryability(&self) -> Retryability {
        if self.is_out_or_merge() {
            Retryability::None
        } else {
            Retryability::Read
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) enum AggregateTarget {
    Database(String),
    Collection(Namespace),
}

impl AggregateTarget {
    fn db_name(&self) -> &str {
        match self {
            AggregateTarget::Database(ref s) => s.as_str(),
            AggregateTarget::Collection(ref ns) => ns.db.as_str(),
        }
    }
}

impl From<Namespace> for AggregateTarget {
    fn from(ns: Namespace) -> Self {
        AggregateTarget::Collection(ns)
    }
}

impl From<String> for AggregateTarget {
    fn from(db_name: String) -> Self {
        AggregateTarget::Database(db_name)
    }
}

#[cfg(test)]
mod test {
    use bson::doc;

    use super::*;

    #[test]
    fn out_stage_suppresses_batch_size_and_forces_no_retry() {
        let ns = Namespace::new("db", "coll");
        let pipeline = vec![doc! { "$out": "other" }];
        let options = Options {
            batch_size: Some(5),
            ..Default::default()
        };
        let mut aggregate = Aggregate::new(ns, pipeline, Some(options));

        let command = aggregate.build(&StreamDescription::initial()).unwrap();
        let cursor = command.body.get_document("cursor").unwrap();
        assert!(cursor.get("batchSize").unwrap().is_none());
        assert_eq!(aggregate.retryability(), Retryability::None);
    }

    #[test]
    fn plain_pipeline_is_retryable_read() {
        let ns = Namespace::new("db", "coll");
        let pipeline = vec![doc! { "$match": { "a": 1 } }];
        let aggregate = Aggregate::new(ns, pipeline, None);
        assert_eq!(aggregate.retryability(), Retryability::Read);
    }
}
