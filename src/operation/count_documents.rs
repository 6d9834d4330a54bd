use std::{convert::TryInto, time::Duration};

use bson::{doc, Document};
use serde::Deserialize;

use crate::{
    cmap::{Command, RawCommandResponse, StreamDescription},
    error::{Error, ErrorKind, Result},
    operation::{aggregate, aggregate::Aggregate, Operation, Retryability, SingleCursorResult},
    options::{Collation, ReadConcern, SelectionCriteria},
    Namespace,
};

/// Options for a `countDocuments` helper, built on top of `aggregate` (spec §4.7's `count` row,
/// implemented via `$match`/`$skip`/`$limit`/`$group` rather than the deprecated `count` command
/// when an exact rather than estimated count is needed).
#[derive(Clone, Debug, Default)]
pub(crate) struct Options {
    pub(crate) skip: Option<u64>,
    pub(crate) limit: Option<u64>,
    pub(crate) max_time: Option<Duration>,
    pub(crate) collation: Option<Collation>,
    pub(crate) read_concern: Option<ReadConcern>,
    pub(crate) selection_criteria: Option<SelectionCriteria>,
}

pub(crate) struct CountDocuments {
    aggregate: Aggregate,
}

impl CountDocuments {
    pub(crate) fn new(
        namespace: Namespace,
        filter: Document,
        options: Option<Options>,
    ) -> Result<Self> {
        let mut pipeline = vec![doc! {
            "$match": filter,
        }];

        if let Some(skip) = options.as_ref().and_then(|opts| opts.skip) {
            let s: i64 = skip.try_into().map_err(|_| {
                Error::from(ErrorKind::InvalidArgument {
                    message: format!("skip exceeds range of i64: {}", skip),
                })
            })?;
            pipeline.push(doc! {
                "$skip": s
            });
        }

        if let Some(limit) = options.as_ref().and_then(|opts| opts.limit) {
            let l: i64 = limit.try_into().map_err(|_| {
                Error::from(ErrorKind::InvalidArgument {
                    message: format!("limit exceeds range of i64: {}", limit),
                })
            })?;
            pipeline.push(doc! {
                "$limit": l
            });
        }

        pipeline.push(doc! {
            "$group": {
                "_id": 1,
                "n": { "$sum": 1 },
            }
        });

        let aggregate_options = options.map(|opts| aggregate::Options {
            max_time: opts.max_time,
            collation: opts.collation,
            read_concern: opts.read_concern,
            selection_criteria: opts.selection_criteria,
            ..Default::default()
        });

        Ok(Self {
            aggregate: Aggregate::new(namespace, pipeline, aggregate_options),
        })
    }
}

impl Operation for CountDocuments {
    type O = u64;

    const NAME: &'static str = Aggregate::NAME;

    fn build(&mut self, description: &StreamDescription) -> Result<Command> {
        self.aggregate.build(description)
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        let response: SingleCursorResult<Body> = response.body()?;
        Ok(response.0.map(|r| r.n).unwrap_or(0))
    }

    fn selection_criteria(&self) -> Option<&SelectionCriteria> {
        self.aggregate.selection_criteria()
    }

    fn retryability(&self) -> Retryability {
        Retryability::Read
    }

    fn supports_read_concern(&self, description: &StreamDescription) -> bool {
        self.aggregate.supports_read_concern(description)
    }
}

#[derive(Debug, Deserialize)]
struct Body {
    n: u64,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn skip_and_limit_are_appended_to_the_pipeline() {
        let ns = Namespace::new("db", "coll");
        let options = Options {
            skip: Some(5),
            limit: Some(10),
            ..Default::default()
        };
        let mut count_documents =
            CountDocuments::new(ns, doc! { "a": 1 }, Some(options)).unwrap();

        let command = count_documents.build(&StreamDescription::initial()).unwrap();
        let pipeline = command.body.get_array("pipeline").unwrap();
        assert_eq!(pipeline.into_iter().count(), 4);
    }
}
