//! Options for opening a change stream (spec §4.6).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::{
    bson::Timestamp,
    change_stream::event::ResumeToken,
    operation::aggregate,
    options::{Collation, ReadConcern, SelectionCriteria},
};

/// The options that configure a change stream (the `$changeStream` aggregation stage plus the
/// wrapping `aggregate` command's own options).
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChangeStreamOptions {
    pub(crate) full_document: Option<FullDocumentType>,

    pub(crate) full_document_before_change: Option<FullDocumentBeforeChangeType>,

    /// Mutually exclusive with `start_after` (spec §4.6).
    pub(crate) resume_after: Option<ResumeToken>,

    pub(crate) start_at_operation_time: Option<Timestamp>,

    /// Mutually exclusive with `resume_after` (spec §4.6).
    pub(crate) start_after: Option<ResumeToken>,

    pub(crate) show_expanded_events: Option<bool>,

    #[serde(skip_serializing)]
    pub(crate) max_await_time: Option<Duration>,

    #[serde(skip_serializing)]
    pub(crate) batch_size: Option<u32>,

    #[serde(skip_serializing)]
    pub(crate) collation: Option<Collation>,

    #[serde(skip_serializing)]
    pub(crate) read_concern: Option<ReadConcern>,

    #[serde(skip_serializing)]
    pub(crate) selection_criteria: Option<SelectionCriteria>,

    /// Surfaces on the wrapping `aggregate` command, not the `$changeStream` stage itself.
    #[serde(skip_serializing)]
    pub(crate) comment: Option<String>,
}

impl ChangeStreamOptions {
    pub(crate) fn aggregate_options(&self) -> aggregate::Options {
        aggregate::Options {
            batch_size: self.batch_size,
            collation: self.collation.clone(),
            max_await_time: self.max_await_time,
            read_concern: self.read_concern.clone(),
            selection_criteria: self.selection_criteria.clone(),
            comment: self.comment.clone(),
            ..Default::default()
        }
    }
}

/// Configures how a delivered event's `full_document` field is populated.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum FullDocumentType {
    UpdateLookup,
    WhenAvailable,
    Required,
    Other(String),
}

/// Configures how a delivered event's `full_document_before_change` field is populated.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum FullDocumentBeforeChangeType {
    WhenAvailable,
    Required,
    Off,
    Other(String),
}
