//! Operation dispatch, bulk-write batching, result cursors, and resume/retry orchestration for a
//! MongoDB wire-protocol driver.
//!
//! This crate owns the layer between a driver's public collection/database API and its
//! connection pool: it turns typed requests into wire commands, sends them through a connection
//! acquired from a [`binding`], classifies replies and transport failures into a single
//! [`error::Error`] taxonomy, and drives the stateful protocols (batch cursors, bulk write
//! batching, change stream resume) that a single request/response round trip can't express.
#![warn(missing_docs)]
#![warn(clippy::cast_possible_truncation)]
#![warn(clippy::cast_possible_wrap)]

pub mod options;

pub use ::bson;

pub mod binding;
mod bson_util;
pub mod bulk_write;
pub mod change_stream;
mod client;
pub mod cmap;
mod collation;
mod concern;
mod cursor;
pub mod error;
mod index;
mod namespace;
mod operation;
pub mod results;
mod sdam;
mod selection_criteria;
mod serde_util;

pub use crate::{client::Client, namespace::Namespace};

pub use index::IndexModel;
