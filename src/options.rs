//! Shared option types operations and bindings are built against: read/write concern, read
//! preference/selection criteria, collation, and server addressing.
//!
//! Most per-operation option structs live alongside the operation they configure in
//! `operation::<name>::Options`; this module re-exports the cross-cutting types every operation
//! shares.

pub use crate::{
    collation::Collation,
    concern::{Acknowledgment, ReadConcern, WriteConcern},
    sdam::ServerAddress,
    selection_criteria::{ReadPreference, SelectionCriteria, TagSet},
};
