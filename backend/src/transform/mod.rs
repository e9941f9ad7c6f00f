//! Transformation module.
//!
//! This module handles table transforms:
//! - Operations: the `Transform` enum and its implementations
//! - Convert / Aggregate: type casts and group-aggregate
//! - Formula: sandboxed `name = expression` columns
//! - Pipeline: replayable scripts of transforms and drop/restore edits

pub mod aggregate;
pub mod convert;
pub mod formula;
pub mod operations;
pub mod pipeline;

pub use aggregate::{group_aggregate, Aggregate};
pub use convert::{convert_cell, convert_column, parse_timestamp};
pub use formula::{apply_formula, Formula};
pub use operations::{
    deduplicate, drop_missing, fill_missing, filter, rename, set_index, sort,
    transforms_description, Transform,
};
pub use pipeline::{example_script, Script, Step};
