//! Core runtime for hitgroup: grouping levels, grouper strategies, the group
//! tree, current-index binding, and the versioned level wire codec.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod aggregation;
pub mod codec;
pub mod config;
pub mod error;
pub mod expr;
pub mod obs;
pub mod serialize;
pub mod value;
pub mod visitor;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, codecs, sinks, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        aggregation::{GroupRef, Grouping, GroupingLevel},
        expr::{CurrentIndex, Expression, ExpressionNode},
        value::{HitRank, ResultShape, ResultValue},
    };
}
