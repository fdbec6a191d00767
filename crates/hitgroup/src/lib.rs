//! ## Crate layout
//! - `core`: grouping levels, grouper strategies, the group tree,
//!   current-index binding, the level/grouping wire codec and observability.
//!
//! The `prelude` module carries the vocabulary needed to build and run a
//! grouping request against an evaluator.

pub use hitgroup_core as core;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//
// Errors
//

pub use core::error::InternalError as Error;

///
/// Prelude
/// using _ brings traits into scope and avoids name conflicts
///

pub mod prelude {
    pub use crate::core::{
        aggregation::{GroupRef, Grouping, GroupingLevel},
        config::{GroupingConfig, PrunePolicy},
        expr::{CurrentIndex, EvaluationError, Expression, ExpressionNode as _},
        value::{HitRank, ResultShape, ResultValue},
        visitor::Visitable as _,
    };
    pub use serde::{Deserialize, Serialize};
}
