//! Module: aggregation
//! Responsibility: routing documents through grouping levels into the group
//! tree, and pruning that tree to the requested limits.
//! Does not own: expression semantics or merging results across nodes.
//! Boundary: `Grouping` is the only entrypoint that mutates a tree.

mod group;
mod grouper;
mod grouping;
mod level;
mod pass;

#[cfg(test)]
mod tests;

pub use group::{Admission, GroupId, GroupRef, GroupTree, RejectReason};
pub use grouper::Grouper;
pub use grouping::Grouping;
pub use level::{GroupingLevel, LevelWindow};

pub(crate) use group::AdmissionPolicy;
