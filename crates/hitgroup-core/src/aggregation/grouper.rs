//! Module: aggregation::grouper
//! Responsibility: applying one document to one level, for scalar and
//! vector-valued classify keys.
//! Does not own: admission limits (see `group`) or level recursion order
//! (see `pass`).

use crate::{
    aggregation::{Admission, GroupId, pass::AggregationPass},
    error::InternalError,
    expr::Expression,
    value::{HitRank, ResultShape, ResultValue},
};

///
/// Grouper
///
/// Strategy bound to a level at prepare from the classify result shape.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Grouper {
    SingleValue,
    MultiValue,
}

impl Grouper {
    #[must_use]
    pub const fn for_shape(shape: ResultShape) -> Self {
        match shape {
            ResultShape::Scalar => Self::SingleValue,
            ResultShape::Vector => Self::MultiValue,
        }
    }

    /// Route one document, keyed by `key`, below `parent` at `level`.
    pub(super) fn group_doc<X: Expression>(
        self,
        pass: &mut AggregationPass<'_, X>,
        level: usize,
        parent: GroupId,
        key: ResultValue,
        doc: &X::Document,
        rank: HitRank,
    ) -> Result<(), InternalError> {
        match self {
            Self::SingleValue => {
                if matches!(key, ResultValue::Vector(_)) {
                    return Err(InternalError::evaluator_contract(format!(
                        "classify at level {level} declared a scalar result but produced a vector"
                    )));
                }

                group_single_value(pass, level, parent, &key, doc, rank)
            }
            Self::MultiValue => {
                let ResultValue::Vector(keys) = key else {
                    return Err(InternalError::evaluator_contract(format!(
                        "classify at level {level} declared a vector result but produced {}",
                        key.label()
                    )));
                };
                let index = pass.level(level)?.current_index();

                for (i, element) in keys.iter().enumerate() {
                    if let Some(index) = index {
                        index.set(i);
                    }
                    group_single_value(pass, level, parent, element, doc, rank)?;
                }

                Ok(())
            }
        }
    }
}

fn group_single_value<X: Expression>(
    pass: &mut AggregationPass<'_, X>,
    level: usize,
    parent: GroupId,
    key: &ResultValue,
    doc: &X::Document,
    rank: HitRank,
) -> Result<(), InternalError> {
    if let Some(filter) = pass.level(level)?.filter()
        && !filter.allow(doc, rank)?
    {
        return Ok(());
    }

    match pass.group_single(level, parent, key, doc, rank)? {
        Admission::Existing(child) => pass.aggregate(child, level + 1, doc, rank, false),
        Admission::Created { group, .. } => pass.aggregate(group, level + 1, doc, rank, true),
        Admission::Rejected(_) => Ok(()),
    }
}
