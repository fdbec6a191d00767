//! Module: expr
//! Responsibility: the evaluator boundary consumed by grouping levels.
//! Does not own: expression semantics (sum, count, terms, ...).
//! Boundary: classify/filter/collect are opaque `Expression` values reached
//! only through evaluation and the `select` traversal hook.

mod current_index;


pub use current_index::{CurrentIndex, CurrentIndexSetup, IndexResolution, Usage};

use crate::{
    value::{HitRank, ResultShape, ResultValue},
    visitor::ObjectVisitor,
};
use std::fmt;
use thiserror::Error as ThisError;

///
/// EvaluationError
///
/// Failure reported by the external evaluator. Never retried or recovered by
/// the engine; it aborts the current aggregation pass.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("{message}")]
pub struct EvaluationError {
    message: String,
}

impl EvaluationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

///
/// ExpressionNode
///
/// One node of an evaluator expression tree as seen by the name-binding
/// traversal. Nodes that read one element of a multi-valued struct field
/// expose its qualified name (`struct.field`) and accept a current-index slot.
///

pub trait ExpressionNode {
    /// Qualified field name read per element, if this node reads one.
    fn indexed_field(&self) -> Option<&str> {
        None
    }

    /// Attach the slot the engine writes while iterating the owning struct.
    fn attach_current_index(&mut self, _index: CurrentIndex) {}
}

///
/// NodePredicate
///
/// Selects the nodes a traversal operation is applied to.
///

pub trait NodePredicate {
    fn check(&self, node: &dyn ExpressionNode) -> bool;
}

///
/// NodeOperation
///

pub trait NodeOperation {
    fn execute(&mut self, node: &mut dyn ExpressionNode);
}

///
/// Expression
///
/// Evaluator-owned expression used for classify, filter and collect.
///
/// `select` must visit every node reachable from the root. It is used purely
/// for name binding and must not evaluate anything.
///

pub trait Expression: fmt::Debug {
    type Document: ?Sized;

    /// Result shape declared before evaluation.
    fn result_shape(&self) -> ResultShape;

    /// Evaluate against one matched document.
    fn evaluate(&self, doc: &Self::Document, rank: HitRank)
    -> Result<ResultValue, EvaluationError>;

    /// Traverse every node, applying `operation` where `predicate` holds.
    fn select(&mut self, predicate: &dyn NodePredicate, operation: &mut dyn NodeOperation);

    /// Filter admission for one document.
    fn allow(&self, doc: &Self::Document, rank: HitRank) -> Result<bool, EvaluationError> {
        Ok(self.evaluate(doc, rank)?.is_truthy())
    }

    /// Fold one admitted document into a group aggregate state.
    ///
    /// The default keeps the latest evaluated value; aggregating evaluators
    /// override this with their own reduction.
    fn collect(
        &self,
        state: &mut ResultValue,
        doc: &Self::Document,
        rank: HitRank,
    ) -> Result<(), EvaluationError> {
        *state = self.evaluate(doc, rank)?;
        Ok(())
    }

    /// Expose this expression's members to a diagnostic visitor.
    fn visit_members(&self, visitor: &mut dyn ObjectVisitor) {
        visitor.visit_string("expression", &format!("{self:?}"));
    }
}

///
/// IndexedFieldPredicate
///
/// Matches every node that reads a struct-qualified field.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct IndexedFieldPredicate;

impl NodePredicate for IndexedFieldPredicate {
    fn check(&self, node: &dyn ExpressionNode) -> bool {
        node.indexed_field().is_some()
    }
}
