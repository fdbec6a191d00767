//! Minimal expression language used by unit tests.

use crate::{
    expr::{CurrentIndex, EvaluationError, Expression, ExpressionNode, NodeOperation, NodePredicate},
    value::{HitRank, ResultShape, ResultValue},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

///
/// TestDoc
///

#[derive(Clone, Debug, Default)]
pub(crate) struct TestDoc {
    fields: BTreeMap<String, ResultValue>,
    arrays: BTreeMap<String, Vec<ResultValue>>,
}

impl TestDoc {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn field(mut self, name: &str, value: impl Into<ResultValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub(crate) fn array<T: Into<ResultValue>>(mut self, name: &str, values: Vec<T>) -> Self {
        self.arrays
            .insert(name.to_string(), values.into_iter().map(Into::into).collect());
        self
    }
}

///
/// IndexProbe
///
/// Records every current-index value observed at evaluation time.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub(crate) struct IndexProbe {
    field: String,
    #[serde(skip)]
    index: Option<CurrentIndex>,
    #[serde(skip)]
    seen: Arc<Mutex<Vec<usize>>>,
}

impl IndexProbe {
    pub(crate) fn seen(&self) -> Vec<usize> {
        self.seen.lock().unwrap().clone()
    }
}

impl PartialEq for IndexProbe {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field
    }
}

///
/// TestExpr
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub(crate) enum TestExpr {
    Const(ResultValue),
    Field(String),
    Array(String),
    Element {
        field: String,
        #[serde(skip)]
        index: Option<CurrentIndex>,
    },
    Probe(IndexProbe),
    Rank,
    Count,
    Sum(Box<Self>),
    Eq(Box<Self>, Box<Self>),
    Fail(String),
}

pub(crate) fn field(name: &str) -> TestExpr {
    TestExpr::Field(name.to_string())
}

pub(crate) fn array(name: &str) -> TestExpr {
    TestExpr::Array(name.to_string())
}

pub(crate) fn element(name: &str) -> TestExpr {
    TestExpr::Element {
        field: name.to_string(),
        index: None,
    }
}

pub(crate) fn probe(name: &str) -> (TestExpr, IndexProbe) {
    let probe = IndexProbe {
        field: name.to_string(),
        ..IndexProbe::default()
    };
    (TestExpr::Probe(probe.clone()), probe)
}

pub(crate) const fn count() -> TestExpr {
    TestExpr::Count
}

pub(crate) fn sum(inner: TestExpr) -> TestExpr {
    TestExpr::Sum(Box::new(inner))
}

pub(crate) fn eq(left: TestExpr, right: impl Into<ResultValue>) -> TestExpr {
    TestExpr::Eq(Box::new(left), Box::new(TestExpr::Const(right.into())))
}

impl TestExpr {
    // Bound slot of an element-reading node, for assertions.
    pub(crate) const fn attached_index(&self) -> Option<&CurrentIndex> {
        match self {
            Self::Element { index, .. } => index.as_ref(),
            Self::Probe(probe) => probe.index.as_ref(),
            _ => None,
        }
    }
}

fn add(state: &ResultValue, value: &ResultValue) -> Result<ResultValue, EvaluationError> {
    match (state, value) {
        (ResultValue::Null, v) => Ok(v.clone()),
        (ResultValue::Int(a), ResultValue::Int(b)) => Ok(ResultValue::Int(a + b)),
        (ResultValue::Float(a), ResultValue::Float(b)) => Ok(ResultValue::Float(a + b)),
        (s, v) => Err(EvaluationError::new(format!(
            "cannot sum {} into {}",
            v.label(),
            s.label()
        ))),
    }
}

impl Expression for TestExpr {
    type Document = TestDoc;

    fn result_shape(&self) -> ResultShape {
        match self {
            Self::Array(_) => ResultShape::Vector,
            Self::Const(value) => value.shape(),
            _ => ResultShape::Scalar,
        }
    }

    fn evaluate(&self, doc: &TestDoc, rank: HitRank) -> Result<ResultValue, EvaluationError> {
        match self {
            Self::Const(value) => Ok(value.clone()),
            Self::Field(name) => Ok(doc.fields.get(name).cloned().unwrap_or_default()),
            Self::Array(name) => Ok(ResultValue::Vector(
                doc.arrays.get(name).cloned().unwrap_or_default(),
            )),
            Self::Element { field, index } => {
                let index = index.as_ref().ok_or_else(|| {
                    EvaluationError::new(format!("'{field}' has no current index"))
                })?;
                Ok(doc
                    .arrays
                    .get(field)
                    .and_then(|values| values.get(index.get()))
                    .cloned()
                    .unwrap_or_default())
            }
            Self::Probe(probe) => {
                if let Some(index) = &probe.index {
                    probe.seen.lock().unwrap().push(index.get());
                }
                Ok(ResultValue::Bool(true))
            }
            Self::Rank => Ok(ResultValue::Float(rank)),
            Self::Count => Ok(ResultValue::Int(1)),
            Self::Sum(inner) => inner.evaluate(doc, rank),
            Self::Eq(left, right) => Ok(ResultValue::Bool(
                left.evaluate(doc, rank)? == right.evaluate(doc, rank)?,
            )),
            Self::Fail(message) => Err(EvaluationError::new(message.clone())),
        }
    }

    fn select(&mut self, predicate: &dyn NodePredicate, operation: &mut dyn NodeOperation) {
        match self {
            Self::Sum(inner) => inner.select(predicate, operation),
            Self::Eq(left, right) => {
                left.select(predicate, operation);
                right.select(predicate, operation);
            }
            _ => {}
        }
        if predicate.check(&*self) {
            operation.execute(self);
        }
    }

    fn collect(
        &self,
        state: &mut ResultValue,
        doc: &TestDoc,
        rank: HitRank,
    ) -> Result<(), EvaluationError> {
        match self {
            Self::Count => {
                *state = add(state, &ResultValue::Int(1))?;
            }
            Self::Sum(inner) => {
                let value = inner.evaluate(doc, rank)?;
                *state = add(state, &value)?;
            }
            _ => {
                *state = self.evaluate(doc, rank)?;
            }
        }

        Ok(())
    }
}

impl ExpressionNode for TestExpr {
    fn indexed_field(&self) -> Option<&str> {
        match self {
            Self::Array(field) | Self::Element { field, .. } => Some(field),
            Self::Probe(probe) => Some(&probe.field),
            _ => None,
        }
    }

    fn attach_current_index(&mut self, slot: CurrentIndex) {
        match self {
            Self::Element { index, .. } => *index = Some(slot),
            Self::Probe(probe) => probe.index = Some(slot),
            _ => {}
        }
    }
}
