//! JSON-document expression language for integration tests.
//!
//! `items.sku` style names address one field of every element of the
//! `items` array; `Item` nodes read the element selected by the bound
//! current index.

use hitgroup_core::{
    expr::{
        CurrentIndex, EvaluationError, Expression, ExpressionNode, NodeOperation, NodePredicate,
    },
    value::{HitRank, ResultShape, ResultValue},
};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum JsonExpr {
    /// Top-level field.
    Path(String),
    /// Field of every element of an array of objects.
    Each(String),
    /// Field of the current element of an array of objects.
    Item {
        name: String,
        #[serde(skip)]
        index: Option<CurrentIndex>,
    },
    Count,
    Sum(Box<Self>),
}

pub fn path(name: &str) -> JsonExpr {
    JsonExpr::Path(name.to_string())
}

pub fn each(name: &str) -> JsonExpr {
    JsonExpr::Each(name.to_string())
}

pub fn item(name: &str) -> JsonExpr {
    JsonExpr::Item {
        name: name.to_string(),
        index: None,
    }
}

pub fn sum(inner: JsonExpr) -> JsonExpr {
    JsonExpr::Sum(Box::new(inner))
}

pub fn to_value(json: &Json) -> ResultValue {
    match json {
        Json::Null | Json::Object(_) => ResultValue::Null,
        Json::Bool(v) => ResultValue::Bool(*v),
        Json::Number(n) => n
            .as_i64()
            .map_or_else(|| ResultValue::Float(n.as_f64().unwrap_or_default()), ResultValue::Int),
        Json::String(s) => ResultValue::Text(s.clone()),
        Json::Array(items) => ResultValue::Vector(items.iter().map(to_value).collect()),
    }
}

fn split(name: &str) -> Result<(&str, &str), EvaluationError> {
    name.rsplit_once('.')
        .ok_or_else(|| EvaluationError::new(format!("'{name}' is not struct-qualified")))
}

fn elements<'a>(doc: &'a Json, array: &str) -> &'a [Json] {
    doc.get(array).and_then(Json::as_array).map_or(&[][..], Vec::as_slice)
}

impl Expression for JsonExpr {
    type Document = Json;

    fn result_shape(&self) -> ResultShape {
        match self {
            Self::Each(_) => ResultShape::Vector,
            _ => ResultShape::Scalar,
        }
    }

    fn evaluate(&self, doc: &Json, rank: HitRank) -> Result<ResultValue, EvaluationError> {
        match self {
            Self::Path(name) => Ok(doc.get(name).map(to_value).unwrap_or_default()),
            Self::Each(name) => {
                let (array, field) = split(name)?;
                Ok(ResultValue::Vector(
                    elements(doc, array)
                        .iter()
                        .map(|element| element.get(field).map(to_value).unwrap_or_default())
                        .collect(),
                ))
            }
            Self::Item { name, index } => {
                let (array, field) = split(name)?;
                let index = index
                    .as_ref()
                    .ok_or_else(|| EvaluationError::new(format!("'{name}' is not bound")))?;
                Ok(elements(doc, array)
                    .get(index.get())
                    .and_then(|element| element.get(field))
                    .map(to_value)
                    .unwrap_or_default())
            }
            Self::Count => Ok(ResultValue::Int(1)),
            Self::Sum(inner) => inner.evaluate(doc, rank),
        }
    }

    fn select(&mut self, predicate: &dyn NodePredicate, operation: &mut dyn NodeOperation) {
        if let Self::Sum(inner) = self {
            inner.select(predicate, operation);
        }
        if predicate.check(&*self) {
            operation.execute(self);
        }
    }

    fn collect(
        &self,
        state: &mut ResultValue,
        doc: &Json,
        rank: HitRank,
    ) -> Result<(), EvaluationError> {
        let value = match self {
            Self::Count => ResultValue::Int(1),
            Self::Sum(inner) => inner.evaluate(doc, rank)?,
            _ => {
                *state = self.evaluate(doc, rank)?;
                return Ok(());
            }
        };
        *state = match (std::mem::take(state), value) {
            (ResultValue::Null, value) => value,
            (ResultValue::Int(a), ResultValue::Int(b)) => ResultValue::Int(a + b),
            (s, v) => {
                return Err(EvaluationError::new(format!(
                    "cannot add {} to {}",
                    v.label(),
                    s.label()
                )));
            }
        };

        Ok(())
    }
}

impl ExpressionNode for JsonExpr {
    fn indexed_field(&self) -> Option<&str> {
        match self {
            Self::Each(name) | Self::Item { name, .. } => Some(name),
            _ => None,
        }
    }

    fn attach_current_index(&mut self, slot: CurrentIndex) {
        if let Self::Item { index, .. } = self {
            *index = Some(slot);
        }
    }
}
