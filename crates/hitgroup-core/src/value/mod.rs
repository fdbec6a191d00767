mod compare;


use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// re-exports
pub use compare::canonical_cmp;

///
/// HitRank
///
/// Relevance score attached to every matched document.
///

pub type HitRank = f64;

///
/// ResultShape
///
/// Declared result shape of an expression, known before any document is
/// evaluated. Drives grouper selection at prepare time.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResultShape {
    Scalar,
    Vector,
}

///
/// ResultValue
///
/// Typed value produced by the evaluator for classify, filter and collect
/// expressions. Equality and ordering are canonical (see [`canonical_cmp`]) so
/// values can key group children directly.
///
/// Null   → the expression produced no value for this document.
/// Vector → one value per element of a multi-valued field.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub enum ResultValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Raw(Vec<u8>),
    Vector(Vec<Self>),
}

impl ResultValue {
    /// Shape of this concrete value.
    #[must_use]
    pub const fn shape(&self) -> ResultShape {
        match self {
            Self::Vector(_) => ResultShape::Vector,
            _ => ResultShape::Scalar,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Admission truthiness used by default filter evaluation.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(v) => *v,
            Self::Int(v) => *v != 0,
            Self::Float(v) => *v != 0.0,
            Self::Text(v) => !v.is_empty(),
            Self::Raw(v) => !v.is_empty(),
            Self::Vector(v) => !v.is_empty(),
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Short variant label for diagnostics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Bool(_) => "Bool",
            Self::Int(_) => "Int",
            Self::Float(_) => "Float",
            Self::Text(_) => "Text",
            Self::Raw(_) => "Raw",
            Self::Vector(_) => "Vector",
        }
    }
}

impl PartialEq for ResultValue {
    fn eq(&self, other: &Self) -> bool {
        canonical_cmp(self, other) == Ordering::Equal
    }
}

impl Eq for ResultValue {}

impl PartialOrd for ResultValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResultValue {
    fn cmp(&self, other: &Self) -> Ordering {
        canonical_cmp(self, other)
    }
}

impl From<bool> for ResultValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ResultValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for ResultValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ResultValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ResultValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<Self>> From<Vec<T>> for ResultValue {
    fn from(items: Vec<T>) -> Self {
        Self::Vector(items.into_iter().map(Into::into).collect())
    }
}
