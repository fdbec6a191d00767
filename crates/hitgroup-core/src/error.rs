use crate::{codec::FormatError, expr::EvaluationError};
use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Every failure that aborts a grouping pass or a decode surfaces as one of
/// these; capacity rejections never do.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    /// The variant (if present) must correspond to `class`.
    pub detail: Option<ErrorDetail>,
}

impl InternalError {
    /// Construct an InternalError without structured detail.
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    /// Construct a configuration error carrying its structured detail.
    pub(crate) fn configuration(origin: ErrorOrigin, err: ConfigurationError) -> Self {
        Self {
            class: ErrorClass::Configuration,
            origin,
            message: err.to_string(),
            detail: Some(ErrorDetail::Configuration(err)),
        }
    }

    /// Construct a level-origin invariant violation.
    pub(crate) fn level_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Level,
            message.into(),
        )
    }

    /// Construct a group-tree invariant violation.
    pub(crate) fn group_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Group,
            message.into(),
        )
    }

    /// Construct an evaluator contract violation detected by the engine.
    pub(crate) fn evaluator_contract(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::Evaluation,
            ErrorOrigin::Evaluator,
            message.into(),
        )
    }

    /// Construct a serialize-origin internal error.
    pub(crate) fn serialize_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Serialize, message.into())
    }

    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self.class, ErrorClass::Configuration)
    }

    #[must_use]
    pub const fn is_evaluation(&self) -> bool {
        matches!(self.class, ErrorClass::Evaluation)
    }

    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self.class, ErrorClass::Corruption)
    }

    /// Borrow the configuration detail, if this error carries one.
    #[must_use]
    pub const fn configuration_detail(&self) -> Option<&ConfigurationError> {
        match &self.detail {
            Some(ErrorDetail::Configuration(err)) => Some(err),
            _ => None,
        }
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

impl From<EvaluationError> for InternalError {
    fn from(err: EvaluationError) -> Self {
        Self {
            class: ErrorClass::Evaluation,
            origin: ErrorOrigin::Evaluator,
            message: format!("expression evaluation failed: {err}"),
            detail: Some(ErrorDetail::Evaluation(err)),
        }
    }
}

impl From<FormatError> for InternalError {
    fn from(err: FormatError) -> Self {
        Self {
            class: ErrorClass::Corruption,
            origin: ErrorOrigin::Codec,
            message: format!("wire decode failed: {err}"),
            detail: Some(ErrorDetail::Format(err)),
        }
    }
}

///
/// ErrorDetail
///
/// Structured, class-specific error detail carried by [`InternalError`].
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("{0}")]
    Configuration(ConfigurationError),

    #[error("{0}")]
    Evaluation(EvaluationError),

    #[error("{0}")]
    Format(FormatError),
}

///
/// ConfigurationError
///
/// Request-shape failures detected at prepare time, before any document is
/// routed through the grouping.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ConfigurationError {
    #[error(
        "classify expression at level {level} references more than one unbound \
         current-index name: {names:?}"
    )]
    AmbiguousCurrentIndex { level: usize, names: Vec<String> },

    #[error("current-index name '{name}' is already bound by an outer level")]
    CurrentIndexAlreadyBound { name: String },

    #[error("invalid level window: first {first}, last {last}, levels {levels}")]
    InvalidLevelWindow {
        first: usize,
        last: usize,
        levels: usize,
    },

    #[error("grouping must be prepared before aggregating documents")]
    NotPrepared,
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Configuration,
    Evaluation,
    Corruption,
    Internal,
    InvariantViolation,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Configuration => "configuration",
            Self::Evaluation => "evaluation",
            Self::Corruption => "corruption",
            Self::Internal => "internal",
            Self::InvariantViolation => "invariant_violation",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Prepare,
    Level,
    Group,
    Evaluator,
    Codec,
    Serialize,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Prepare => "prepare",
            Self::Level => "level",
            Self::Group => "group",
            Self::Evaluator => "evaluator",
            Self::Codec => "codec",
            Self::Serialize => "serialize",
        };
        write!(f, "{label}")
    }
}

///
/// TESTS
///
