//! Module: aggregation::level
//! Responsibility: one grouping level's descriptor, its prepare step, and the
//! limits it resolves for admission.
//! Does not own: tree mutation (see `group`) or wire layout (see `codec`).
//! Boundary: exactly one grouper is bound per prepare; nothing rebinds it
//! per document.

use crate::{
    aggregation::{AdmissionPolicy, Grouper},
    config::GroupingConfig,
    error::{ConfigurationError, ErrorOrigin, InternalError},
    expr::{CurrentIndex, CurrentIndexSetup, Expression},
    visitor::{ObjectVisitor, Visitable},
};

///
/// LevelWindow
///
/// Active level range of one pass: levels below `first` are frozen and
/// levels at or above `last` are not grouped.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LevelWindow {
    pub first: usize,
    pub last: usize,
}

impl LevelWindow {
    #[must_use]
    pub const fn new(first: usize, last: usize) -> Self {
        Self { first, last }
    }

    /// Validate against a grouping of `levels` levels.
    pub fn validate(self, levels: usize) -> Result<Self, InternalError> {
        if self.first <= self.last && self.last <= levels {
            Ok(self)
        } else {
            Err(InternalError::configuration(
                ErrorOrigin::Prepare,
                ConfigurationError::InvalidLevelWindow {
                    first: self.first,
                    last: self.last,
                    levels,
                },
            ))
        }
    }
}

///
/// LevelState
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum LevelState {
    #[default]
    Unprepared,
    Bound {
        grouper: Grouper,
        frozen: bool,
    },
}

///
/// GroupingLevel
///
/// Descriptor for one level of a grouping request: limits, the classify
/// expression producing the group key, an optional admission filter, and the
/// collect expression folded into every admitted group.
///

#[derive(Clone, Debug)]
pub struct GroupingLevel<X> {
    pub(crate) max_groups: i64,
    pub(crate) precision: i64,
    pub(crate) is_ordered: bool,
    pub(crate) classify: X,
    pub(crate) filter: Option<X>,
    pub(crate) collect: X,
    current_index: Option<CurrentIndex>,
    state: LevelState,
}

impl<X> GroupingLevel<X> {
    /// Unlimited level with no filter.
    pub const fn new(classify: X, collect: X) -> Self {
        Self {
            max_groups: -1,
            precision: -1,
            is_ordered: false,
            classify,
            filter: None,
            collect,
            current_index: None,
            state: LevelState::Unprepared,
        }
    }

    #[must_use]
    pub const fn with_max_groups(mut self, max_groups: i64) -> Self {
        self.max_groups = max_groups;
        self
    }

    #[must_use]
    pub const fn with_precision(mut self, precision: i64) -> Self {
        self.precision = precision;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: X) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub const fn max_groups(&self) -> i64 {
        self.max_groups
    }

    #[must_use]
    pub const fn precision(&self) -> i64 {
        self.precision
    }

    #[must_use]
    pub const fn is_ordered(&self) -> bool {
        self.is_ordered
    }

    #[must_use]
    pub const fn classify(&self) -> &X {
        &self.classify
    }

    #[must_use]
    pub const fn filter(&self) -> Option<&X> {
        self.filter.as_ref()
    }

    #[must_use]
    pub const fn collect(&self) -> &X {
        &self.collect
    }

    /// Slot bound to the classify expression's free struct name, if any.
    #[must_use]
    pub const fn current_index(&self) -> Option<&CurrentIndex> {
        self.current_index.as_ref()
    }

    #[must_use]
    pub const fn is_prepared(&self) -> bool {
        matches!(self.state, LevelState::Bound { .. })
    }

    /// False until prepared.
    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        matches!(self.state, LevelState::Bound { frozen: true, .. })
    }

    #[must_use]
    pub const fn grouper(&self) -> Option<Grouper> {
        match self.state {
            LevelState::Bound { grouper, .. } => Some(grouper),
            LevelState::Unprepared => None,
        }
    }

    /// Request cap, falling back to the config default; `None` is unlimited.
    #[must_use]
    pub fn effective_max_groups(&self, config: &GroupingConfig) -> Option<usize> {
        limit(self.max_groups).or_else(|| limit(config.default_max_groups))
    }

    /// Candidate window tracked while aggregating.
    #[must_use]
    pub fn candidate_window(&self, config: &GroupingConfig) -> Option<usize> {
        match (limit(self.precision), self.effective_max_groups(config)) {
            (Some(precision), Some(max)) => Some(precision.max(max)),
            (precision, max) => precision.or(max),
        }
    }

    pub(crate) fn admission_policy(
        &self,
        config: &GroupingConfig,
    ) -> Result<AdmissionPolicy, InternalError> {
        let LevelState::Bound { frozen, .. } = self.state else {
            return Err(InternalError::level_invariant(
                "admission requested on an unprepared level",
            ));
        };

        Ok(AdmissionPolicy {
            frozen,
            window: self.candidate_window(config),
            is_ordered: self.is_ordered,
            prune: config.prune_policy,
        })
    }

    pub(crate) fn unprepare(&mut self) {
        self.state = LevelState::Unprepared;
    }
}

impl<X: Expression> GroupingLevel<X> {
    /// Bind the grouper from the classify result shape and compute `frozen`.
    pub fn prepare(&mut self, window: LevelWindow, level: usize, is_ordered: bool) {
        self.is_ordered = is_ordered;
        self.state = LevelState::Bound {
            grouper: Grouper::for_shape(self.classify.result_shape()),
            frozen: level < window.first,
        };
    }

    /// Resolve struct-qualified names in this level's expressions.
    ///
    /// A single free name in classify binds a fresh slot for this level and
    /// becomes visible to inner levels through `setup`. Filter and collect
    /// only attach to existing bindings.
    pub fn wire_current_index(
        &mut self,
        level: usize,
        setup: &mut CurrentIndexSetup,
    ) -> Result<(), InternalError> {
        let usage = setup.analyze(&mut self.classify);
        if usage.len() > 1 {
            return Err(InternalError::configuration(
                ErrorOrigin::Prepare,
                ConfigurationError::AmbiguousCurrentIndex {
                    level,
                    names: usage.unbound_names().map(str::to_string).collect(),
                },
            ));
        }

        self.current_index = None;
        if let Some(name) = usage.single_unbound_name() {
            let index = CurrentIndex::new();
            setup.bind(name, index.clone())?;
            self.current_index = Some(index);
        }

        setup.attach(&mut self.classify);
        if let Some(filter) = &mut self.filter {
            setup.attach(filter);
        }
        setup.attach(&mut self.collect);

        Ok(())
    }
}

impl<X: PartialEq> PartialEq for GroupingLevel<X> {
    fn eq(&self, other: &Self) -> bool {
        self.max_groups == other.max_groups
            && self.precision == other.precision
            && self.classify == other.classify
            && self.filter == other.filter
            && self.collect == other.collect
    }
}

impl<X: Expression> Visitable for GroupingLevel<X> {
    fn type_name(&self) -> &'static str {
        "GroupingLevel"
    }

    fn visit_members(&self, visitor: &mut dyn ObjectVisitor) {
        visitor.visit_int("maxGroups", self.max_groups);
        visitor.visit_int("precision", self.precision);
        visit_expression(visitor, "classify", &self.classify);
        if let Some(filter) = &self.filter {
            visit_expression(visitor, "filter", filter);
        }
        visit_expression(visitor, "collect", &self.collect);
    }
}

pub(super) fn visit_expression<X: Expression + ?Sized>(
    visitor: &mut dyn ObjectVisitor,
    name: &str,
    expr: &X,
) {
    visitor.open_struct(name, "Expression");
    expr.visit_members(visitor);
    visitor.close_struct();
}

// Negative limits are unlimited.
fn limit(value: i64) -> Option<usize> {
    usize::try_from(value).ok()
}
