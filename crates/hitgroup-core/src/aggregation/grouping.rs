//! Module: aggregation::grouping
//! Responsibility: the grouping request lifecycle (prepare, aggregate,
//! finalize, multi-pass window advance) over one group tree.
//! Does not own: admission rules (see `group`) or per-level strategy
//! (see `grouper`).
//! Boundary: documents enter only through `aggregate`; the tree is exposed
//! read-only.

use crate::{
    aggregation::{
        GroupId, GroupRef, GroupTree, GroupingLevel, LevelWindow, level::visit_expression,
        pass::AggregationPass,
    },
    config::GroupingConfig,
    error::{ConfigurationError, ErrorOrigin, InternalError},
    expr::{CurrentIndexSetup, Expression},
    obs::sink::{MetricsEvent, record},
    value::HitRank,
    visitor::{ObjectVisitor, Visitable, visit},
};

///
/// Grouping
///
/// Ordered grouping levels, the active level window, and the group tree
/// they populate.
///

#[derive(Clone, Debug)]
pub struct Grouping<X> {
    pub(crate) id: u32,
    pub(crate) levels: Vec<GroupingLevel<X>>,
    pub(crate) first_level: usize,
    pub(crate) last_level: usize,
    pub(crate) root_collect: Option<X>,
    pub(crate) config: GroupingConfig,
    tree: GroupTree,
    prepared: bool,
}

impl<X> Grouping<X> {
    /// Grouping over all of `levels` in a single pass.
    #[must_use]
    pub fn new(levels: Vec<GroupingLevel<X>>) -> Self {
        let last_level = levels.len();

        Self {
            id: 0,
            levels,
            first_level: 0,
            last_level,
            root_collect: None,
            config: GroupingConfig::new(),
            tree: GroupTree::new(),
            prepared: false,
        }
    }

    #[must_use]
    pub const fn with_id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    pub const fn with_first_level(mut self, first_level: usize) -> Self {
        self.first_level = first_level;
        self.prepared = false;
        self
    }

    #[must_use]
    pub const fn with_last_level(mut self, last_level: usize) -> Self {
        self.last_level = last_level;
        self.prepared = false;
        self
    }

    /// Collect applied to the root group for every document.
    #[must_use]
    pub fn with_root_collect(mut self, collect: X) -> Self {
        self.root_collect = Some(collect);
        self.prepared = false;
        self
    }

    #[must_use]
    pub const fn with_config(mut self, config: GroupingConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn levels(&self) -> &[GroupingLevel<X>] {
        &self.levels
    }

    #[must_use]
    pub fn level(&self, level: usize) -> Option<&GroupingLevel<X>> {
        self.levels.get(level)
    }

    #[must_use]
    pub const fn first_level(&self) -> usize {
        self.first_level
    }

    #[must_use]
    pub const fn last_level(&self) -> usize {
        self.last_level
    }

    #[must_use]
    pub const fn window(&self) -> LevelWindow {
        LevelWindow::new(self.first_level, self.last_level)
    }

    #[must_use]
    pub const fn root_collect(&self) -> Option<&X> {
        self.root_collect.as_ref()
    }

    #[must_use]
    pub const fn config(&self) -> &GroupingConfig {
        &self.config
    }

    #[must_use]
    pub const fn is_prepared(&self) -> bool {
        self.prepared
    }

    #[must_use]
    pub const fn tree(&self) -> &GroupTree {
        &self.tree
    }

    #[must_use]
    pub const fn root(&self) -> GroupRef<'_> {
        self.tree.root()
    }

    /// Drop every group, keeping levels and window.
    pub fn reset_tree(&mut self) {
        self.tree.clear();
    }

    /// Advance the window one level deeper for the next pass.
    ///
    /// Existing groups are kept so the now-frozen levels restate them; their
    /// aggregates inside the new window are cleared and recollected. Returns
    /// false when the window already covers the last level.
    pub fn next_pass(&mut self) -> bool {
        if self.last_level >= self.levels.len() {
            return false;
        }

        self.first_level = self.last_level;
        self.last_level += 1;
        self.prepared = false;
        for level in &mut self.levels {
            level.unprepare();
        }
        self.tree.reset_aggregates_from_depth(self.first_level);

        true
    }
}

impl<X: Expression> Grouping<X> {
    /// Validate the window, bind current indexes outermost first, and bind
    /// each level's grouper.
    pub fn prepare(&mut self, is_ordered: bool) -> Result<(), InternalError> {
        self.prepared = false;
        let window = self.window().validate(self.levels.len())?;

        let mut setup = CurrentIndexSetup::new();
        if let Some(collect) = &mut self.root_collect {
            setup.attach(collect);
        }
        for (i, level) in self.levels.iter_mut().enumerate() {
            level.wire_current_index(i, &mut setup)?;
            level.prepare(window, i, is_ordered);
        }

        self.prepared = true;
        record(MetricsEvent::Prepared {
            levels: self.levels.len(),
        });
        tracing::debug!(
            grouping = self.id,
            first_level = window.first,
            last_level = window.last,
            levels = self.levels.len(),
            is_ordered,
            "grouping prepared"
        );

        Ok(())
    }

    /// Route one matched document through the active window.
    pub fn aggregate(&mut self, doc: &X::Document, rank: HitRank) -> Result<(), InternalError> {
        if !self.prepared {
            return Err(InternalError::configuration(
                ErrorOrigin::Prepare,
                ConfigurationError::NotPrepared,
            ));
        }

        let window = self.window();
        self.tree.update_rank(GroupId::ROOT, rank)?;
        let mut pass = AggregationPass {
            levels: &self.levels,
            root_collect: self.root_collect.as_ref(),
            window,
            config: &self.config,
            tree: &mut self.tree,
        };

        pass.aggregate(GroupId::ROOT, 0, doc, rank, false)
    }

    /// Route a batch of hits; stops at the first error. Returns the number of
    /// documents aggregated.
    pub fn aggregate_all<'d, I>(&mut self, hits: I) -> Result<usize, InternalError>
    where
        I: IntoIterator<Item = (&'d X::Document, HitRank)>,
        X::Document: 'd,
    {
        let mut count = 0;
        for (doc, rank) in hits {
            self.aggregate(doc, rank)?;
            count += 1;
        }

        Ok(count)
    }

    /// Trim every group's children to its level's `max_groups`, most
    /// favorable first. Returns the number of groups removed; a second call
    /// removes nothing.
    pub fn finalize(&mut self) -> Result<usize, InternalError> {
        let mut removed = 0;
        let mut stack = vec![(GroupId::ROOT, 0usize)];

        while let Some((group, depth)) = stack.pop() {
            let Some(level) = self.levels.get(depth) else {
                continue;
            };
            if let Some(max) = level.effective_max_groups(&self.config) {
                removed += self.tree.trim_children(group, max, level.is_ordered())?;
            }
            stack.extend(
                self.tree
                    .child_ids(group)?
                    .into_iter()
                    .map(|child| (child, depth + 1)),
            );
        }

        record(MetricsEvent::GroupsTrimmed {
            removed: u64::try_from(removed).unwrap_or(u64::MAX),
        });
        tracing::debug!(
            grouping = self.id,
            removed,
            groups = self.tree.len(),
            "grouping finalized"
        );

        Ok(removed)
    }
}

impl<X: PartialEq> PartialEq for Grouping<X> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.first_level == other.first_level
            && self.last_level == other.last_level
            && self.levels == other.levels
            && self.root_collect == other.root_collect
    }
}

impl<X: Expression> Visitable for Grouping<X> {
    fn type_name(&self) -> &'static str {
        "Grouping"
    }

    fn visit_members(&self, visitor: &mut dyn ObjectVisitor) {
        visitor.visit_int("id", i64::from(self.id));
        visitor.visit_int("firstLevel", i64::try_from(self.first_level).unwrap_or(i64::MAX));
        visitor.visit_int("lastLevel", i64::try_from(self.last_level).unwrap_or(i64::MAX));
        match &self.root_collect {
            Some(collect) => visit_expression(visitor, "rootCollect", collect),
            None => visitor.visit_null("rootCollect"),
        }
        for (i, level) in self.levels.iter().enumerate() {
            visit(visitor, &format!("levels[{i}]"), level);
        }
        visit(visitor, "root", &self.root());
    }
}
