//! Module: aggregation::pass
//! Responsibility: one document's walk from the root through the active
//! level window.
//! Does not own: window validation or level preparation (see `grouping`).

use crate::{
    aggregation::{Admission, GroupId, GroupTree, GroupingLevel, LevelWindow, RejectReason},
    config::GroupingConfig,
    error::InternalError,
    expr::Expression,
    obs::sink::{MetricsEvent, record},
    value::{HitRank, ResultValue},
};

///
/// AggregationPass
///
/// Borrowed view over a prepared grouping for routing documents.
///

pub(super) struct AggregationPass<'a, X> {
    pub(super) levels: &'a [GroupingLevel<X>],
    pub(super) root_collect: Option<&'a X>,
    pub(super) window: LevelWindow,
    pub(super) config: &'a GroupingConfig,
    pub(super) tree: &'a mut GroupTree,
}

impl<'a, X: Expression> AggregationPass<'a, X> {
    pub(super) fn level(&self, level: usize) -> Result<&'a GroupingLevel<X>, InternalError> {
        self.levels
            .get(level)
            .ok_or_else(|| InternalError::level_invariant(format!("level {level} does not exist")))
    }

    /// Collect into `group` (depth `depth`) unless already seeded, then
    /// classify into the next level while inside the window.
    pub(super) fn aggregate(
        &mut self,
        group: GroupId,
        depth: usize,
        doc: &X::Document,
        rank: HitRank,
        collected: bool,
    ) -> Result<(), InternalError> {
        if !collected && depth >= self.window.first {
            self.collect(group, depth, doc, rank)?;
        }
        if depth >= self.window.last {
            return Ok(());
        }

        let level = self.level(depth)?;
        let grouper = level.grouper().ok_or_else(|| {
            InternalError::level_invariant(format!("level {depth} has no bound grouper"))
        })?;
        let key = level.classify.evaluate(doc, rank)?;

        grouper.group_doc(self, depth, group, key, doc, rank)
    }

    /// Locate or create the child of `parent` for `key` at `level`.
    pub(super) fn group_single(
        &mut self,
        level: usize,
        parent: GroupId,
        key: &ResultValue,
        doc: &X::Document,
        rank: HitRank,
    ) -> Result<Admission, InternalError> {
        let descriptor = self.level(level)?;
        let policy = descriptor.admission_policy(self.config)?;
        let admission = self.tree.group_single(parent, key, rank, &policy, || {
            let mut state = ResultValue::Null;
            descriptor.collect.collect(&mut state, doc, rank)?;
            Ok(state)
        })?;

        match &admission {
            Admission::Existing(_) => {}
            Admission::Created { evicted, .. } => {
                if let Some(evicted) = evicted {
                    tracing::trace!(level, evicted = ?evicted, admitted = ?key, "group displaced");
                    record(MetricsEvent::GroupEvicted { level });
                }
                record(MetricsEvent::GroupCreated { level });
            }
            Admission::Rejected(reason) => record(MetricsEvent::CapacityRejected {
                level,
                frozen: *reason == RejectReason::Frozen,
            }),
        }

        Ok(admission)
    }

    fn collect(
        &mut self,
        group: GroupId,
        depth: usize,
        doc: &X::Document,
        rank: HitRank,
    ) -> Result<(), InternalError> {
        let collector = match depth {
            0 => self.root_collect,
            _ => Some(&self.level(depth - 1)?.collect),
        };
        let Some(collector) = collector else {
            return Ok(());
        };

        let state = self.tree.aggregate_mut(group)?;
        collector.collect(state, doc, rank)?;

        Ok(())
    }
}
