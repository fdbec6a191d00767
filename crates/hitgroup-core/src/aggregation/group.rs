//! Module: aggregation::group
//! Responsibility: the arena-backed group tree, child admission under
//! candidate-window limits, and pruning.
//! Does not own: deciding which level a document is routed through.
//! Boundary: groups are addressed by `GroupId`; callers only ever see
//! read-only `GroupRef` views.

use crate::{
    config::PrunePolicy,
    error::InternalError,
    value::{HitRank, ResultValue},
    visitor::{ObjectVisitor, Visitable, visit},
};
use derive_more::Display;
use std::{cmp::Ordering, collections::BTreeMap};

///
/// GroupId
///
/// Arena address of one group. The root is always `GroupId::ROOT`.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("g{_0}")]
pub struct GroupId(usize);

impl GroupId {
    pub const ROOT: Self = Self(0);

    // Arena slot of a non-root group.
    const fn slot(self) -> Option<usize> {
        self.0.checked_sub(1)
    }

    const fn from_slot(slot: usize) -> Self {
        Self(slot + 1)
    }
}

///
/// RejectReason
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RejectReason {
    /// The level is frozen and the key was not restated by a prior pass.
    Frozen,
    /// The candidate window is full and the newcomer did not displace anyone.
    Capacity,
}

///
/// Admission
///
/// Outcome of locating or creating one child group. Rejection is a normal
/// outcome, not an error.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Admission {
    Existing(GroupId),
    Created {
        group: GroupId,
        evicted: Option<ResultValue>,
    },
    Rejected(RejectReason),
}

impl Admission {
    /// The admitted child, if any.
    #[must_use]
    pub const fn group(&self) -> Option<GroupId> {
        match self {
            Self::Existing(group) | Self::Created { group, .. } => Some(*group),
            Self::Rejected(_) => None,
        }
    }
}

///
/// AdmissionPolicy
///
/// Per-level admission limits resolved once at prepare.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct AdmissionPolicy {
    pub(crate) frozen: bool,
    pub(crate) window: Option<usize>,
    pub(crate) is_ordered: bool,
    pub(crate) prune: PrunePolicy,
}

///
/// GroupNode
///

#[derive(Clone, Debug)]
struct GroupNode {
    key: ResultValue,
    rank: HitRank,
    aggregate: ResultValue,
    parent: Option<GroupId>,
    depth: usize,
    seq: u64,
    children: BTreeMap<ResultValue, GroupId>,
}

impl GroupNode {
    const fn new(
        key: ResultValue,
        rank: HitRank,
        aggregate: ResultValue,
        parent: Option<GroupId>,
        depth: usize,
        seq: u64,
    ) -> Self {
        Self {
            key,
            rank,
            aggregate,
            parent,
            depth,
            seq,
            children: BTreeMap::new(),
        }
    }

    const fn standing(&self) -> Standing<'_> {
        Standing {
            key: &self.key,
            aggregate: &self.aggregate,
            seq: self.seq,
        }
    }

    fn update_rank(&mut self, rank: HitRank) {
        if rank > self.rank {
            self.rank = rank;
        }
    }
}

///
/// Standing
///
/// Fields that decide which candidate survives pruning.
///

#[derive(Clone, Copy)]
struct Standing<'a> {
    key: &'a ResultValue,
    aggregate: &'a ResultValue,
    seq: u64,
}

// Greater means more favorable. Higher aggregates win; ties go to the earlier
// insertion on ordered levels and to the smaller key otherwise.
fn favor_cmp(left: Standing<'_>, right: Standing<'_>, is_ordered: bool) -> Ordering {
    left.aggregate.cmp(right.aggregate).then_with(|| {
        if is_ordered {
            right.seq.cmp(&left.seq)
        } else {
            right.key.cmp(left.key)
        }
    })
}

///
/// GroupTree
///
/// Arena of groups. Children are indexed by classify key; every non-root
/// group links back to its parent.
///

#[derive(Clone, Debug)]
pub struct GroupTree {
    root: GroupNode,
    nodes: Vec<Option<GroupNode>>,
    free: Vec<usize>,
    next_seq: u64,
}

impl GroupTree {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            root: GroupNode::new(
                ResultValue::Null,
                HitRank::NEG_INFINITY,
                ResultValue::Null,
                None,
                0,
                0,
            ),
            nodes: Vec::new(),
            free: Vec::new(),
            next_seq: 1,
        }
    }

    /// Read-only view of the root group.
    #[must_use]
    pub const fn root(&self) -> GroupRef<'_> {
        GroupRef {
            tree: self,
            id: GroupId::ROOT,
            node: &self.root,
        }
    }

    #[must_use]
    pub fn get(&self, id: GroupId) -> Option<GroupRef<'_>> {
        self.node(id).map(|node| GroupRef {
            tree: self,
            id,
            node,
        })
    }

    /// Number of live groups, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        1 + self.nodes.len() - self.free.len()
    }

    /// True when only the root exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 1
    }

    /// Locate the child of `parent` keyed by `key`, creating it when the
    /// policy admits a new group. `seed` computes a new group's initial
    /// aggregate and is only called when a group may be created.
    pub(crate) fn group_single<F>(
        &mut self,
        parent: GroupId,
        key: &ResultValue,
        rank: HitRank,
        policy: &AdmissionPolicy,
        seed: F,
    ) -> Result<Admission, InternalError>
    where
        F: FnOnce() -> Result<ResultValue, InternalError>,
    {
        let parent_node = self.try_node(parent)?;
        if let Some(&child) = parent_node.children.get(key) {
            if !policy.frozen {
                self.try_node_mut(child)?.update_rank(rank);
            }
            return Ok(Admission::Existing(child));
        }
        if policy.frozen {
            return Ok(Admission::Rejected(RejectReason::Frozen));
        }

        let depth = parent_node.depth + 1;
        let full = policy
            .window
            .is_some_and(|window| parent_node.children.len() >= window);
        if !full {
            let aggregate = seed()?;
            let group = self.insert(parent, key.clone(), rank, aggregate, depth)?;
            return Ok(Admission::Created {
                group,
                evicted: None,
            });
        }

        match policy.prune {
            PrunePolicy::RejectWhenFull => Ok(Admission::Rejected(RejectReason::Capacity)),
            PrunePolicy::DisplaceLeastFavorable => {
                let Some(victim) = self.least_favorable_child(parent, policy.is_ordered)? else {
                    return Ok(Admission::Rejected(RejectReason::Capacity));
                };
                let aggregate = seed()?;
                let candidate = Standing {
                    key,
                    aggregate: &aggregate,
                    seq: self.next_seq,
                };
                let victim_standing = self.try_node(victim)?.standing();
                if favor_cmp(candidate, victim_standing, policy.is_ordered) != Ordering::Greater {
                    return Ok(Admission::Rejected(RejectReason::Capacity));
                }

                let (evicted, _) = self.remove_subtree(victim)?;
                let group = self.insert(parent, key.clone(), rank, aggregate, depth)?;
                Ok(Admission::Created {
                    group,
                    evicted: Some(evicted),
                })
            }
        }
    }

    /// Mutable access to one group's aggregate state.
    pub(crate) fn aggregate_mut(&mut self, id: GroupId) -> Result<&mut ResultValue, InternalError> {
        Ok(&mut self.try_node_mut(id)?.aggregate)
    }

    pub(crate) fn update_rank(&mut self, id: GroupId, rank: HitRank) -> Result<(), InternalError> {
        self.try_node_mut(id)?.update_rank(rank);
        Ok(())
    }

    /// Keep the `max` most favorable children of `parent`, dropping the rest
    /// with their subtrees. Returns the number of groups freed.
    pub(crate) fn trim_children(
        &mut self,
        parent: GroupId,
        max: usize,
        is_ordered: bool,
    ) -> Result<usize, InternalError> {
        let parent_node = self.try_node(parent)?;
        if parent_node.children.len() <= max {
            return Ok(0);
        }

        let mut ranked = parent_node
            .children
            .values()
            .map(|&id| self.try_node(id).map(|node| (id, node.standing())))
            .collect::<Result<Vec<_>, _>>()?;
        ranked.sort_by(|(_, left), (_, right)| favor_cmp(*right, *left, is_ordered));
        let doomed = ranked.into_iter().skip(max).map(|(id, _)| id).collect::<Vec<_>>();

        let mut freed = 0;
        for id in doomed {
            freed += self.remove_subtree(id)?.1;
        }

        Ok(freed)
    }

    /// Ids of `parent`'s children in key order.
    pub(crate) fn child_ids(&self, parent: GroupId) -> Result<Vec<GroupId>, InternalError> {
        Ok(self.try_node(parent)?.children.values().copied().collect())
    }

    /// Reset aggregates of every group at `min_depth` or deeper.
    pub(crate) fn reset_aggregates_from_depth(&mut self, min_depth: usize) {
        if min_depth == 0 {
            self.root.aggregate = ResultValue::Null;
        }
        for node in self.nodes.iter_mut().flatten() {
            if node.depth >= min_depth {
                node.aggregate = ResultValue::Null;
            }
        }
    }

    /// Drop every group, keeping an empty root.
    pub(crate) fn clear(&mut self) {
        *self = Self::new();
    }

    fn insert(
        &mut self,
        parent: GroupId,
        key: ResultValue,
        rank: HitRank,
        aggregate: ResultValue,
        depth: usize,
    ) -> Result<GroupId, InternalError> {
        let seq = self.next_seq;
        self.next_seq += 1;
        let node = GroupNode::new(key.clone(), rank, aggregate, Some(parent), depth, seq);

        let id = if let Some(slot) = self.free.pop() {
            self.nodes[slot] = Some(node);
            GroupId::from_slot(slot)
        } else {
            self.nodes.push(Some(node));
            GroupId::from_slot(self.nodes.len() - 1)
        };
        self.try_node_mut(parent)?.children.insert(key, id);

        Ok(id)
    }

    fn least_favorable_child(
        &self,
        parent: GroupId,
        is_ordered: bool,
    ) -> Result<Option<GroupId>, InternalError> {
        let mut worst: Option<(GroupId, Standing<'_>)> = None;
        for &id in self.try_node(parent)?.children.values() {
            let standing = self.try_node(id)?.standing();
            let replace = match &worst {
                Some((_, current)) => favor_cmp(standing, *current, is_ordered) == Ordering::Less,
                None => true,
            };
            if replace {
                worst = Some((id, standing));
            }
        }

        Ok(worst.map(|(id, _)| id))
    }

    // Detach one group from its parent and free it with all descendants.
    // Returns the detached key and the number of groups freed.
    fn remove_subtree(&mut self, id: GroupId) -> Result<(ResultValue, usize), InternalError> {
        let slot = id
            .slot()
            .ok_or_else(|| InternalError::group_invariant("the root group cannot be removed"))?;
        let node = self
            .nodes
            .get_mut(slot)
            .and_then(Option::take)
            .ok_or_else(|| InternalError::group_invariant(format!("group {id} is not live")))?;
        self.free.push(slot);
        if let Some(parent) = node.parent {
            self.try_node_mut(parent)?.children.remove(&node.key);
        }

        let mut freed = 1;
        let mut stack = node.children.into_values().collect::<Vec<_>>();
        while let Some(child) = stack.pop() {
            let Some(child_slot) = child.slot() else {
                continue;
            };
            if let Some(child_node) = self.nodes.get_mut(child_slot).and_then(Option::take) {
                self.free.push(child_slot);
                stack.extend(child_node.children.into_values());
                freed += 1;
            }
        }

        Ok((node.key, freed))
    }

    fn node(&self, id: GroupId) -> Option<&GroupNode> {
        match id.slot() {
            None => Some(&self.root),
            Some(slot) => self.nodes.get(slot).and_then(Option::as_ref),
        }
    }

    fn try_node(&self, id: GroupId) -> Result<&GroupNode, InternalError> {
        self.node(id)
            .ok_or_else(|| InternalError::group_invariant(format!("group {id} is not live")))
    }

    fn try_node_mut(&mut self, id: GroupId) -> Result<&mut GroupNode, InternalError> {
        let node = match id.slot() {
            None => Some(&mut self.root),
            Some(slot) => self.nodes.get_mut(slot).and_then(Option::as_mut),
        };
        node.ok_or_else(|| InternalError::group_invariant(format!("group {id} is not live")))
    }
}

impl Default for GroupTree {
    fn default() -> Self {
        Self::new()
    }
}

///
/// GroupRef
///
/// Read-only view of one live group.
///

#[derive(Clone, Copy, Debug)]
pub struct GroupRef<'a> {
    tree: &'a GroupTree,
    id: GroupId,
    node: &'a GroupNode,
}

impl<'a> GroupRef<'a> {
    #[must_use]
    pub const fn id(&self) -> GroupId {
        self.id
    }

    #[must_use]
    pub const fn key(&self) -> &'a ResultValue {
        &self.node.key
    }

    /// Best hit rank routed into this group.
    #[must_use]
    pub const fn rank(&self) -> HitRank {
        self.node.rank
    }

    #[must_use]
    pub const fn aggregate(&self) -> &'a ResultValue {
        &self.node.aggregate
    }

    /// Root is depth 0; groups created by level `i` sit at depth `i + 1`.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.node.depth
    }

    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.node.parent.and_then(|id| self.tree.get(id))
    }

    #[must_use]
    pub fn child(&self, key: &ResultValue) -> Option<Self> {
        self.node
            .children
            .get(key)
            .and_then(|&id| self.tree.get(id))
    }

    #[must_use]
    pub fn child_count(&self) -> usize {
        self.node.children.len()
    }

    /// Children in classify-key order.
    pub fn children(&self) -> impl Iterator<Item = GroupRef<'a>> + use<'a> {
        let tree = self.tree;
        self.node
            .children
            .values()
            .filter_map(move |&id| tree.get(id))
    }

    /// Keys of the children, in key order.
    #[must_use]
    pub fn child_keys(&self) -> Vec<&'a ResultValue> {
        self.node.children.keys().collect()
    }
}

impl Visitable for GroupRef<'_> {
    fn type_name(&self) -> &'static str {
        "Group"
    }

    fn visit_members(&self, visitor: &mut dyn ObjectVisitor) {
        visitor.visit_string("id", &format!("{:?}", self.key()));
        visitor.visit_float("rank", self.rank());
        visitor.visit_string("aggregate", &format!("{:?}", self.aggregate()));
        for (i, child) in self.children().enumerate() {
            visit(visitor, &format!("children[{i}]"), &child);
        }
    }
}
