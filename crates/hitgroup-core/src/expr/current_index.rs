//! Module: expr::current_index
//! Responsibility: binding struct names to per-level current-index slots.
//! Does not own: iteration over multi-valued keys (see `aggregation::grouper`).
//! Boundary: two explicit phases, free-name analysis then bind, so ambiguous
//! classify expressions fail at prepare instead of mid-pass.

use crate::{
    error::{ConfigurationError, ErrorOrigin, InternalError},
    expr::{Expression, ExpressionNode, IndexedFieldPredicate, NodeOperation},
};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

///
/// CurrentIndex
///
/// Shared slot holding the element index of the multi-valued key currently
/// being grouped. Written by the owning level's grouper, read by expression
/// nodes attached to it. Clones alias the same slot.
///

#[derive(Clone, Default)]
pub struct CurrentIndex(Arc<AtomicUsize>);

impl CurrentIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn set(&self, index: usize) {
        self.0.store(index, Ordering::Relaxed);
    }

    /// True when both handles alias the same slot.
    #[must_use]
    pub fn same_slot(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for CurrentIndex {
    fn eq(&self, other: &Self) -> bool {
        self.same_slot(other)
    }
}

impl fmt::Debug for CurrentIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CurrentIndex").field(&self.get()).finish()
    }
}

///
/// IndexResolution
///

#[derive(Clone, Debug, PartialEq)]
pub enum IndexResolution {
    /// The owning struct is bound; attach this slot.
    Bound(CurrentIndex),
    /// The owning struct has no binding yet.
    Unbound(String),
    /// The field is not struct-qualified.
    NotIndexed,
}

///
/// Usage
///
/// Free struct names observed while analyzing one classify expression.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Usage {
    unbound: BTreeSet<String>,
}

impl Usage {
    #[must_use]
    pub fn len(&self) -> usize {
        self.unbound.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unbound.is_empty()
    }

    pub fn unbound_names(&self) -> impl Iterator<Item = &str> {
        self.unbound.iter().map(String::as_str)
    }

    /// The unbound name when exactly one exists.
    #[must_use]
    pub fn single_unbound_name(&self) -> Option<&str> {
        if self.unbound.len() == 1 {
            self.unbound_names().next()
        } else {
            None
        }
    }

    fn notify_unbound(&mut self, name: String) {
        self.unbound.insert(name);
    }
}

///
/// CurrentIndexSetup
///
/// Struct-name bindings accumulated while preparing levels outermost first,
/// so inner levels resolve names bound by outer ones.
///

#[derive(Debug, Default)]
pub struct CurrentIndexSetup {
    bindings: BTreeMap<String, CurrentIndex>,
}

impl CurrentIndexSetup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve one qualified field name against current bindings.
    #[must_use]
    pub fn resolve(&self, field_name: &str) -> IndexResolution {
        let Some(struct_name) = struct_name_of(field_name) else {
            return IndexResolution::NotIndexed;
        };

        match self.bindings.get(struct_name) {
            Some(index) => IndexResolution::Bound(index.clone()),
            None => IndexResolution::Unbound(struct_name.to_string()),
        }
    }

    /// Analysis phase: report free struct names without touching any node.
    pub fn analyze<X>(&self, expr: &mut X) -> Usage
    where
        X: Expression + ?Sized,
    {
        let mut collector = FreeNameCollector {
            setup: self,
            usage: Usage::default(),
        };
        expr.select(&IndexedFieldPredicate, &mut collector);

        collector.usage
    }

    /// Attach every node whose struct name is already bound.
    /// Returns the number of nodes attached.
    pub fn attach<X>(&self, expr: &mut X) -> usize
    where
        X: Expression + ?Sized,
    {
        let mut attacher = IndexAttacher {
            setup: self,
            attached: 0,
        };
        expr.select(&IndexedFieldPredicate, &mut attacher);

        attacher.attached
    }

    /// Bind phase: map one free struct name to a level's slot.
    pub fn bind(&mut self, struct_name: &str, index: CurrentIndex) -> Result<(), InternalError> {
        if self.bindings.contains_key(struct_name) {
            return Err(InternalError::configuration(
                ErrorOrigin::Prepare,
                ConfigurationError::CurrentIndexAlreadyBound {
                    name: struct_name.to_string(),
                },
            ));
        }
        self.bindings.insert(struct_name.to_string(), index);

        Ok(())
    }
}

// Struct part of a qualified name: everything before the last '.'.
fn struct_name_of(field_name: &str) -> Option<&str> {
    match field_name.rsplit_once('.') {
        Some((struct_name, field)) if !struct_name.is_empty() && !field.is_empty() => {
            Some(struct_name)
        }
        _ => None,
    }
}

///
/// FreeNameCollector
///

struct FreeNameCollector<'a> {
    setup: &'a CurrentIndexSetup,
    usage: Usage,
}

impl NodeOperation for FreeNameCollector<'_> {
    fn execute(&mut self, node: &mut dyn ExpressionNode) {
        let Some(field) = node.indexed_field() else {
            return;
        };
        if let IndexResolution::Unbound(name) = self.setup.resolve(field) {
            self.usage.notify_unbound(name);
        }
    }
}

///
/// IndexAttacher
///

struct IndexAttacher<'a> {
    setup: &'a CurrentIndexSetup,
    attached: usize,
}

impl NodeOperation for IndexAttacher<'_> {
    fn execute(&mut self, node: &mut dyn ExpressionNode) {
        let resolution = match node.indexed_field() {
            Some(field) => self.setup.resolve(field),
            None => return,
        };
        if let IndexResolution::Bound(index) = resolution {
            node.attach_current_index(index);
            self.attached += 1;
        }
    }
}
