use crate::{
    aggregation::{GroupRef, Grouper, Grouping, GroupingLevel},
    config::{GroupingConfig, PrunePolicy},
    error::{ConfigurationError, ErrorClass},
    obs::{MetricsEvent, MetricsSink, with_metrics_sink},
    test_support::{TestDoc, TestExpr, array, count, element, field, probe, sum},
    value::ResultValue,
    visitor::dump,
};
use proptest::prelude::*;
use std::{cell::RefCell, rc::Rc};

fn count_level(name: &str) -> GroupingLevel<TestExpr> {
    GroupingLevel::new(field(name), count())
}

fn prepared(grouping: Grouping<TestExpr>) -> Grouping<TestExpr> {
    let mut grouping = grouping;
    grouping.prepare(false).expect("prepare should succeed");
    grouping
}

fn doc_ab(a: &str, b: &str) -> TestDoc {
    TestDoc::new().field("a", a).field("b", b)
}

fn feed(grouping: &mut Grouping<TestExpr>, docs: &[TestDoc]) {
    for doc in docs {
        grouping.aggregate(doc, 1.0).expect("aggregate should succeed");
    }
}

fn child_keys(group: GroupRef<'_>) -> Vec<String> {
    group
        .children()
        .map(|child| child.key().as_text().unwrap_or_default().to_string())
        .collect()
}

fn child_aggregate(group: GroupRef<'_>, key: &str) -> ResultValue {
    group
        .child(&ResultValue::from(key))
        .map(|child| child.aggregate().clone())
        .unwrap_or_default()
}

#[derive(Default)]
struct RecordingSink {
    events: RefCell<Vec<MetricsEvent>>,
}

impl MetricsSink for RecordingSink {
    fn record(&self, event: MetricsEvent) {
        self.events.borrow_mut().push(event);
    }
}

///
/// Single-value grouping
///

#[test]
fn single_value_level_groups_by_key_and_collects() {
    let mut grouping = prepared(Grouping::new(vec![count_level("a")]));

    feed(&mut grouping, &[doc_ab("x", "-"), doc_ab("y", "-"), doc_ab("x", "-")]);

    let root = grouping.root();
    assert_eq!(child_keys(root), vec!["x", "y"]);
    assert_eq!(child_aggregate(root, "x"), ResultValue::Int(2));
    assert_eq!(child_aggregate(root, "y"), ResultValue::Int(1));
    assert_eq!(grouping.level(0).and_then(GroupingLevel::grouper), Some(Grouper::SingleValue));
}

#[test]
fn root_collect_sees_every_document() {
    let mut grouping = prepared(Grouping::new(vec![count_level("a")]).with_root_collect(count()));

    feed(&mut grouping, &[doc_ab("x", "-"), doc_ab("y", "-"), doc_ab("z", "-")]);

    assert_eq!(grouping.root().aggregate(), &ResultValue::Int(3));
}

#[test]
fn group_rank_tracks_best_hit() {
    let mut grouping = prepared(Grouping::new(vec![count_level("a")]));

    for rank in [1.0, 3.0, 2.0] {
        grouping
            .aggregate(&doc_ab("x", "-"), rank)
            .expect("aggregate should succeed");
    }

    let root = grouping.root();
    assert!((root.rank() - 3.0).abs() < f64::EPSILON);
    let x = root.child(&ResultValue::from("x")).expect("group x");
    assert!((x.rank() - 3.0).abs() < f64::EPSILON);
    assert_eq!(x.depth(), 1);
    assert_eq!(x.parent().map(|parent| parent.id()), Some(root.id()));
}

#[test]
fn plain_collect_keeps_the_latest_value() {
    let level = GroupingLevel::new(field("a"), TestExpr::Rank);
    let mut grouping = prepared(Grouping::new(vec![level]));

    for rank in [5.0, 2.0] {
        grouping
            .aggregate(&doc_ab("x", "-"), rank)
            .expect("aggregate should succeed");
    }

    assert_eq!(child_aggregate(grouping.root(), "x"), ResultValue::Float(2.0));
}

#[test]
fn filter_rejection_skips_the_document() {
    let level = count_level("a").with_filter(crate::test_support::eq(field("b"), "keep"));
    let mut grouping = prepared(Grouping::new(vec![level]));

    feed(&mut grouping, &[doc_ab("x", "keep"), doc_ab("y", "drop"), doc_ab("x", "drop")]);

    assert_eq!(child_keys(grouping.root()), vec!["x"]);
    assert_eq!(child_aggregate(grouping.root(), "x"), ResultValue::Int(1));
}

///
/// Capacity
///

#[test]
fn end_to_end_two_level_caps() {
    let levels = vec![
        count_level("a").with_max_groups(2),
        count_level("b").with_max_groups(1),
    ];
    let mut grouping = prepared(Grouping::new(levels));

    feed(
        &mut grouping,
        &[doc_ab("x", "p"), doc_ab("x", "q"), doc_ab("y", "p"), doc_ab("z", "p")],
    );

    let root = grouping.root();
    assert!(root.child_count() <= 2);
    for child in root.children() {
        assert!(child.child_count() <= 1, "group {:?} over capacity", child.key());
    }
    // equal counts fall back to key order on unordered levels
    assert_eq!(child_keys(root), vec!["x", "y"]);
    let x = root.child(&ResultValue::from("x")).expect("group x");
    assert_eq!(child_keys(x), vec!["p"]);
    assert_eq!(x.aggregate(), &ResultValue::Int(2));
}

#[test]
fn displacement_prefers_higher_aggregate() {
    let level = GroupingLevel::new(field("a"), sum(field("w"))).with_max_groups(1);
    let docs = [
        TestDoc::new().field("a", "low").field("w", 1i64),
        TestDoc::new().field("a", "high").field("w", 5i64),
    ];

    let mut displacing = prepared(Grouping::new(vec![level.clone()]));
    feed(&mut displacing, &docs);
    assert_eq!(child_keys(displacing.root()), vec!["high"]);

    let config = GroupingConfig::new().with_prune_policy(PrunePolicy::RejectWhenFull);
    let mut rejecting = prepared(Grouping::new(vec![level]).with_config(config));
    feed(&mut rejecting, &docs);
    assert_eq!(child_keys(rejecting.root()), vec!["low"]);
}

#[test]
fn displaced_group_takes_its_subtree_with_it() {
    let levels = vec![
        GroupingLevel::new(field("a"), sum(field("w"))).with_max_groups(1),
        count_level("b"),
    ];
    let mut grouping = prepared(Grouping::new(levels));

    feed(
        &mut grouping,
        &[
            TestDoc::new().field("a", "low").field("b", "p").field("w", 1i64),
            TestDoc::new().field("a", "high").field("b", "q").field("w", 9i64),
        ],
    );

    let root = grouping.root();
    assert_eq!(child_keys(root), vec!["high"]);
    // root + high + q
    assert_eq!(grouping.tree().len(), 3);
}

#[test]
fn ordered_levels_break_ties_by_arrival() {
    let level = count_level("a").with_max_groups(1);
    let docs = [doc_ab("b", "-"), doc_ab("a", "-")];

    let mut ordered = Grouping::new(vec![level.clone()]);
    ordered.prepare(true).expect("prepare");
    feed(&mut ordered, &docs);
    assert_eq!(child_keys(ordered.root()), vec!["b"]);

    let mut unordered = prepared(Grouping::new(vec![level]));
    feed(&mut unordered, &docs);
    assert_eq!(child_keys(unordered.root()), vec!["a"]);
}

#[test]
fn precision_window_tracks_candidates_until_finalize() {
    let level = count_level("a").with_max_groups(1).with_precision(3);
    let mut grouping = prepared(Grouping::new(vec![level]));

    feed(
        &mut grouping,
        &[doc_ab("b", "-"), doc_ab("a", "-"), doc_ab("b", "-"), doc_ab("c", "-")],
    );
    assert_eq!(grouping.root().child_count(), 3);

    assert_eq!(grouping.finalize().expect("finalize"), 2);
    assert_eq!(child_keys(grouping.root()), vec!["b"]);
    assert_eq!(grouping.finalize().expect("finalize again"), 0);
}

#[test]
fn config_default_caps_unlimited_levels() {
    let config = GroupingConfig::new()
        .with_default_max_groups(1)
        .with_prune_policy(PrunePolicy::RejectWhenFull);
    let mut grouping = prepared(Grouping::new(vec![count_level("a")]).with_config(config));

    feed(&mut grouping, &[doc_ab("x", "-"), doc_ab("y", "-")]);

    assert_eq!(child_keys(grouping.root()), vec!["x"]);
}

proptest! {
    #[test]
    fn children_never_exceed_max_groups(
        max in 1i64..4,
        reject in any::<bool>(),
        keys in prop::collection::vec(0u8..6, 0..40),
    ) {
        let policy = if reject {
            PrunePolicy::RejectWhenFull
        } else {
            PrunePolicy::DisplaceLeastFavorable
        };
        let cap = usize::try_from(max).unwrap_or(usize::MAX);
        let config = GroupingConfig::new().with_prune_policy(policy);
        let mut grouping = prepared(
            Grouping::new(vec![count_level("a").with_max_groups(max)]).with_config(config),
        );

        for key in keys {
            let doc = TestDoc::new().field("a", i64::from(key));
            grouping.aggregate(&doc, 1.0).expect("aggregate should succeed");
            prop_assert!(grouping.root().child_count() <= cap);
        }
    }
}

///
/// Frozen levels and multi-pass
///

#[test]
fn frozen_level_rejects_unseen_keys_without_mutation() {
    let levels = vec![count_level("a"), count_level("b")];
    let mut grouping = prepared(Grouping::new(levels).with_last_level(1));
    feed(&mut grouping, &[doc_ab("x", "p"), doc_ab("y", "q")]);
    assert_eq!(grouping.tree().len(), 3);

    assert!(grouping.next_pass());
    grouping.prepare(false).expect("second prepare");
    assert!(grouping.level(0).is_some_and(GroupingLevel::is_frozen));

    let before = dump("root", &grouping.root());
    grouping
        .aggregate(&doc_ab("z", "p"), 1.0)
        .expect("frozen rejection is not an error");
    assert_eq!(dump("root", &grouping.root()), before);

    grouping
        .aggregate(&doc_ab("x", "r"), 1.0)
        .expect("aggregate should succeed");
    let x = grouping.root().child(&ResultValue::from("x")).expect("group x");
    assert_eq!(child_keys(x), vec!["r"]);
    assert_eq!(child_keys(grouping.root()), vec!["x", "y"]);
}

#[test]
fn multi_pass_matches_single_pass() {
    let levels = vec![count_level("a"), count_level("b")];
    let docs = [doc_ab("x", "p"), doc_ab("x", "q"), doc_ab("y", "p"), doc_ab("x", "p")];

    let mut single = prepared(Grouping::new(levels.clone()));
    feed(&mut single, &docs);

    let mut multi = prepared(Grouping::new(levels).with_last_level(1));
    feed(&mut multi, &docs);
    assert!(multi.next_pass());
    multi.prepare(false).expect("second prepare");
    feed(&mut multi, &docs);
    assert!(!multi.next_pass());

    assert_eq!(dump("root", &multi.root()), dump("root", &single.root()));
}

#[test]
fn reset_tree_keeps_levels() {
    let mut grouping = prepared(Grouping::new(vec![count_level("a")]));
    feed(&mut grouping, &[doc_ab("x", "-")]);

    grouping.reset_tree();

    assert!(grouping.tree().is_empty());
    assert!(grouping.is_prepared());
    feed(&mut grouping, &[doc_ab("y", "-")]);
    assert_eq!(child_keys(grouping.root()), vec!["y"]);
}

///
/// Multi-value grouping and current index
///

#[test]
fn multi_value_key_revisits_duplicates_in_order() {
    let (filter, seen) = probe("tags.seen");
    let level = GroupingLevel::new(array("tags.name"), count()).with_filter(filter);
    let mut grouping = prepared(Grouping::new(vec![level]));
    let doc = TestDoc::new().array("tags.name", vec!["a", "b", "a"]);

    grouping.aggregate(&doc, 1.0).expect("aggregate should succeed");

    let root = grouping.root();
    assert_eq!(child_keys(root), vec!["a", "b"]);
    assert_eq!(child_aggregate(root, "a"), ResultValue::Int(2));
    assert_eq!(child_aggregate(root, "b"), ResultValue::Int(1));
    assert_eq!(seen.seen(), vec![0, 1, 2]);
    assert_eq!(grouping.level(0).and_then(GroupingLevel::grouper), Some(Grouper::MultiValue));
}

#[test]
fn collect_reads_the_current_element() {
    let level = GroupingLevel::new(array("tags.name"), sum(element("tags.weight")));
    let mut grouping = prepared(Grouping::new(vec![level]));
    let doc = TestDoc::new()
        .array("tags.name", vec!["a", "b", "a"])
        .array("tags.weight", vec![1i64, 2, 3]);

    grouping.aggregate(&doc, 1.0).expect("aggregate should succeed");

    assert_eq!(child_aggregate(grouping.root(), "a"), ResultValue::Int(4));
    assert_eq!(child_aggregate(grouping.root(), "b"), ResultValue::Int(2));
}

#[test]
fn zero_index_references_leave_level_unbound() {
    let levels = vec![
        count_level("a"),
        GroupingLevel::new(array("plain"), count()),
    ];
    let mut grouping = prepared(Grouping::new(levels));
    let doc = TestDoc::new().field("a", "x").array("plain", vec!["u", "v"]);

    grouping.aggregate(&doc, 1.0).expect("aggregate should succeed");

    assert!(grouping.levels().iter().all(|level| level.current_index().is_none()));
    let x = grouping.root().child(&ResultValue::from("x")).expect("group x");
    assert_eq!(child_keys(x), vec!["u", "v"]);
}

#[test]
fn inner_levels_resolve_outer_bindings() {
    let levels = vec![
        GroupingLevel::new(array("tags.name"), count()),
        GroupingLevel::new(element("tags.weight"), count()),
    ];
    let grouping = prepared(Grouping::new(levels));

    let outer = grouping
        .level(0)
        .and_then(GroupingLevel::current_index)
        .expect("outer level binds 'tags'");
    let inner = grouping.level(1).expect("inner level");
    assert!(inner.current_index().is_none());
    assert!(
        inner
            .classify()
            .attached_index()
            .is_some_and(|index| index.same_slot(outer))
    );
}

#[test]
fn ambiguous_current_index_fails_at_prepare() {
    let classify = TestExpr::Eq(
        Box::new(element("tags.name")),
        Box::new(element("links.url")),
    );
    let mut grouping = Grouping::new(vec![GroupingLevel::new(classify, count())]);

    let err = grouping.prepare(false).expect_err("two free names must fail");

    assert_eq!(err.class, ErrorClass::Configuration);
    assert_eq!(
        err.configuration_detail(),
        Some(&ConfigurationError::AmbiguousCurrentIndex {
            level: 0,
            names: vec!["links".to_string(), "tags".to_string()],
        })
    );
    assert!(!grouping.is_prepared());
}

///
/// Errors
///

#[test]
fn aggregate_requires_prepare() {
    let mut grouping = Grouping::new(vec![count_level("a")]);

    let err = grouping
        .aggregate(&doc_ab("x", "-"), 1.0)
        .expect_err("unprepared grouping must fail");

    assert_eq!(err.configuration_detail(), Some(&ConfigurationError::NotPrepared));
}

#[test]
fn invalid_window_fails_at_prepare() {
    let mut grouping = Grouping::new(vec![count_level("a")]).with_last_level(2);

    let err = grouping.prepare(false).expect_err("window past the last level");

    assert_eq!(
        err.configuration_detail(),
        Some(&ConfigurationError::InvalidLevelWindow {
            first: 0,
            last: 2,
            levels: 1,
        })
    );
}

#[test]
fn evaluation_error_aborts_the_pass() {
    let level = GroupingLevel::new(TestExpr::Fail("no such field".to_string()), count());
    let mut grouping = prepared(Grouping::new(vec![level]));

    let err = grouping
        .aggregate(&doc_ab("x", "-"), 1.0)
        .expect_err("evaluator failure must propagate");

    assert!(err.is_evaluation());
    assert!(err.message.contains("no such field"), "unexpected error: {err:?}");
}

#[test]
fn scalar_grouper_rejects_vector_keys() {
    let mut grouping = prepared(Grouping::new(vec![count_level("a")]));
    let doc = TestDoc::new().field("a", vec!["x", "y"]);

    let err = grouping
        .aggregate(&doc, 1.0)
        .expect_err("scalar level produced a vector");

    assert!(err.is_evaluation());
    assert!(grouping.tree().is_empty());
}

///
/// Diagnostics
///

#[test]
fn dump_lists_level_members_by_name() {
    let grouping = Grouping::new(vec![count_level("a").with_max_groups(2)]).with_id(7);

    let text = dump("grouping", &grouping);

    assert!(text.starts_with("grouping: Grouping {\n    id: 7\n"), "{text}");
    let level = concat!(
        "    levels[0]: GroupingLevel {\n",
        "        maxGroups: 2\n",
        "        precision: -1\n",
    );
    assert!(text.contains(level), "{text}");
    assert!(text.contains("        classify: Expression {"));
    assert!(!text.contains("filter"));
    assert!(text.contains("    rootCollect: <NULL>\n"));
}

#[test]
fn admissions_are_reported_to_the_metrics_sink() {
    let sink = Rc::new(RecordingSink::default());
    let levels = vec![count_level("a").with_max_groups(1)];
    let config = GroupingConfig::new().with_prune_policy(PrunePolicy::RejectWhenFull);

    with_metrics_sink(sink.clone(), || {
        let mut grouping = prepared(Grouping::new(levels).with_config(config));
        feed(&mut grouping, &[doc_ab("x", "-"), doc_ab("y", "-")]);
    });

    let events = sink.events.borrow();
    assert_eq!(
        *events,
        vec![
            MetricsEvent::Prepared { levels: 1 },
            MetricsEvent::GroupCreated { level: 0 },
            MetricsEvent::CapacityRejected {
                level: 0,
                frozen: false,
            },
        ]
    );
}
