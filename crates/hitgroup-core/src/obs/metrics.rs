use serde::{Deserialize, Serialize};
use std::{cell::RefCell, collections::BTreeMap};

///
/// EventState
/// Ephemeral, in-memory counters for grouping passes and level codecs.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub(crate) struct EventState {
    pub(crate) ops: EventOps,
    pub(crate) levels: BTreeMap<usize, LevelCounters>,
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventOps {
    // Lifecycle
    pub prepare_calls: u64,
    pub levels_prepared: u64,
    pub groups_trimmed: u64,

    // Admission
    pub groups_created: u64,
    pub groups_evicted: u64,
    pub capacity_rejections: u64,
    pub frozen_rejections: u64,

    // Wire codec
    pub levels_encoded_v1: u64,
    pub levels_encoded_v2: u64,
    pub levels_decoded_v1: u64,
    pub levels_decoded_v2: u64,
    pub unknown_tag_fallbacks: u64,
}

///
/// LevelCounters
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct LevelCounters {
    pub groups_created: u64,
    pub groups_evicted: u64,
    pub capacity_rejections: u64,
    pub frozen_rejections: u64,
}

///
/// EventReport
/// Point-in-time snapshot of the counters on this thread.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    pub counters: EventOps,
    pub level_counters: Vec<(usize, LevelCounters)>,
}

thread_local! {
    static EVENT_STATE: RefCell<EventState> = RefCell::new(EventState::default());
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&m.borrow()))
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&mut m.borrow_mut()))
}

/// Borrow one level's counters mutably, creating them on first use.
pub(crate) fn with_level_mut<R>(level: usize, f: impl FnOnce(&mut LevelCounters) -> R) -> R {
    with_state_mut(|m| f(m.levels.entry(level).or_default()))
}

/// Reset all counters.
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

/// Snapshot the counters.
#[must_use]
pub(crate) fn report() -> EventReport {
    with_state(|m| EventReport {
        counters: m.ops.clone(),
        level_counters: m
            .levels
            .iter()
            .map(|(level, counters)| (*level, counters.clone()))
            .collect(),
    })
}
