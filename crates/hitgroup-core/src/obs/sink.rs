//! Metrics sink boundary.
//!
//! Grouping and codec logic MUST NOT touch obs::metrics directly.
//! All instrumentation flows through MetricsEvent and MetricsSink.
use crate::{codec::LevelWireTag, obs::metrics};
use std::{cell::RefCell, rc::Rc};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Rc<dyn MetricsSink>>> = RefCell::new(None);
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent {
    Prepared {
        levels: usize,
    },
    GroupCreated {
        level: usize,
    },
    CapacityRejected {
        level: usize,
        frozen: bool,
    },
    GroupEvicted {
        level: usize,
    },
    GroupsTrimmed {
        removed: u64,
    },
    LevelEncoded {
        tag: LevelWireTag,
    },
    LevelDecoded {
        tag: LevelWireTag,
        fallback: bool,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent);
}

/// GlobalMetricsSink
/// Default thread-local sink that writes into global metrics state.
/// Acts as the concrete sink when no scoped override is installed.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent) {
        match event {
            MetricsEvent::Prepared { levels } => {
                metrics::with_state_mut(|m| {
                    m.ops.prepare_calls = m.ops.prepare_calls.saturating_add(1);
                    let levels = u64::try_from(levels).unwrap_or(u64::MAX);
                    m.ops.levels_prepared = m.ops.levels_prepared.saturating_add(levels);
                });
            }

            MetricsEvent::GroupCreated { level } => {
                metrics::with_state_mut(|m| {
                    m.ops.groups_created = m.ops.groups_created.saturating_add(1);
                });
                metrics::with_level_mut(level, |entry| {
                    entry.groups_created = entry.groups_created.saturating_add(1);
                });
            }

            MetricsEvent::CapacityRejected { level, frozen } => {
                metrics::with_state_mut(|m| {
                    if frozen {
                        m.ops.frozen_rejections = m.ops.frozen_rejections.saturating_add(1);
                    } else {
                        m.ops.capacity_rejections = m.ops.capacity_rejections.saturating_add(1);
                    }
                });
                metrics::with_level_mut(level, |entry| {
                    if frozen {
                        entry.frozen_rejections = entry.frozen_rejections.saturating_add(1);
                    } else {
                        entry.capacity_rejections = entry.capacity_rejections.saturating_add(1);
                    }
                });
            }

            MetricsEvent::GroupEvicted { level } => {
                metrics::with_state_mut(|m| {
                    m.ops.groups_evicted = m.ops.groups_evicted.saturating_add(1);
                });
                metrics::with_level_mut(level, |entry| {
                    entry.groups_evicted = entry.groups_evicted.saturating_add(1);
                });
            }

            MetricsEvent::GroupsTrimmed { removed } => {
                metrics::with_state_mut(|m| {
                    m.ops.groups_trimmed = m.ops.groups_trimmed.saturating_add(removed);
                });
            }

            MetricsEvent::LevelEncoded { tag } => {
                metrics::with_state_mut(|m| match tag {
                    LevelWireTag::V1 => {
                        m.ops.levels_encoded_v1 = m.ops.levels_encoded_v1.saturating_add(1);
                    }
                    LevelWireTag::V2 => {
                        m.ops.levels_encoded_v2 = m.ops.levels_encoded_v2.saturating_add(1);
                    }
                });
            }

            MetricsEvent::LevelDecoded { tag, fallback } => {
                metrics::with_state_mut(|m| {
                    match tag {
                        LevelWireTag::V1 => {
                            m.ops.levels_decoded_v1 = m.ops.levels_decoded_v1.saturating_add(1);
                        }
                        LevelWireTag::V2 => {
                            m.ops.levels_decoded_v2 = m.ops.levels_decoded_v2.saturating_add(1);
                        }
                    }
                    if fallback {
                        m.ops.unknown_tag_fallbacks = m.ops.unknown_tag_fallbacks.saturating_add(1);
                    }
                });
            }
        }
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent) {
    let sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());
    match sink {
        Some(sink) => sink.record(event),
        None => GLOBAL_METRICS_SINK.record(event),
    }
}

/// Snapshot the current thread's metrics state.
#[must_use]
pub fn metrics_report() -> metrics::EventReport {
    metrics::report()
}

/// Reset all metrics state on the current thread.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override on this thread.
pub fn with_metrics_sink<T>(sink: Rc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Rc<dyn MetricsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let prev = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = prev;
            });
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(prev);

    f()
}

///
/// TESTS
///
