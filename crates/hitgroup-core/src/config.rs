//! Module: config
//! Responsibility: grouping runtime policy (limit defaults, pruning policy,
//! wire-version opt-in, decode bounds).
//! Does not own: per-level limits carried by the request itself.

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_DECODE_BYTES: usize = 4 * 1024 * 1024;

///
/// PrunePolicy
///
/// What happens when a new key arrives at a level whose candidate window is
/// already full.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrunePolicy {
    /// Evict the least favorable candidate when the newcomer ranks above it.
    #[default]
    DisplaceLeastFavorable,
    /// Keep the first candidates seen; reject every later key.
    RejectWhenFull,
}

///
/// GroupingConfig
///
/// Runtime policy applied to one grouping. Request-carried limits
/// (`max_groups`, `precision`) always win over `default_max_groups`.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct GroupingConfig {
    /// Cap applied to levels that request unlimited groups; -1 keeps them unlimited.
    pub default_max_groups: i64,
    pub prune_policy: PrunePolicy,
    /// Encode filtered levels with the V2 layout and accept V2 on decode.
    pub allow_v2: bool,
    /// Upper bound for one encoded grouping request or expression payload.
    pub max_decode_bytes: usize,
}

impl GroupingConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            default_max_groups: -1,
            prune_policy: PrunePolicy::DisplaceLeastFavorable,
            allow_v2: false,
            max_decode_bytes: DEFAULT_MAX_DECODE_BYTES,
        }
    }

    #[must_use]
    pub const fn with_default_max_groups(mut self, max_groups: i64) -> Self {
        self.default_max_groups = max_groups;
        self
    }

    #[must_use]
    pub const fn with_prune_policy(mut self, policy: PrunePolicy) -> Self {
        self.prune_policy = policy;
        self
    }

    #[must_use]
    pub const fn with_allow_v2(mut self, allow_v2: bool) -> Self {
        self.allow_v2 = allow_v2;
        self
    }

    #[must_use]
    pub const fn with_max_decode_bytes(mut self, max_bytes: usize) -> Self {
        self.max_decode_bytes = max_bytes;
        self
    }
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self::new()
    }
}

///
/// TESTS
///
