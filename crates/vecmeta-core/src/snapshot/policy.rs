//! Retention policies for superseded snapshots.
//!
//! Consulted by the holder on every add and eviction pass. A refcount above
//! zero always vetoes ejection regardless of policy.

use vecmeta_store::now_us;

use crate::config::{PolicyKind, SnapshotConfig};

/// What the holder knows about an ejection candidate.
#[derive(Debug, Clone, Copy)]
pub struct EjectContext {
    /// Number of snapshots in the holder newer than the candidate (the
    /// active snapshot counts).
    pub newer_than: usize,
    /// Age of the candidate in microseconds, by `updated_on`.
    pub age_us: i64,
}

pub trait SnapshotPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether a superseded, unpinned snapshot should stay cached.
    fn should_keep(&self, ctx: &EjectContext) -> bool;
}

/// Keep the `keep` most recent snapshots, active included. `keep = 1`
/// retains only the active snapshot.
#[derive(Debug, Clone, Copy)]
pub struct NumPolicy {
    keep: usize,
}

impl NumPolicy {
    pub fn new(keep: usize) -> Self {
        NumPolicy { keep: keep.max(1) }
    }
}

impl SnapshotPolicy for NumPolicy {
    fn name(&self) -> &'static str {
        "num"
    }

    fn should_keep(&self, ctx: &EjectContext) -> bool {
        ctx.newer_than < self.keep
    }
}

/// Keep superseded snapshots younger than a fixed window.
#[derive(Debug, Clone, Copy)]
pub struct DurationPolicy {
    window_us: i64,
}

impl DurationPolicy {
    pub fn new(window_us: i64) -> Self {
        DurationPolicy { window_us }
    }
}

impl SnapshotPolicy for DurationPolicy {
    fn name(&self) -> &'static str {
        "duration"
    }

    fn should_keep(&self, ctx: &EjectContext) -> bool {
        ctx.age_us <= self.window_us
    }
}

/// Build the configured policy.
pub fn build_policy(config: &SnapshotConfig) -> Box<dyn SnapshotPolicy> {
    match config.policy {
        PolicyKind::Num => Box::new(NumPolicy::new(config.keep_num)),
        PolicyKind::Duration => Box::new(DurationPolicy::new(
            (config.duration_secs as i64).saturating_mul(1_000_000),
        )),
    }
}

/// Context for a candidate with `newer_than` newer snapshots, aged from its
/// `updated_on` timestamp.
pub(crate) fn eject_context(newer_than: usize, updated_on: i64) -> EjectContext {
    EjectContext {
        newer_than,
        age_us: now_us().saturating_sub(updated_on),
    }
}
