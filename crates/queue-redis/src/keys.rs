//! Key layout for one queue's state, all namespaced under `djq:{queue}:*`.
//!
//! Mirrors the per-queue key family in
//! `other_examples/b9ccacef_dimfeld-ergo__queues-lib.rs.rs` (`erq:{queue}:pending`,
//! `:scheduled`, `:processing`, `:job:{id}` etc.) with the additional
//! completed/failed/paused/repeat keys this spec's job lifecycle needs.

pub struct QueueKeys {
    prefix: String,
}

impl QueueKeys {
    pub fn new(queue: &str) -> Self {
        Self {
            prefix: format!("djq:{queue}"),
        }
    }

    /// Sorted set of job ids ready to run, scored by
    /// `priority * 10^13 + created_at_ms` so `ZPOPMIN` yields the
    /// highest-priority, oldest job first.
    pub fn waiting(&self) -> String {
        format!("{}:waiting", self.prefix)
    }

    /// Sorted set of delayed job ids, scored by their visible-at timestamp.
    pub fn delayed(&self) -> String {
        format!("{}:delayed", self.prefix)
    }

    /// Sorted set of active job ids, scored by lease expiry — a reaper can
    /// scan this for jobs whose owning worker went silent.
    pub fn active(&self) -> String {
        format!("{}:active", self.prefix)
    }

    pub fn completed(&self) -> String {
        format!("{}:completed", self.prefix)
    }

    pub fn failed(&self) -> String {
        format!("{}:failed", self.prefix)
    }

    pub fn paused(&self) -> String {
        format!("{}:paused", self.prefix)
    }

    pub fn job(&self, job_id: &str) -> String {
        format!("{}:job:{}", self.prefix, job_id)
    }

    /// `"djq:{queue}:job:"` — the prefix Lua scripts append a job id to
    /// when they only have the id, not the full key, in hand.
    pub fn job_prefix(&self) -> String {
        format!("{}:job:", self.prefix)
    }

    /// Marks the most recently scheduled instance of a repeatable job id,
    /// so re-registering the same repeat config is a no-op while one
    /// instance is still live (spec.md §8 "at most one live instance").
    pub fn repeat(&self, repeat_job_id: &str) -> String {
        format!("{}:repeat:{}", self.prefix, repeat_job_id)
    }
}
