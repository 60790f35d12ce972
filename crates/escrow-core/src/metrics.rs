//! Global atomic counters for the escrow ledger.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. before a CLI invocation exits).

use std::sync::atomic::{AtomicU64, Ordering};

use escrow_state::Balance;

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations, no locking.
pub struct Metrics {
    agents_registered: AtomicU64,
    engagements_created: AtomicU64,
    engagements_completed: AtomicU64,
    operations_rejected: AtomicU64,
    transfers_rolled_back: AtomicU64,
    commits_deferred: AtomicU64,
    volume_escrowed: AtomicU64,
    volume_released: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            agents_registered: AtomicU64::new(0),
            engagements_created: AtomicU64::new(0),
            engagements_completed: AtomicU64::new(0),
            operations_rejected: AtomicU64::new(0),
            transfers_rolled_back: AtomicU64::new(0),
            commits_deferred: AtomicU64::new(0),
            volume_escrowed: AtomicU64::new(0),
            volume_released: AtomicU64::new(0),
        }
    }

    pub fn inc_agents_registered(&self) {
        self.agents_registered.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "agents_registered", "counter incremented");
    }

    /// Count a new engagement and the amount pulled into custody for it.
    pub fn record_engagement_created(&self, payment: Balance) {
        self.engagements_created.fetch_add(1, Ordering::Relaxed);
        self.volume_escrowed.fetch_add(payment, Ordering::Relaxed);
        tracing::trace!(metric = "engagements_created", "counter incremented");
    }

    /// Count a settlement and the amount released from custody.
    pub fn record_engagement_completed(&self, payment: Balance) {
        self.engagements_completed.fetch_add(1, Ordering::Relaxed);
        self.volume_released.fetch_add(payment, Ordering::Relaxed);
        tracing::trace!(metric = "engagements_completed", "counter incremented");
    }

    pub fn inc_rejected(&self) {
        self.operations_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "operations_rejected", "counter incremented");
    }

    pub fn inc_rolled_back(&self) {
        self.transfers_rolled_back.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "transfers_rolled_back", "counter incremented");
    }

    pub fn inc_commits_deferred(&self) {
        self.commits_deferred.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "commits_deferred", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            agents_registered = self.agents_registered(),
            engagements_created = self.engagements_created(),
            engagements_completed = self.engagements_completed(),
            operations_rejected = self.operations_rejected(),
            transfers_rolled_back = self.transfers_rolled_back(),
            commits_deferred = self.commits_deferred(),
            volume_escrowed = self.volume_escrowed(),
            volume_released = self.volume_released(),
        );
    }

    pub fn agents_registered(&self) -> u64 {
        self.agents_registered.load(Ordering::Relaxed)
    }

    pub fn engagements_created(&self) -> u64 {
        self.engagements_created.load(Ordering::Relaxed)
    }

    pub fn engagements_completed(&self) -> u64 {
        self.engagements_completed.load(Ordering::Relaxed)
    }

    pub fn operations_rejected(&self) -> u64 {
        self.operations_rejected.load(Ordering::Relaxed)
    }

    pub fn transfers_rolled_back(&self) -> u64 {
        self.transfers_rolled_back.load(Ordering::Relaxed)
    }

    pub fn commits_deferred(&self) -> u64 {
        self.commits_deferred.load(Ordering::Relaxed)
    }

    /// Total ever pulled into custody.
    pub fn volume_escrowed(&self) -> u64 {
        self.volume_escrowed.load(Ordering::Relaxed)
    }

    /// Total ever released to agents.
    pub fn volume_released(&self) -> u64 {
        self.volume_released.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.agents_registered,
            &self.engagements_created,
            &self.engagements_completed,
            &self.operations_rejected,
            &self.transfers_rolled_back,
            &self.commits_deferred,
            &self.volume_escrowed,
            &self.volume_released,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_agents_registered();
        m.record_engagement_created(300);
        m.record_engagement_created(200);
        m.record_engagement_completed(300);
        m.inc_rejected();

        assert_eq!(m.agents_registered(), 1);
        assert_eq!(m.engagements_created(), 2);
        assert_eq!(m.volume_escrowed(), 500);
        assert_eq!(m.engagements_completed(), 1);
        assert_eq!(m.volume_released(), 300);
        assert_eq!(m.operations_rejected(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_agents_registered();
        m.record_engagement_created(10);
        m.inc_rolled_back();
        m.inc_commits_deferred();
        m.reset();
        assert_eq!(m.agents_registered(), 0);
        assert_eq!(m.volume_escrowed(), 0);
        assert_eq!(m.transfers_rolled_back(), 0);
        assert_eq!(m.commits_deferred(), 0);
    }
}
