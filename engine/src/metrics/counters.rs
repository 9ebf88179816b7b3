use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Minimal counters for operational visibility.
#[derive(Clone, Default)]
pub struct Counters {
    pub price_computations: Arc<AtomicU64>,
    pub price_cache_hits: Arc<AtomicU64>,
    pub price_batches: Arc<AtomicU64>,

    pub claims_granted: Arc<AtomicU64>,
    pub claims_rejected: Arc<AtomicU64>,

    pub auctions_created: Arc<AtomicU64>,
    pub bids_placed: Arc<AtomicU64>,
    pub bids_rejected: Arc<AtomicU64>,
    pub settlements_completed: Arc<AtomicU64>,
    pub settlements_expired: Arc<AtomicU64>,
    pub settlements_failed: Arc<AtomicU64>,

    pub liquefactions: Arc<AtomicU64>,
    pub work_sessions: Arc<AtomicU64>,
    pub stats_runs: Arc<AtomicU64>,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// One log line with every counter, emitted periodically by the binary.
    pub fn log_snapshot(&self) {
        tracing::info!(
            target: "counters",
            price_computations = self.price_computations.load(Ordering::Relaxed),
            price_cache_hits = self.price_cache_hits.load(Ordering::Relaxed),
            price_batches = self.price_batches.load(Ordering::Relaxed),
            claims_granted = self.claims_granted.load(Ordering::Relaxed),
            claims_rejected = self.claims_rejected.load(Ordering::Relaxed),
            auctions_created = self.auctions_created.load(Ordering::Relaxed),
            bids_placed = self.bids_placed.load(Ordering::Relaxed),
            bids_rejected = self.bids_rejected.load(Ordering::Relaxed),
            settlements_completed = self.settlements_completed.load(Ordering::Relaxed),
            settlements_expired = self.settlements_expired.load(Ordering::Relaxed),
            settlements_failed = self.settlements_failed.load(Ordering::Relaxed),
            liquefactions = self.liquefactions.load(Ordering::Relaxed),
            work_sessions = self.work_sessions.load(Ordering::Relaxed),
            stats_runs = self.stats_runs.load(Ordering::Relaxed),
            "counter snapshot"
        );
    }
}
