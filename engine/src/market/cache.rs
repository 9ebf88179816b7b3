use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::EngineResult;
use crate::market::types::ComputedPrice;

struct CacheEntry {
    value: ComputedPrice,
    stored_at: Instant,
}

/// Time-bounded price cache with per-key single-flight.
///
/// Reads never suspend. On a miss, the first caller computes behind a
/// per-card async mutex while concurrent callers for the same card queue on
/// that mutex and pick up the freshly stored entry instead of recomputing.
pub struct PriceCache {
    ttl: Duration,
    entries: Mutex<HashMap<i64, CacheEntry>>,
    inflight: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached price when still inside the TTL.
    pub fn get_fresh(&self, card_id: i64) -> Option<ComputedPrice> {
        let g = self.entries.lock();
        g.get(&card_id)
            .filter(|e| e.stored_at.elapsed() <= self.ttl)
            .map(|e| e.value.clone())
    }

    /// Stores a computed price, replacing any previous entry.
    pub fn insert(&self, value: ComputedPrice) {
        let mut g = self.entries.lock();
        g.insert(
            value.card_id,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, card_id: i64) {
        self.entries.lock().remove(&card_id);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Cache-or-compute with single-flight deduplication.
    ///
    /// At most one `compute` for a given card id runs at a time; callers
    /// that queued behind it re-check the cache before computing, so N
    /// concurrent misses produce exactly one computation.
    pub async fn get_or_compute<F, Fut>(
        &self,
        card_id: i64,
        compute: F,
    ) -> EngineResult<ComputedPrice>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = EngineResult<ComputedPrice>>,
    {
        if let Some(hit) = self.get_fresh(card_id) {
            return Ok(hit);
        }

        let gate = {
            let mut g = self.inflight.lock();
            g.entry(card_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let _guard = gate.lock().await;

        // A queued caller lands here after the leader stored the entry.
        if let Some(hit) = self.get_fresh(card_id) {
            return Ok(hit);
        }

        let result = compute().await;

        if let Ok(value) = &result {
            self.insert(value.clone());
        }

        // Late arrivals may create a new gate; queued holders of this one
        // still serialize among themselves and re-check the cache first.
        self.inflight.lock().remove(&card_id);

        result
    }
}
