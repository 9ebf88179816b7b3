//! Deferred auction settlement.
//!
//! A single task owns a min-heap of `(end_ms, auction_id)` deadlines. New
//! auctions arrive over a bounded channel; on process start the heap is
//! rehydrated from the store so settlements survive restarts. Settlement
//! itself is idempotent (guarded by the auction row's state), so a
//! duplicate heap entry is harmless.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::auction::manager::AuctionManager;
use crate::auction::repository::SettleOutcome;
use crate::error::retry_transient;
use crate::metrics::Counters;
use crate::time::{Clock, from_ms, to_ms};

#[derive(Clone, Copy, Debug)]
pub struct PendingSettlement {
    pub auction_id: i64,
    pub end: DateTime<Utc>,
}

/// Producer half handed to the auction manager.
#[derive(Clone)]
pub struct SettlementQueue {
    tx: mpsc::Sender<PendingSettlement>,
}

impl SettlementQueue {
    /// Creates the queue and hands back the receiver for the scheduler.
    /// The manager is constructed against the queue first; the scheduler
    /// then attaches to the manager with the receiver.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<PendingSettlement>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn notify(&self, auction_id: i64, end: DateTime<Utc>) {
        if self
            .tx
            .try_send(PendingSettlement { auction_id, end })
            .is_err()
        {
            // Rehydration picks the auction up on the next restart.
            tracing::warn!(
                auction_id,
                "settlement queue unavailable; auction will settle after restart"
            );
        }
    }
}

/// Consumer half: the singleton timer task.
pub struct SettlementScheduler {
    manager: Arc<AuctionManager>,
    clock: Arc<dyn Clock>,
    rx: mpsc::Receiver<PendingSettlement>,
    heap: BinaryHeap<Reverse<(i64, i64)>>,
    counters: Counters,
}

impl SettlementScheduler {
    pub fn new(
        manager: Arc<AuctionManager>,
        clock: Arc<dyn Clock>,
        counters: Counters,
        rx: mpsc::Receiver<PendingSettlement>,
    ) -> Self {
        Self {
            manager,
            clock,
            rx,
            heap: BinaryHeap::new(),
            counters,
        }
    }

    /// Loads every Active auction's deadline from the store. Call once
    /// before `run`.
    pub async fn rehydrate(&mut self) -> crate::error::EngineResult<usize> {
        let pending = self
            .manager
            .list_active()
            .await?;

        let count = pending.len();
        for auction in pending {
            self.heap
                .push(Reverse((to_ms(auction.end), auction.auction_id)));
        }

        info!(count, "settlement scheduler rehydrated");
        Ok(count)
    }

    /// Runs until every `SettlementQueue` clone is dropped.
    pub async fn run(self) {
        let Self {
            manager,
            clock,
            mut rx,
            mut heap,
            counters,
        } = self;

        loop {
            match heap.peek().copied() {
                Some(Reverse((next_ms, _))) => {
                    let at = match from_ms(next_ms) {
                        Some(t) => t,
                        None => clock.now(),
                    };

                    tokio::select! {
                        item = rx.recv() => match item {
                            Some(p) => push(&mut heap, p),
                            None => break,
                        },
                        _ = clock.sleep_until(at) => {
                            fire_due(&manager, &clock, &mut heap, &counters).await;
                        }
                    }
                }
                None => match rx.recv().await {
                    Some(p) => push(&mut heap, p),
                    None => break,
                },
            }
        }

        debug!("settlement scheduler stopped");
    }
}

fn push(heap: &mut BinaryHeap<Reverse<(i64, i64)>>, p: PendingSettlement) {
    debug!(auction_id = p.auction_id, end = %p.end, "settlement scheduled");
    heap.push(Reverse((to_ms(p.end), p.auction_id)));
}

/// Settles everything whose deadline has passed.
async fn fire_due(
    manager: &AuctionManager,
    clock: &Arc<dyn Clock>,
    heap: &mut BinaryHeap<Reverse<(i64, i64)>>,
    counters: &Counters,
) {
    loop {
        let now_ms = to_ms(clock.now());
        match heap.peek().copied() {
            Some(Reverse((end_ms, auction_id))) if end_ms <= now_ms => {
                heap.pop();
                settle_one(manager, heap, counters, auction_id).await;
            }
            _ => break,
        }
    }
}

async fn settle_one(
    manager: &AuctionManager,
    heap: &mut BinaryHeap<Reverse<(i64, i64)>>,
    counters: &Counters,
    auction_id: i64,
) {
    match retry_transient("settle_auction", || manager.settle(auction_id)).await {
        Ok(SettleOutcome::NotDue { end }) => {
            // Anti-snipe moved the deadline while the entry sat in the heap.
            heap.push(Reverse((to_ms(end), auction_id)));
        }
        Ok(_) => {}
        Err(e) => {
            // Operator alert: the auction stays Active and is retried only
            // through restart rehydration.
            Counters::bump(&counters.settlements_failed);
            error!(
                auction_id,
                error = %e,
                "settlement failed after retries; auction remains active"
            );
        }
    }
}
