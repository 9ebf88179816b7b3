use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::claim::model::ClaimInfo;

/// Result of the single claim transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimApplyOutcome {
    Applied,
    /// The balance moved below the total between the engine's read and the
    /// guarded debit.
    InsufficientFunds,
}

#[async_trait]
pub trait ClaimRepo: Send + Sync {
    async fn get_info(&self, user_id: &str) -> Result<Option<ClaimInfo>>;

    /// Claims counted against the user since `since`, honoring the window
    /// anchor. Derived from the per-user counters; no per-claim rows exist.
    async fn claims_in_period(&self, user_id: &str, since: DateTime<Utc>) -> Result<i64>;

    /// The whole multi-claim in one transaction: guarded debit of
    /// `total_cost`, one inventory increment per granted card id, and the
    /// claim counters bumped. `new_window_start` restarts the rolling
    /// window instead of accumulating. Any failure rolls everything back.
    async fn apply_claim(
        &self,
        user_id: &str,
        total_cost: i64,
        card_ids: &[i64],
        now: DateTime<Utc>,
        new_window_start: Option<DateTime<Utc>>,
    ) -> Result<ClaimApplyOutcome>;

    /// Zeroes the claim counters. Invoked by the daily reward operation,
    /// never by a timer.
    async fn reset_daily(&self, user_id: &str, now: DateTime<Utc>) -> Result<()>;

    /// The daily reward in one transaction: stipend credited, `last_daily`
    /// stamped, claim counters reset. `false` when the user row is absent.
    async fn apply_daily(
        &self,
        user_id: &str,
        reward_flakes: i64,
        now: DateTime<Utc>,
    ) -> Result<bool>;
}
