use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::inventory::model::{CardAggregates, Holding, UserCard};

#[async_trait]
pub trait UserCardRepo: Send + Sync {
    async fn get(&self, user_id: &str, card_id: i64) -> Result<Option<UserCard>>;

    async fn get_all_by_user(&self, user_id: &str) -> Result<Vec<UserCard>>;

    /// Atomically applies `delta` to the row amount, creating the row for a
    /// positive delta. Returns `false` when the result would go negative.
    async fn adjust(
        &self,
        user_id: &str,
        card_id: i64,
        delta: i64,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Inventory joined with the catalog for one user. Zero-amount rows are
    /// filtered out.
    async fn holdings_with_cards(&self, user_id: &str) -> Result<Vec<Holding>>;

    /// Distribution aggregates for up to a chunk of card ids in one
    /// round-trip. Cards with no inventory rows are absent from the result.
    async fn aggregates_for(
        &self,
        card_ids: &[i64],
        active_since: DateTime<Utc>,
    ) -> Result<Vec<CardAggregates>>;
}
