use anyhow::Result;
use async_trait::async_trait;

use crate::stats::model::EconomyStats;

#[async_trait]
pub trait EconomyStatsRepo: Send + Sync {
    async fn latest(&self) -> Result<Option<EconomyStats>>;

    /// The most recent snapshots, newest first, capped at `limit`.
    async fn recent(&self, limit: usize) -> Result<Vec<EconomyStats>>;

    async fn create(&self, snapshot: &EconomyStats) -> Result<()>;
}
