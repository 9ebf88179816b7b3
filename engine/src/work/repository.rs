use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::RewardSpec;

#[async_trait]
pub trait WorkRepo: Send + Sync {
    /// Credits the reward line, stamps `last_work`, and grants any item
    /// drops in one transaction. `false` when the user row is absent.
    async fn apply_outcome(
        &self,
        user_id: &str,
        rewards: RewardSpec,
        items: &[String],
        now: DateTime<Utc>,
    ) -> Result<bool>;
}
