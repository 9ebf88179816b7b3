use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::users::model::User;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<User>>;

    /// Fetches the user, creating the row with zeroed balances on first
    /// interaction.
    async fn get_or_create(&self, user_id: &str, username: &str, now: DateTime<Utc>)
    -> Result<User>;

    /// Applies `delta` to the flake balance iff the result stays
    /// non-negative. Returns `false` on the guard miss.
    async fn update_balance(&self, user_id: &str, delta: i64) -> Result<bool>;

    async fn update_last_daily(&self, user_id: &str, at: DateTime<Utc>) -> Result<()>;

    async fn update_last_work(&self, user_id: &str, at: DateTime<Utc>) -> Result<()>;

    async fn list(&self) -> Result<Vec<User>>;
}
