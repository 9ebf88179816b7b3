use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::AnyPool;

use crate::config::RewardSpec;
use crate::db::ops;
use crate::time::to_ms;
use crate::work::repository::WorkRepo;

/// SQLx-backed implementation of WorkRepo.
pub struct SqlxWorkRepo {
    pool: AnyPool,
}

impl SqlxWorkRepo {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkRepo for SqlxWorkRepo {
    async fn apply_outcome(
        &self,
        user_id: &str,
        rewards: RewardSpec,
        items: &[String],
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("apply_outcome begin")?;

        if !ops::credit_rewards(&mut *tx, user_id, rewards.flakes, rewards.vials, rewards.xp)
            .await?
        {
            tx.rollback().await.ok();
            return Ok(false);
        }

        sqlx::query("UPDATE users SET last_work_ms = ? WHERE user_id = ?;")
            .bind(to_ms(now))
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("stamp last_work user={user_id}"))?;

        for item in items {
            ops::grant_item(&mut *tx, user_id, item, 1).await?;
        }

        tx.commit().await.context("apply_outcome commit")?;
        Ok(true)
    }
}
