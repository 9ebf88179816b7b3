use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::AnyPool;

use crate::db::ops;
use crate::time::to_ms;
use crate::vial::repository::{LiquefyOutcome, VialRepo};

/// SQLx-backed implementation of VialRepo.
pub struct SqlxVialRepo {
    pool: AnyPool,
}

impl SqlxVialRepo {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VialRepo for SqlxVialRepo {
    async fn apply_liquefy(
        &self,
        user_id: &str,
        card_id: i64,
        vials_gained: i64,
        now: DateTime<Utc>,
    ) -> Result<LiquefyOutcome> {
        let mut tx = self.pool.begin().await.context("apply_liquefy begin")?;

        if !ops::adjust_user_card(&mut *tx, user_id, card_id, -1, to_ms(now)).await? {
            tx.rollback().await.ok();
            return Ok(LiquefyOutcome::NoCopy);
        }

        if !ops::credit_vials(&mut *tx, user_id, vials_gained).await? {
            anyhow::bail!("vial credit to missing user {user_id}");
        }

        tx.commit().await.context("apply_liquefy commit")?;
        Ok(LiquefyOutcome::Applied)
    }
}
