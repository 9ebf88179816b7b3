use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{AnyPool, Row};

use crate::claim::model::ClaimInfo;
use crate::claim::repository::{ClaimApplyOutcome, ClaimRepo};
use crate::db::ops;
use crate::time::{from_ms, to_ms};

/// SQLx-backed implementation of ClaimRepo.
pub struct SqlxClaimRepo {
    pool: AnyPool,
}

impl SqlxClaimRepo {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClaimRepo for SqlxClaimRepo {
    async fn get_info(&self, user_id: &str) -> Result<Option<ClaimInfo>> {
        let row = sqlx::query(
            "SELECT user_id, claims_today, total_spent_today, window_start_ms FROM claim_stats WHERE user_id = ?;",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("get claim info user={user_id}"))?;

        match row {
            Some(r) => Ok(Some(row_to_info(&r)?)),
            None => Ok(None),
        }
    }

    async fn claims_in_period(&self, user_id: &str, since: DateTime<Utc>) -> Result<i64> {
        let info = self.get_info(user_id).await?;
        Ok(match info {
            Some(info) => match info.window_start {
                Some(anchor) if anchor >= since => info.claims_today,
                _ => 0,
            },
            None => 0,
        })
    }

    async fn apply_claim(
        &self,
        user_id: &str,
        total_cost: i64,
        card_ids: &[i64],
        now: DateTime<Utc>,
        new_window_start: Option<DateTime<Utc>>,
    ) -> Result<ClaimApplyOutcome> {
        let mut tx = self.pool.begin().await.context("apply_claim begin")?;

        if !ops::debit_flakes(&mut *tx, user_id, total_cost).await? {
            tx.rollback().await.ok();
            return Ok(ClaimApplyOutcome::InsufficientFunds);
        }

        for card_id in card_ids {
            if !ops::adjust_user_card(&mut *tx, user_id, *card_id, 1, to_ms(now)).await? {
                anyhow::bail!("claim grant failed user={user_id} card={card_id}");
            }
        }

        let granted = card_ids.len() as i64;

        let updated = match new_window_start {
            Some(anchor) => sqlx::query(
                r#"
UPDATE claim_stats
SET claims_today = ?, total_spent_today = ?, window_start_ms = ?
WHERE user_id = ?;
"#,
            )
            .bind(granted)
            .bind(total_cost)
            .bind(to_ms(anchor))
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("restart claim window user={user_id}"))?,
            None => sqlx::query(
                r#"
UPDATE claim_stats
SET claims_today = claims_today + ?, total_spent_today = total_spent_today + ?
WHERE user_id = ?;
"#,
            )
            .bind(granted)
            .bind(total_cost)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("bump claim counters user={user_id}"))?,
        };

        if updated.rows_affected() == 0 {
            sqlx::query(
                r#"
INSERT INTO claim_stats (user_id, claims_today, total_spent_today, window_start_ms)
VALUES (?, ?, ?, ?);
"#,
            )
            .bind(user_id)
            .bind(granted)
            .bind(total_cost)
            .bind(to_ms(new_window_start.unwrap_or(now)))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("insert claim_stats user={user_id}"))?;
        }

        tx.commit().await.context("apply_claim commit")?;
        Ok(ClaimApplyOutcome::Applied)
    }

    async fn reset_daily(&self, user_id: &str, now: DateTime<Utc>) -> Result<()> {
        let mut tx = self.pool.begin().await.context("reset_daily begin")?;
        reset_daily_in_tx(&mut tx, user_id, now).await?;
        tx.commit().await.context("reset_daily commit")?;
        Ok(())
    }

    async fn apply_daily(
        &self,
        user_id: &str,
        reward_flakes: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("apply_daily begin")?;

        if !ops::credit_flakes(&mut *tx, user_id, reward_flakes).await? {
            tx.rollback().await.ok();
            return Ok(false);
        }

        sqlx::query("UPDATE users SET last_daily_ms = ? WHERE user_id = ?;")
            .bind(to_ms(now))
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("stamp last_daily user={user_id}"))?;

        reset_daily_in_tx(&mut tx, user_id, now).await?;

        tx.commit().await.context("apply_daily commit")?;
        Ok(true)
    }
}

async fn reset_daily_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Any>,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let updated = sqlx::query(
        r#"
UPDATE claim_stats
SET claims_today = 0, total_spent_today = 0, window_start_ms = ?
WHERE user_id = ?;
"#,
    )
    .bind(to_ms(now))
    .bind(user_id)
    .execute(&mut **tx)
    .await
    .with_context(|| format!("reset claim_stats user={user_id}"))?;

    if updated.rows_affected() == 0 {
        sqlx::query(
            r#"
INSERT INTO claim_stats (user_id, claims_today, total_spent_today, window_start_ms)
VALUES (?, 0, 0, ?);
"#,
        )
        .bind(user_id)
        .bind(to_ms(now))
        .execute(&mut **tx)
        .await
        .with_context(|| format!("insert claim_stats user={user_id}"))?;
    }

    Ok(())
}

fn row_to_info(r: &sqlx::any::AnyRow) -> Result<ClaimInfo> {
    let window_start = match r.get::<Option<i64>, _>("window_start_ms") {
        Some(ms) => {
            Some(from_ms(ms).ok_or_else(|| anyhow::anyhow!("window_start_ms out of range"))?)
        }
        None => None,
    };

    Ok(ClaimInfo {
        user_id: r.get::<String, _>("user_id"),
        claims_today: r.get::<i64, _>("claims_today"),
        total_spent_today: r.get::<i64, _>("total_spent_today"),
        window_start,
    })
}
