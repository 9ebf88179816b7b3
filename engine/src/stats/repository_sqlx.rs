use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use crate::stats::model::{EconomyStats, Quantiles, WealthBuckets};
use crate::stats::repository::EconomyStatsRepo;
use crate::time::{from_ms, to_ms};

/// SQLx-backed implementation of EconomyStatsRepo.
pub struct SqlxEconomyStatsRepo {
    pool: AnyPool,
}

impl SqlxEconomyStatsRepo {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

const STATS_COLUMNS: &str = "created_ms, total_users, active_users, total_flakes, total_card_value, \
  bottom_flakes, median_flakes, top_flakes, \
  bottom_card_value, median_card_value, top_card_value, \
  gini_flakes, buckets, health_score, CAST(correction_active AS INTEGER) AS correction_i64";

#[async_trait]
impl EconomyStatsRepo for SqlxEconomyStatsRepo {
    async fn latest(&self) -> Result<Option<EconomyStats>> {
        let row = sqlx::query(&format!(
            "SELECT {STATS_COLUMNS} FROM economy_stats ORDER BY created_ms DESC LIMIT 1;"
        ))
        .fetch_optional(&self.pool)
        .await
        .context("latest economy snapshot")?;

        match row {
            Some(r) => Ok(Some(row_to_stats(&r)?)),
            None => Ok(None),
        }
    }

    async fn recent(&self, limit: usize) -> Result<Vec<EconomyStats>> {
        let rows = sqlx::query(&format!(
            "SELECT {STATS_COLUMNS} FROM economy_stats ORDER BY created_ms DESC LIMIT ?;"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("recent economy snapshots")?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            match row_to_stats(&r) {
                Ok(s) => out.push(s),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed economy snapshot");
                }
            }
        }

        Ok(out)
    }

    async fn create(&self, s: &EconomyStats) -> Result<()> {
        let buckets_json =
            serde_json::to_string(&s.buckets).context("serialize wealth buckets")?;

        sqlx::query(
            r#"
INSERT INTO economy_stats (
  stats_id, created_ms, total_users, active_users, total_flakes, total_card_value,
  bottom_flakes, median_flakes, top_flakes,
  bottom_card_value, median_card_value, top_card_value,
  gini_flakes, buckets, health_score, correction_active
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?);
"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(to_ms(s.created_at))
        .bind(s.total_users)
        .bind(s.active_users)
        .bind(s.total_flakes)
        .bind(s.total_card_value)
        .bind(s.flakes.bottom)
        .bind(s.flakes.median)
        .bind(s.flakes.top)
        .bind(s.card_value.bottom)
        .bind(s.card_value.median)
        .bind(s.card_value.top)
        .bind(s.gini_flakes)
        .bind(buckets_json)
        .bind(s.health_score)
        .bind(s.correction_active as i64)
        .execute(&self.pool)
        .await
        .context("insert economy snapshot")?;

        Ok(())
    }
}

fn row_to_stats(r: &sqlx::any::AnyRow) -> Result<EconomyStats> {
    let created_at = from_ms(r.get::<i64, _>("created_ms"))
        .ok_or_else(|| anyhow::anyhow!("created_ms out of range"))?;

    let buckets_json: String = r.get("buckets");
    let buckets: WealthBuckets =
        serde_json::from_str(&buckets_json).context("malformed wealth buckets")?;

    Ok(EconomyStats {
        created_at,
        total_users: r.get::<i64, _>("total_users"),
        active_users: r.get::<i64, _>("active_users"),
        total_flakes: r.get::<i64, _>("total_flakes"),
        total_card_value: r.get::<i64, _>("total_card_value"),
        flakes: Quantiles {
            bottom: r.get::<i64, _>("bottom_flakes"),
            median: r.get::<i64, _>("median_flakes"),
            top: r.get::<i64, _>("top_flakes"),
        },
        card_value: Quantiles {
            bottom: r.get::<i64, _>("bottom_card_value"),
            median: r.get::<i64, _>("median_card_value"),
            top: r.get::<i64, _>("top_card_value"),
        },
        gini_flakes: r.get::<f64, _>("gini_flakes"),
        buckets,
        health_score: r.get::<f64, _>("health_score"),
        correction_active: r.get::<i64, _>("correction_i64") != 0,
    })
}
