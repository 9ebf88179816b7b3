use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use crate::inventory::model::CardAggregates;
use crate::market::history::{MarketHistoryRepo, MarketSample};
use crate::market::types::PriceFactors;
use crate::time::{from_ms, to_ms};

/// SQLx-backed implementation of MarketHistoryRepo.
pub struct SqlxMarketHistoryRepo {
    pool: AnyPool,
}

impl SqlxMarketHistoryRepo {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

const SAMPLE_COLUMNS: &str = "card_id, created_ms, price, \
  scarcity, distribution, hoarding, activity, \
  total_copies, active_copies, unique_owners, active_owners, max_per_user, avg_per_user, \
  price_change_percent, price_reason";

#[async_trait]
impl MarketHistoryRepo for SqlxMarketHistoryRepo {
    async fn latest(&self, card_id: i64) -> Result<Option<MarketSample>> {
        let row = sqlx::query(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM card_market_history WHERE card_id = ? ORDER BY created_ms DESC LIMIT 1;"
        ))
        .bind(card_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("latest market sample card={card_id}"))?;

        match row {
            Some(r) => Ok(Some(row_to_sample(&r)?)),
            None => Ok(None),
        }
    }

    async fn in_range(&self, card_id: i64, since: DateTime<Utc>) -> Result<Vec<MarketSample>> {
        let rows = sqlx::query(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM card_market_history WHERE card_id = ? AND created_ms >= ? ORDER BY created_ms;"
        ))
        .bind(card_id)
        .bind(to_ms(since))
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("market samples in range card={card_id}"))?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            match row_to_sample(&r) {
                Ok(s) => out.push(s),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed market sample");
                }
            }
        }

        Ok(out)
    }

    async fn append(&self, s: &MarketSample) -> Result<()> {
        sqlx::query(
            r#"
INSERT INTO card_market_history (
  history_id, card_id, created_ms, price,
  scarcity, distribution, hoarding, activity,
  total_copies, active_copies, unique_owners, active_owners, max_per_user, avg_per_user,
  price_change_percent, price_reason
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?);
"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(s.card_id)
        .bind(to_ms(s.created_at))
        .bind(s.price)
        .bind(s.factors.scarcity)
        .bind(s.factors.distribution)
        .bind(s.factors.hoarding)
        .bind(s.factors.activity)
        .bind(s.aggregates.total_copies)
        .bind(s.aggregates.active_copies)
        .bind(s.aggregates.unique_owners)
        .bind(s.aggregates.active_owners)
        .bind(s.aggregates.max_per_user)
        .bind(s.aggregates.avg_per_user)
        .bind(s.price_change_percent)
        .bind(s.price_reason.as_str())
        .execute(&self.pool)
        .await
        .with_context(|| format!("append market sample card={}", s.card_id))?;

        Ok(())
    }
}

fn row_to_sample(r: &sqlx::any::AnyRow) -> Result<MarketSample> {
    let created_at = from_ms(r.get::<i64, _>("created_ms"))
        .ok_or_else(|| anyhow::anyhow!("created_ms out of range"))?;

    Ok(MarketSample {
        card_id: r.get::<i64, _>("card_id"),
        created_at,
        price: r.get::<i64, _>("price"),
        factors: PriceFactors {
            scarcity: r.get::<f64, _>("scarcity"),
            distribution: r.get::<f64, _>("distribution"),
            hoarding: r.get::<f64, _>("hoarding"),
            activity: r.get::<f64, _>("activity"),
        },
        aggregates: CardAggregates {
            card_id: r.get::<i64, _>("card_id"),
            total_copies: r.get::<i64, _>("total_copies"),
            active_copies: r.get::<i64, _>("active_copies"),
            unique_owners: r.get::<i64, _>("unique_owners"),
            active_owners: r.get::<i64, _>("active_owners"),
            max_per_user: r.get::<i64, _>("max_per_user"),
            avg_per_user: r.get::<f64, _>("avg_per_user"),
        },
        price_change_percent: r.get::<f64, _>("price_change_percent"),
        price_reason: r.get::<String, _>("price_reason"),
    })
}
