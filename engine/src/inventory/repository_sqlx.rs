use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{AnyPool, QueryBuilder, Row};

use crate::catalog::repository_sqlx::row_to_card;
use crate::db::ops;
use crate::inventory::model::{CardAggregates, Holding, UserCard};
use crate::inventory::repository::UserCardRepo;
use crate::time::{from_ms, to_ms};

/// SQLx-backed implementation of UserCardRepo.
pub struct SqlxUserCardRepo {
    pool: AnyPool,
}

impl SqlxUserCardRepo {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

const USER_CARD_COLUMNS: &str = "user_id, card_id, amount, \
  CAST(favorite AS INTEGER) AS favorite_i64, \
  CAST(locked AS INTEGER) AS locked_i64, \
  obtained_ms";

#[async_trait]
impl UserCardRepo for SqlxUserCardRepo {
    async fn get(&self, user_id: &str, card_id: i64) -> Result<Option<UserCard>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_CARD_COLUMNS} FROM user_cards WHERE user_id = ? AND card_id = ? AND amount > 0;"
        ))
        .bind(user_id)
        .bind(card_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("get user_card user={user_id} card={card_id}"))?;

        match row {
            Some(r) => Ok(Some(row_to_user_card(&r)?)),
            None => Ok(None),
        }
    }

    async fn get_all_by_user(&self, user_id: &str) -> Result<Vec<UserCard>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_CARD_COLUMNS} FROM user_cards WHERE user_id = ? AND amount > 0 ORDER BY card_id;"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("list user_cards user={user_id}"))?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            match row_to_user_card(&r) {
                Ok(uc) => out.push(uc),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed user_card row");
                }
            }
        }

        Ok(out)
    }

    async fn adjust(
        &self,
        user_id: &str,
        card_id: i64,
        delta: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .with_context(|| format!("adjust begin user={user_id} card={card_id}"))?;

        let ok = ops::adjust_user_card(&mut *tx, user_id, card_id, delta, to_ms(now)).await?;
        if !ok {
            tx.rollback().await.ok();
            return Ok(false);
        }

        tx.commit()
            .await
            .with_context(|| format!("adjust commit user={user_id} card={card_id}"))?;
        Ok(true)
    }

    async fn holdings_with_cards(&self, user_id: &str) -> Result<Vec<Holding>> {
        let rows = sqlx::query(
            r#"
SELECT c.card_id, c.name, c.collection_id, c.level,
  CAST(c.animated AS INTEGER) AS animated_i64, c.tags,
  uc.amount
FROM user_cards uc
JOIN cards c ON c.card_id = uc.card_id
WHERE uc.user_id = ? AND uc.amount > 0
ORDER BY c.card_id;
"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("holdings user={user_id}"))?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            match row_to_card(&r) {
                Ok(card) => out.push(Holding {
                    card,
                    amount: r.get::<i64, _>("amount"),
                }),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed holding row");
                }
            }
        }

        Ok(out)
    }

    async fn aggregates_for(
        &self,
        card_ids: &[i64],
        active_since: DateTime<Utc>,
    ) -> Result<Vec<CardAggregates>> {
        if card_ids.is_empty() {
            return Ok(Vec::new());
        }

        let since_ms = to_ms(active_since);

        let mut qb: QueryBuilder<sqlx::Any> = QueryBuilder::new(
            r#"
SELECT uc.card_id,
  COALESCE(SUM(uc.amount), 0) AS total_copies,
  COALESCE(SUM(CASE WHEN u.last_daily_ms >= "#,
        );
        qb.push_bind(since_ms);
        qb.push(
            r#" THEN uc.amount ELSE 0 END), 0) AS active_copies,
  COUNT(DISTINCT uc.user_id) AS unique_owners,
  COUNT(DISTINCT CASE WHEN u.last_daily_ms >= "#,
        );
        qb.push_bind(since_ms);
        qb.push(
            r#" THEN uc.user_id END) AS active_owners,
  COALESCE(MAX(uc.amount), 0) AS max_per_user,
  COALESCE(AVG(uc.amount), 0) AS avg_per_user
FROM user_cards uc
JOIN users u ON u.user_id = uc.user_id
WHERE uc.amount > 0 AND uc.card_id IN ("#,
        );
        let mut sep = qb.separated(", ");
        for id in card_ids {
            sep.push_bind(*id);
        }
        qb.push(") GROUP BY uc.card_id;");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("aggregate inventory for pricing")?;

        Ok(rows
            .iter()
            .map(|r| CardAggregates {
                card_id: r.get::<i64, _>("card_id"),
                total_copies: r.get::<i64, _>("total_copies"),
                active_copies: r.get::<i64, _>("active_copies"),
                unique_owners: r.get::<i64, _>("unique_owners"),
                active_owners: r.get::<i64, _>("active_owners"),
                max_per_user: r.get::<i64, _>("max_per_user"),
                avg_per_user: r.get::<f64, _>("avg_per_user"),
            })
            .collect())
    }
}

fn row_to_user_card(r: &sqlx::any::AnyRow) -> Result<UserCard> {
    let obtained = from_ms(r.get::<i64, _>("obtained_ms"))
        .ok_or_else(|| anyhow::anyhow!("obtained_ms out of range"))?;

    let amount = r.get::<i64, _>("amount");
    if amount < 0 {
        anyhow::bail!("negative inventory amount: {amount}");
    }

    Ok(UserCard {
        user_id: r.get::<String, _>("user_id"),
        card_id: r.get::<i64, _>("card_id"),
        amount,
        favorite: r.get::<i64, _>("favorite_i64") != 0,
        locked: r.get::<i64, _>("locked_i64") != 0,
        obtained,
    })
}
