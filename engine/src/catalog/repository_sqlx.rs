use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{AnyPool, QueryBuilder, Row};

use crate::catalog::model::{Card, CardQuery, Collection, DeletionReport};
use crate::catalog::repository::CardRepo;
use crate::db::ops;

/// SQLx-backed implementation of CardRepo.
pub struct SqlxCardRepo {
    pool: AnyPool,
}

impl SqlxCardRepo {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

const CARD_COLUMNS: &str =
    "card_id, name, collection_id, level, CAST(animated AS INTEGER) AS animated_i64, tags";

#[async_trait]
impl CardRepo for SqlxCardRepo {
    async fn get(&self, card_id: i64) -> Result<Option<Card>> {
        let row = sqlx::query(&format!(
            "SELECT {CARD_COLUMNS} FROM cards WHERE card_id = ?;"
        ))
        .bind(card_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("get card {card_id}"))?;

        match row {
            Some(r) => Ok(Some(row_to_card(&r)?)),
            None => Ok(None),
        }
    }

    async fn get_by_name(&self, q: &str) -> Result<Vec<Card>> {
        let rows = sqlx::query(&format!(
            "SELECT {CARD_COLUMNS} FROM cards WHERE LOWER(name) LIKE LOWER(?) ORDER BY card_id LIMIT 25;"
        ))
        .bind(format!("%{}%", q.trim()))
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("search cards by name {q:?}"))?;

        rows_to_cards(rows)
    }

    async fn get_by_query(&self, q: &CardQuery) -> Result<Vec<Card>> {
        let mut qb: QueryBuilder<sqlx::Any> = QueryBuilder::new(format!(
            "SELECT {CARD_COLUMNS} FROM cards WHERE 1 = 1"
        ));

        if let Some(name) = &q.name_contains {
            qb.push(" AND LOWER(name) LIKE LOWER(");
            qb.push_bind(format!("%{}%", name.trim()));
            qb.push(")");
        }
        if let Some(level) = q.level {
            qb.push(" AND level = ");
            qb.push_bind(level as i64);
        }
        if let Some(collection_id) = q.collection_id {
            qb.push(" AND collection_id = ");
            qb.push_bind(collection_id);
        }
        if let Some(animated) = q.animated {
            qb.push(" AND animated = ");
            qb.push_bind(animated as i64);
        }
        if let Some(tag) = &q.tag {
            // Tags persist as a JSON array of strings; substring match on
            // the quoted form keeps the filter store-agnostic.
            qb.push(" AND tags LIKE ");
            qb.push_bind(format!("%\"{}\"%", tag.trim().to_lowercase()));
        }
        qb.push(" ORDER BY card_id;");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("query cards")?;

        rows_to_cards(rows)
    }

    async fn get_all(&self) -> Result<Vec<Card>> {
        let rows = sqlx::query(&format!("SELECT {CARD_COLUMNS} FROM cards ORDER BY card_id;"))
            .fetch_all(&self.pool)
            .await
            .context("load catalog")?;

        rows_to_cards(rows)
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Card>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<sqlx::Any> = QueryBuilder::new(format!(
            "SELECT {CARD_COLUMNS} FROM cards WHERE card_id IN ("
        ));
        let mut sep = qb.separated(", ");
        for id in ids {
            sep.push_bind(*id);
        }
        qb.push(");");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("load cards by ids")?;

        rows_to_cards(rows)
    }

    async fn collections(&self) -> Result<Vec<Collection>> {
        let rows = sqlx::query(
            r#"
SELECT collection_id, name,
  CAST(promo AS INTEGER) AS promo_i64,
  CAST(fragment AS INTEGER) AS fragment_i64
FROM collections ORDER BY collection_id;
"#,
        )
        .fetch_all(&self.pool)
        .await
        .context("load collections")?;

        Ok(rows
            .iter()
            .map(|r| Collection {
                collection_id: r.get::<i64, _>("collection_id"),
                name: r.get::<String, _>("name"),
                promo: r.get::<i64, _>("promo_i64") != 0,
                fragment: r.get::<i64, _>("fragment_i64") != 0,
            })
            .collect())
    }

    async fn safe_delete(&self, card_id: i64) -> Result<Option<DeletionReport>> {
        let card = match self.get(card_id).await? {
            Some(c) => c,
            None => return Ok(None),
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .with_context(|| format!("safe_delete begin card={card_id}"))?;

        // Refund top bidders of active auctions before cancelling them.
        let open_bids = sqlx::query(
            r#"
SELECT top_bidder_id, current_price
FROM auctions
WHERE card_id = ? AND status = 'ACTIVE' AND top_bidder_id IS NOT NULL;
"#,
        )
        .bind(card_id)
        .fetch_all(&mut *tx)
        .await
        .with_context(|| format!("safe_delete read auctions card={card_id}"))?;

        for r in &open_bids {
            let bidder: String = r.get("top_bidder_id");
            let amount: i64 = r.get("current_price");
            if !ops::credit_flakes(&mut *tx, &bidder, amount).await? {
                anyhow::bail!("refund to missing user {bidder} during safe_delete");
            }
        }

        let cancelled = sqlx::query(
            r#"
UPDATE auctions
SET status = 'CANCELLED'
WHERE card_id = ? AND status = 'ACTIVE';
"#,
        )
        .bind(card_id)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("safe_delete cancel auctions card={card_id}"))?
        .rows_affected();

        let inv = sqlx::query(
            r#"
SELECT COUNT(*) AS owners, COALESCE(SUM(amount), 0) AS copies
FROM user_cards WHERE card_id = ?;
"#,
        )
        .bind(card_id)
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("safe_delete inventory count card={card_id}"))?;

        let owners_affected = inv.get::<i64, _>("owners") as u64;
        let copies_removed = inv.get::<i64, _>("copies");

        sqlx::query("DELETE FROM user_cards WHERE card_id = ?;")
            .bind(card_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("safe_delete inventory card={card_id}"))?;

        sqlx::query("DELETE FROM cards WHERE card_id = ?;")
            .bind(card_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("safe_delete card row card={card_id}"))?;

        tx.commit()
            .await
            .with_context(|| format!("safe_delete commit card={card_id}"))?;

        Ok(Some(DeletionReport {
            card_id,
            owners_affected,
            copies_removed,
            auctions_cancelled: cancelled,
            media_paths: card.media_paths(),
        }))
    }
}

pub(crate) fn row_to_card(r: &sqlx::any::AnyRow) -> Result<Card> {
    let level_i64 = r.get::<i64, _>("level");
    if !(1..=5).contains(&level_i64) {
        anyhow::bail!("card level out of range: {level_i64}");
    }

    let tags_json: String = r.get("tags");
    let tags: Vec<String> =
        serde_json::from_str(&tags_json).with_context(|| format!("malformed tags: {tags_json}"))?;

    Ok(Card {
        card_id: r.get::<i64, _>("card_id"),
        name: r.get::<String, _>("name"),
        collection_id: r.get::<i64, _>("collection_id"),
        level: level_i64 as u8,
        animated: r.get::<i64, _>("animated_i64") != 0,
        tags,
    })
}

fn rows_to_cards(rows: Vec<sqlx::any::AnyRow>) -> Result<Vec<Card>> {
    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
        match row_to_card(&r) {
            Ok(c) => out.push(c),
            Err(e) => {
                // poison-row resilience: skip but don't fail the scan
                tracing::warn!(error = %e, "skipping malformed card row");
            }
        }
    }
    Ok(out)
}
