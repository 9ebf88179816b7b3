use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{AnyPool, Row};
use std::time::Duration;
use uuid::Uuid;

use crate::auction::code::MAX_CODE_ATTEMPTS;
use crate::auction::model::{Auction, AuctionStatus, Bid};
use crate::auction::repository::{
    AuctionRepo, BidOutcome, CancelOutcome, NewAuction, SettleOutcome,
};
use crate::db::ops;
use crate::time::{from_ms, to_ms};

/// SQLx-backed implementation of AuctionRepo.
///
/// Every mutation is one transaction with compare-and-swap guards; a guard
/// miss rolls the transaction back and reports a typed outcome instead of
/// erroring, so no partial balance movement can survive.
pub struct SqlxAuctionRepo {
    pool: AnyPool,
}

impl SqlxAuctionRepo {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

const AUCTION_COLUMNS: &str = "auction_id, code, card_id, seller_id, \
  start_price, current_price, min_increment, top_bidder_id, bid_count, \
  status, start_ms, end_ms";

#[async_trait]
impl AuctionRepo for SqlxAuctionRepo {
    async fn get(&self, auction_id: i64) -> Result<Option<Auction>> {
        let row = sqlx::query(&format!(
            "SELECT {AUCTION_COLUMNS} FROM auctions WHERE auction_id = ?;"
        ))
        .bind(auction_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("get auction {auction_id}"))?;

        match row {
            Some(r) => Ok(Some(row_to_auction(&r)?)),
            None => Ok(None),
        }
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Auction>> {
        let row = sqlx::query(&format!(
            "SELECT {AUCTION_COLUMNS} FROM auctions WHERE code = ?;"
        ))
        .bind(code.to_ascii_uppercase())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("get auction by code {code}"))?;

        match row {
            Some(r) => Ok(Some(row_to_auction(&r)?)),
            None => Ok(None),
        }
    }

    async fn get_active(&self) -> Result<Vec<Auction>> {
        let rows = sqlx::query(&format!(
            "SELECT {AUCTION_COLUMNS} FROM auctions WHERE status = 'ACTIVE' ORDER BY end_ms;"
        ))
        .fetch_all(&self.pool)
        .await
        .context("list active auctions")?;

        rows_to_auctions(rows)
    }

    async fn bids(&self, auction_id: i64) -> Result<Vec<Bid>> {
        let rows = sqlx::query(
            "SELECT auction_id, bidder_id, amount, created_ms FROM bids WHERE auction_id = ? ORDER BY created_ms, amount;",
        )
        .bind(auction_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("bid history auction {auction_id}"))?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            let created = from_ms(r.get::<i64, _>("created_ms"))
                .ok_or_else(|| anyhow::anyhow!("created_ms out of range"))?;
            out.push(Bid {
                auction_id: r.get::<i64, _>("auction_id"),
                bidder_id: r.get::<String, _>("bidder_id"),
                amount: r.get::<i64, _>("amount"),
                created,
            });
        }

        Ok(out)
    }

    async fn get_pending_settlements(&self) -> Result<Vec<Auction>> {
        // Same predicate as get_active: every Active auction eventually
        // settles; ordering by deadline feeds the scheduler heap directly.
        self.get_active().await.context("pending settlements")
    }

    async fn generate_unique_code(&self, prefix: &str) -> Result<Option<String>> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let candidate = crate::auction::code::random_code(&mut rand::thread_rng(), prefix);

            let row = sqlx::query("SELECT 1 FROM auctions WHERE code = ?;")
                .bind(&candidate)
                .fetch_optional(&self.pool)
                .await
                .with_context(|| format!("check auction code {candidate}"))?;

            if row.is_none() {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    async fn create_with_escrow(&self, new: &NewAuction) -> Result<Option<Auction>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("create_with_escrow begin")?;

        // Escrow: one copy leaves the seller's inventory with the insert.
        let escrowed = ops::adjust_user_card(
            &mut *tx,
            &new.seller_id,
            new.card_id,
            -1,
            to_ms(new.start),
        )
        .await?;

        if !escrowed {
            tx.rollback().await.ok();
            return Ok(None);
        }

        let next_id = ops::next_sequence_id(&mut *tx, "auctions")
            .await
            .context("allocate auction id")?;

        sqlx::query(
            r#"
INSERT INTO auctions (
  auction_id, code, card_id, seller_id,
  start_price, current_price, min_increment, top_bidder_id, bid_count,
  status, start_ms, end_ms
) VALUES (?, ?, ?, ?, ?, ?, ?, NULL, 0, 'ACTIVE', ?, ?);
"#,
        )
        .bind(next_id)
        .bind(&new.code)
        .bind(new.card_id)
        .bind(&new.seller_id)
        .bind(new.start_price)
        .bind(new.start_price)
        .bind(new.min_increment)
        .bind(to_ms(new.start))
        .bind(to_ms(new.end))
        .execute(&mut *tx)
        .await
        .with_context(|| format!("insert auction code={}", new.code))?;

        let row = sqlx::query(&format!(
            "SELECT {AUCTION_COLUMNS} FROM auctions WHERE auction_id = ?;"
        ))
        .bind(next_id)
        .fetch_one(&mut *tx)
        .await
        .context("read back inserted auction")?;
        let auction = row_to_auction(&row)?;

        tx.commit().await.context("create_with_escrow commit")?;
        Ok(Some(auction))
    }

    async fn place_bid(
        &self,
        auction_id: i64,
        bidder_id: &str,
        amount: i64,
        now: DateTime<Utc>,
        snipe_window: Duration,
        snipe_extension: Duration,
    ) -> Result<BidOutcome> {
        let mut tx = self.pool.begin().await.context("place_bid begin")?;

        let row = sqlx::query(&format!(
            "SELECT {AUCTION_COLUMNS} FROM auctions WHERE auction_id = ?;"
        ))
        .bind(auction_id)
        .fetch_optional(&mut *tx)
        .await
        .with_context(|| format!("place_bid read auction {auction_id}"))?;

        let auction = match row {
            Some(r) => row_to_auction(&r)?,
            None => return Ok(BidOutcome::NotFound),
        };

        if !auction.is_open(now) {
            return Ok(BidOutcome::NotOpen);
        }
        if auction.seller_id == bidder_id {
            return Ok(BidOutcome::SelfBid);
        }
        if amount < auction.next_min_bid() {
            return Ok(BidOutcome::BelowMinimum);
        }

        if !ops::debit_flakes(&mut *tx, bidder_id, amount).await? {
            tx.rollback().await.ok();
            return Ok(BidOutcome::InsufficientFunds);
        }

        // Refund the displaced top bidder in the same transaction.
        if let Some(prev_bidder) = &auction.top_bidder_id {
            if !ops::credit_flakes(&mut *tx, prev_bidder, auction.current_price).await? {
                anyhow::bail!(
                    "refund to missing user {prev_bidder} on auction {auction_id}"
                );
            }
        }

        // Anti-sniping: a bid inside the window pushes the deadline out.
        let snipe_window = chrono::Duration::milliseconds(snipe_window.as_millis() as i64);
        let snipe_extension = chrono::Duration::milliseconds(snipe_extension.as_millis() as i64);
        let new_end = if auction.end - now < snipe_window {
            auction.end + snipe_extension
        } else {
            auction.end
        };

        // bid_count doubles as the optimistic version of the row.
        let res = sqlx::query(
            r#"
UPDATE auctions
SET current_price = ?,
    top_bidder_id = ?,
    bid_count = bid_count + 1,
    end_ms = ?
WHERE auction_id = ? AND status = 'ACTIVE' AND bid_count = ?;
"#,
        )
        .bind(amount)
        .bind(bidder_id)
        .bind(to_ms(new_end))
        .bind(auction_id)
        .bind(auction.bid_count)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("place_bid guard update auction {auction_id}"))?;

        if res.rows_affected() != 1 {
            tx.rollback().await.ok();
            return Ok(BidOutcome::RaceLost);
        }

        sqlx::query(
            r#"
INSERT INTO bids (bid_id, auction_id, bidder_id, amount, created_ms)
VALUES (?, ?, ?, ?, ?);
"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(auction_id)
        .bind(bidder_id)
        .bind(amount)
        .bind(to_ms(now))
        .execute(&mut *tx)
        .await
        .with_context(|| format!("append bid audit auction {auction_id}"))?;

        tx.commit().await.context("place_bid commit")?;

        let mut updated = auction;
        updated.current_price = amount;
        updated.top_bidder_id = Some(bidder_id.to_string());
        updated.bid_count += 1;
        updated.end = new_end;
        Ok(BidOutcome::Accepted(updated))
    }

    async fn cancel(
        &self,
        auction_id: i64,
        seller_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CancelOutcome> {
        let mut tx = self.pool.begin().await.context("cancel begin")?;

        let row = sqlx::query(&format!(
            "SELECT {AUCTION_COLUMNS} FROM auctions WHERE auction_id = ?;"
        ))
        .bind(auction_id)
        .fetch_optional(&mut *tx)
        .await
        .with_context(|| format!("cancel read auction {auction_id}"))?;

        let auction = match row {
            Some(r) => row_to_auction(&r)?,
            None => return Ok(CancelOutcome::NotFound),
        };

        if auction.seller_id != seller_id {
            return Ok(CancelOutcome::NotSeller);
        }
        if auction.status != AuctionStatus::Active {
            return Ok(CancelOutcome::NotActive);
        }
        if auction.has_bids() {
            return Ok(CancelOutcome::HasBids);
        }

        // bid_count = 0 in the guard keeps a racing first bid and a cancel
        // from both winning.
        let res = sqlx::query(
            r#"
UPDATE auctions
SET status = 'CANCELLED'
WHERE auction_id = ? AND status = 'ACTIVE' AND bid_count = 0;
"#,
        )
        .bind(auction_id)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("cancel guard update auction {auction_id}"))?;

        if res.rows_affected() != 1 {
            tx.rollback().await.ok();
            return Ok(CancelOutcome::HasBids);
        }

        // Escrow returns to the seller.
        if !ops::adjust_user_card(&mut *tx, seller_id, auction.card_id, 1, to_ms(now)).await? {
            anyhow::bail!("escrow restore failed for auction {auction_id}");
        }

        tx.commit().await.context("cancel commit")?;

        let mut updated = auction;
        updated.status = AuctionStatus::Cancelled;
        Ok(CancelOutcome::Cancelled(updated))
    }

    async fn settle(
        &self,
        auction_id: i64,
        now: DateTime<Utc>,
        seller_fee_bps: i64,
    ) -> Result<SettleOutcome> {
        let mut tx = self.pool.begin().await.context("settle begin")?;

        let row = sqlx::query(&format!(
            "SELECT {AUCTION_COLUMNS} FROM auctions WHERE auction_id = ?;"
        ))
        .bind(auction_id)
        .fetch_optional(&mut *tx)
        .await
        .with_context(|| format!("settle read auction {auction_id}"))?;

        let auction = match row {
            Some(r) => row_to_auction(&r)?,
            None => return Ok(SettleOutcome::NotFound),
        };

        if auction.status.is_terminal() {
            return Ok(SettleOutcome::AlreadySettled);
        }
        if now < auction.end {
            // Anti-snipe moved the deadline, or the timer fired early.
            return Ok(SettleOutcome::NotDue { end: auction.end });
        }

        let (new_status, winner) = if auction.has_bids() {
            (AuctionStatus::Completed, auction.top_bidder_id.clone())
        } else {
            (AuctionStatus::Expired, None)
        };

        let res = sqlx::query(
            r#"
UPDATE auctions
SET status = ?
WHERE auction_id = ? AND status = 'ACTIVE';
"#,
        )
        .bind(new_status.as_str())
        .bind(auction_id)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("settle guard update auction {auction_id}"))?;

        if res.rows_affected() != 1 {
            tx.rollback().await.ok();
            return Ok(SettleOutcome::AlreadySettled);
        }

        match winner {
            Some(winner_id) => {
                // Escrowed card transfers to the winner; the seller gets the
                // final price net of the configured fee. The winner's flakes
                // were already debited when the bid was placed.
                if !ops::adjust_user_card(&mut *tx, &winner_id, auction.card_id, 1, to_ms(now))
                    .await?
                {
                    anyhow::bail!("card transfer failed for auction {auction_id}");
                }

                let fee = auction.current_price * seller_fee_bps / 10_000;
                let proceeds = auction.current_price - fee;
                if !ops::credit_flakes(&mut *tx, &auction.seller_id, proceeds).await? {
                    anyhow::bail!(
                        "seller credit to missing user {} on auction {auction_id}",
                        auction.seller_id
                    );
                }

                tx.commit().await.context("settle commit")?;

                let mut updated = auction;
                updated.status = AuctionStatus::Completed;
                Ok(SettleOutcome::Completed {
                    auction: updated,
                    seller_proceeds: proceeds,
                })
            }
            None => {
                if !ops::adjust_user_card(
                    &mut *tx,
                    &auction.seller_id,
                    auction.card_id,
                    1,
                    to_ms(now),
                )
                .await?
                {
                    anyhow::bail!("escrow restore failed for auction {auction_id}");
                }

                tx.commit().await.context("settle commit")?;

                let mut updated = auction;
                updated.status = AuctionStatus::Expired;
                Ok(SettleOutcome::Expired(updated))
            }
        }
    }
}

fn row_to_auction(r: &sqlx::any::AnyRow) -> Result<Auction> {
    let status_str: String = r.get("status");
    let status = AuctionStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("unknown auction status: {status_str}"))?;

    let start = from_ms(r.get::<i64, _>("start_ms"))
        .ok_or_else(|| anyhow::anyhow!("start_ms out of range"))?;
    let end = from_ms(r.get::<i64, _>("end_ms"))
        .ok_or_else(|| anyhow::anyhow!("end_ms out of range"))?;

    Ok(Auction {
        auction_id: r.get::<i64, _>("auction_id"),
        code: r.get::<String, _>("code"),
        card_id: r.get::<i64, _>("card_id"),
        seller_id: r.get::<String, _>("seller_id"),
        start_price: r.get::<i64, _>("start_price"),
        current_price: r.get::<i64, _>("current_price"),
        min_increment: r.get::<i64, _>("min_increment"),
        top_bidder_id: r.get::<Option<String>, _>("top_bidder_id"),
        bid_count: r.get::<i64, _>("bid_count"),
        status,
        start,
        end,
    })
}

fn rows_to_auctions(rows: Vec<sqlx::any::AnyRow>) -> Result<Vec<Auction>> {
    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
        match row_to_auction(&r) {
            Ok(a) => out.push(a),
            Err(e) => {
                // poison-row resilience: skip but don't fail the scan
                tracing::warn!(error = %e, "skipping malformed auction row");
            }
        }
    }
    Ok(out)
}
