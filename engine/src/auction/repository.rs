use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::auction::model::{Auction, Bid};

/// Insert payload for a new auction. The escrow decrement of the seller's
/// card happens in the same transaction as the insert.
#[derive(Clone, Debug)]
pub struct NewAuction {
    pub code: String,
    pub card_id: i64,
    pub seller_id: String,
    pub start_price: i64,
    pub min_increment: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Authoritative result of a bid transaction. Precondition misses are data,
/// not errors: the manager decides what each one means to the caller.
#[derive(Clone, Debug)]
pub enum BidOutcome {
    /// Bid recorded; previous top bidder (if any) already refunded.
    Accepted(Auction),
    NotFound,
    /// Not `Active`, or the deadline has passed.
    NotOpen,
    SelfBid,
    BelowMinimum,
    InsufficientFunds,
    /// Another bid committed between the read and the guarded write.
    RaceLost,
}

#[derive(Clone, Debug)]
pub enum CancelOutcome {
    Cancelled(Auction),
    NotFound,
    NotSeller,
    /// Cancellation is only allowed before the first bid.
    HasBids,
    NotActive,
}

#[derive(Clone, Debug)]
pub enum SettleOutcome {
    /// Card transferred to the top bidder, seller credited net of fee.
    Completed { auction: Auction, seller_proceeds: i64 },
    /// No bids: card returned to the seller.
    Expired(Auction),
    /// Terminal state reached earlier; settlement is idempotent.
    AlreadySettled,
    /// Deadline moved (anti-snipe) or fired early; retry at `end`.
    NotDue { end: DateTime<Utc> },
    NotFound,
}

#[async_trait]
pub trait AuctionRepo: Send + Sync {
    async fn get(&self, auction_id: i64) -> Result<Option<Auction>>;

    async fn get_by_code(&self, code: &str) -> Result<Option<Auction>>;

    async fn get_active(&self) -> Result<Vec<Auction>>;

    /// Bid audit trail for one auction, oldest first.
    async fn bids(&self, auction_id: i64) -> Result<Vec<Bid>>;

    /// Active auctions ordered by deadline; settlement rehydration reads
    /// this at startup.
    async fn get_pending_settlements(&self) -> Result<Vec<Auction>>;

    /// Allocates an unused code with the given prefix, retrying the random
    /// suffix on collision. `None` when attempts are exhausted.
    async fn generate_unique_code(&self, prefix: &str) -> Result<Option<String>>;

    /// Inserts the auction and escrows one copy of the card from the
    /// seller in a single transaction. `None` when the seller holds no
    /// copy (the insert is rolled back).
    async fn create_with_escrow(&self, new: &NewAuction) -> Result<Option<Auction>>;

    /// The whole bid flow in one transaction: debit the bidder, refund the
    /// previous top bidder, advance the price under a `bid_count` guard,
    /// extend the deadline inside the snipe window, append the audit row.
    async fn place_bid(
        &self,
        auction_id: i64,
        bidder_id: &str,
        amount: i64,
        now: DateTime<Utc>,
        snipe_window: Duration,
        snipe_extension: Duration,
    ) -> Result<BidOutcome>;

    async fn cancel(
        &self,
        auction_id: i64,
        seller_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CancelOutcome>;

    /// Idempotent settlement guarded by `status = 'ACTIVE'`.
    async fn settle(
        &self,
        auction_id: i64,
        now: DateTime<Utc>,
        seller_fee_bps: i64,
    ) -> Result<SettleOutcome>;
}
