use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::auction::code;
use crate::auction::model::Auction;
use crate::auction::repository::{
    AuctionRepo, BidOutcome, CancelOutcome, NewAuction, SettleOutcome,
};
use crate::catalog::repository::CardRepo;
use crate::config::AuctionConfig;
use crate::error::{EngineError, EngineResult, retry_conflict_once};
use crate::inventory::repository::UserCardRepo;
use crate::metrics::Counters;
use crate::scheduler::settlement::SettlementQueue;
use crate::time::Clock;

/// Orchestrates the auction lifecycle: validation and policy live here,
/// the atomic state transitions live in the repository transactions.
pub struct AuctionManager {
    repo: Arc<dyn AuctionRepo>,
    cards: Arc<dyn CardRepo>,
    inventory: Arc<dyn UserCardRepo>,
    clock: Arc<dyn Clock>,
    cfg: AuctionConfig,
    counters: Counters,
    settlements: SettlementQueue,
}

impl AuctionManager {
    pub fn new(
        repo: Arc<dyn AuctionRepo>,
        cards: Arc<dyn CardRepo>,
        inventory: Arc<dyn UserCardRepo>,
        clock: Arc<dyn Clock>,
        cfg: AuctionConfig,
        counters: Counters,
        settlements: SettlementQueue,
    ) -> Self {
        Self {
            repo,
            cards,
            inventory,
            clock,
            cfg,
            counters,
            settlements,
        }
    }

    pub fn config(&self) -> &AuctionConfig {
        &self.cfg
    }

    pub async fn get(&self, auction_id: i64) -> EngineResult<Auction> {
        self.repo
            .get(auction_id)
            .await
            .map_err(EngineError::storage)?
            .ok_or_else(|| EngineError::not_found("auction", auction_id))
    }

    pub async fn get_by_code(&self, code: &str) -> EngineResult<Auction> {
        self.repo
            .get_by_code(code)
            .await
            .map_err(EngineError::storage)?
            .ok_or_else(|| EngineError::not_found("auction", code))
    }

    pub async fn list_active(&self) -> EngineResult<Vec<Auction>> {
        self.repo.get_active().await.map_err(EngineError::storage)
    }

    pub async fn bid_history(&self, auction_id: i64) -> EngineResult<Vec<crate::auction::model::Bid>> {
        self.repo.bids(auction_id).await.map_err(EngineError::storage)
    }

    /// Opens an auction, escrowing one copy of the card from the seller.
    #[instrument(skip(self), target = "auction", fields(seller_id = %seller_id, card_id = %card_id))]
    pub async fn create(
        &self,
        seller_id: &str,
        card_id: i64,
        start_price: i64,
        duration: Duration,
    ) -> EngineResult<Auction> {
        if start_price < self.cfg.min_start_price {
            return Err(EngineError::validation(
                "Invalid start price",
                format!("start price must be at least {}", self.cfg.min_start_price),
            ));
        }
        if duration < self.cfg.min_duration || duration > self.cfg.max_duration {
            return Err(EngineError::validation(
                "Invalid duration",
                format!(
                    "duration must be between {} and {} seconds",
                    self.cfg.min_duration.as_secs(),
                    self.cfg.max_duration.as_secs()
                ),
            ));
        }

        let card = self
            .cards
            .get(card_id)
            .await
            .map_err(EngineError::storage)?
            .ok_or_else(|| EngineError::not_found("card", card_id))?;

        if card.is_legendary() {
            return Err(EngineError::validation(
                "Card not auctionable",
                "legendary cards cannot be auctioned",
            ));
        }

        // Friendly pre-checks; the escrow transaction is authoritative.
        match self
            .inventory
            .get(seller_id, card_id)
            .await
            .map_err(EngineError::storage)?
        {
            Some(held) if held.locked => {
                return Err(EngineError::validation(
                    "Card locked",
                    "unlock this card before auctioning it",
                ));
            }
            Some(_) => {}
            None => {
                return Err(EngineError::validation(
                    "No copies held",
                    "you do not own a copy of this card",
                ));
            }
        }

        let prefix = code::prefix_for(&card.name);
        let auction_code = self
            .repo
            .generate_unique_code(&prefix)
            .await
            .map_err(EngineError::storage)?
            .ok_or_else(|| EngineError::conflict("auction code space exhausted"))?;

        let now = self.clock.now();
        let end = now
            + chrono::Duration::milliseconds(duration.as_millis() as i64);
        let min_increment = (start_price * self.cfg.min_increment_bps / 10_000).max(1);

        let new = NewAuction {
            code: auction_code,
            card_id,
            seller_id: seller_id.to_string(),
            start_price,
            min_increment,
            start: now,
            end,
        };

        let auction = self
            .repo
            .create_with_escrow(&new)
            .await
            .map_err(EngineError::storage)?
            .ok_or_else(|| {
                EngineError::validation("No copies held", "you do not own a copy of this card")
            })?;

        Counters::bump(&self.counters.auctions_created);
        self.settlements.notify(auction.auction_id, auction.end);

        info!(
            auction_id = auction.auction_id,
            code = %auction.code,
            end = %auction.end,
            "auction created"
        );

        Ok(auction)
    }

    /// Places a bid. Serialized per auction by the row's optimistic guard;
    /// a lost race is retried once before surfacing as a conflict.
    #[instrument(skip(self), target = "auction", fields(auction_id = %auction_id, bidder_id = %bidder_id))]
    pub async fn place_bid(
        &self,
        auction_id: i64,
        bidder_id: &str,
        amount: i64,
    ) -> EngineResult<Auction> {
        if amount <= 0 {
            return Err(EngineError::validation(
                "Invalid bid",
                "bid amount must be positive",
            ));
        }

        let outcome = retry_conflict_once(|| async {
            let out = self
                .repo
                .place_bid(
                    auction_id,
                    bidder_id,
                    amount,
                    self.clock.now(),
                    self.cfg.snipe_window,
                    self.cfg.snipe_extension,
                )
                .await
                .map_err(EngineError::storage)?;

            match out {
                BidOutcome::RaceLost => Err(EngineError::conflict("another bid landed first")),
                other => Ok(other),
            }
        })
        .await;

        let outcome = match outcome {
            Err(EngineError::Conflict(_)) => {
                // Two lost races in a row: the caller was outbid either way.
                // No amounts are echoed back.
                Counters::bump(&self.counters.bids_rejected);
                return Err(EngineError::validation(
                    "Bid too low",
                    "your bid no longer meets the minimum for this auction",
                ));
            }
            Err(e) => return Err(e),
            Ok(o) => o,
        };

        match outcome {
            BidOutcome::Accepted(auction) => {
                Counters::bump(&self.counters.bids_placed);
                info!(
                    auction_id = auction.auction_id,
                    bid_count = auction.bid_count,
                    end = %auction.end,
                    "bid accepted"
                );
                Ok(auction)
            }
            BidOutcome::NotFound => Err(EngineError::not_found("auction", auction_id)),
            BidOutcome::NotOpen => Err(EngineError::validation(
                "Auction closed",
                "this auction is no longer accepting bids",
            )),
            BidOutcome::SelfBid => Err(EngineError::validation(
                "Invalid bid",
                "you cannot bid on your own auction",
            )),
            BidOutcome::BelowMinimum => {
                Counters::bump(&self.counters.bids_rejected);
                Err(EngineError::validation(
                    "Bid too low",
                    "your bid does not meet the minimum for this auction",
                ))
            }
            BidOutcome::InsufficientFunds => Err(EngineError::validation(
                "Insufficient balance",
                "you do not have enough flakes for this bid",
            )),
            BidOutcome::RaceLost => unreachable!("RaceLost mapped to Conflict above"),
        }
    }

    /// Withdraws an auction before its first bid and returns the escrowed
    /// card to the seller.
    #[instrument(skip(self), target = "auction", fields(auction_id = %auction_id, seller_id = %seller_id))]
    pub async fn cancel(&self, auction_id: i64, seller_id: &str) -> EngineResult<Auction> {
        let outcome = self
            .repo
            .cancel(auction_id, seller_id, self.clock.now())
            .await
            .map_err(EngineError::storage)?;

        match outcome {
            CancelOutcome::Cancelled(auction) => {
                info!(auction_id = auction.auction_id, "auction cancelled");
                Ok(auction)
            }
            CancelOutcome::NotFound => Err(EngineError::not_found("auction", auction_id)),
            CancelOutcome::NotSeller => Err(EngineError::validation(
                "Not your auction",
                "only the seller can cancel an auction",
            )),
            CancelOutcome::HasBids => Err(EngineError::validation(
                "Cancellation window closed",
                "auctions cannot be cancelled once a bid is placed",
            )),
            CancelOutcome::NotActive => Err(EngineError::validation(
                "Auction closed",
                "this auction has already ended",
            )),
        }
    }

    /// Settles a due auction. Idempotent: terminal auctions report
    /// `AlreadySettled`, early fires report `NotDue` with the live
    /// deadline. Driven by the settlement scheduler.
    #[instrument(skip(self), target = "auction", fields(auction_id = %auction_id))]
    pub async fn settle(&self, auction_id: i64) -> EngineResult<SettleOutcome> {
        let outcome = self
            .repo
            .settle(auction_id, self.clock.now(), self.cfg.seller_fee_bps)
            .await
            .map_err(EngineError::storage)?;

        match &outcome {
            SettleOutcome::Completed {
                auction,
                seller_proceeds,
            } => {
                Counters::bump(&self.counters.settlements_completed);
                info!(
                    auction_id = auction.auction_id,
                    final_price = auction.current_price,
                    seller_proceeds,
                    "auction completed"
                );
            }
            SettleOutcome::Expired(auction) => {
                Counters::bump(&self.counters.settlements_expired);
                info!(auction_id = auction.auction_id, "auction expired without bids");
            }
            SettleOutcome::AlreadySettled => {}
            SettleOutcome::NotDue { end } => {
                warn!(auction_id, end = %end, "settlement fired before deadline; rescheduling");
            }
            SettleOutcome::NotFound => {
                warn!(auction_id, "settlement target vanished");
            }
        }

        Ok(outcome)
    }
}
