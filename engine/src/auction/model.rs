use chrono::{DateTime, Utc};

/// Auction lifecycle. `Active` is the only non-terminal state; terminal
/// rows never mutate again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuctionStatus {
    Active,
    /// Deadline reached with at least one bid; card went to the top bidder.
    Completed,
    /// Deadline reached without bids; card returned to the seller.
    Expired,
    /// Withdrawn by the seller before the first bid.
    Cancelled,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Expired => "EXPIRED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(Self::Active),
            "COMPLETED" => Some(Self::Completed),
            "EXPIRED" => Some(Self::Expired),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// One auction. The auctioned card unit is escrowed: decremented from the
/// seller's inventory at creation and only restored on `Cancelled` or an
/// `Expired` close without bids.
#[derive(Clone, Debug)]
pub struct Auction {
    pub auction_id: i64,
    /// Human-friendly alphanumeric handle, unique across all auctions.
    pub code: String,
    pub card_id: i64,
    pub seller_id: String,

    pub start_price: i64,
    /// Monotonically non-decreasing while active.
    pub current_price: i64,
    pub min_increment: i64,
    pub top_bidder_id: Option<String>,
    pub bid_count: i64,

    pub status: AuctionStatus,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Auction {
    pub fn has_bids(&self) -> bool {
        self.bid_count > 0
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status == AuctionStatus::Active && now < self.end
    }

    /// Smallest acceptable next bid: the start price opens the bidding, a
    /// full increment is required after that.
    pub fn next_min_bid(&self) -> i64 {
        if self.has_bids() {
            self.current_price + self.min_increment
        } else {
            self.start_price
        }
    }
}

/// Audit-trail entry, appended in the same transaction as the bid itself.
#[derive(Clone, Debug)]
pub struct Bid {
    pub auction_id: i64,
    pub bidder_id: String,
    pub amount: i64,
    pub created: DateTime<Utc>,
}
