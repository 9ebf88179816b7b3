use chrono::{DateTime, Utc};

use crate::catalog::model::Card;

/// One inventory row: how many copies of a card a user holds.
/// Rows with `amount = 0` are treated as absent.
#[derive(Clone, Debug)]
pub struct UserCard {
    pub user_id: String,
    pub card_id: i64,
    pub amount: i64,
    pub favorite: bool,
    /// Locked copies are excluded from liquefaction and auctioning.
    pub locked: bool,
    pub obtained: DateTime<Utc>,
}

/// Inventory row joined with its catalog entry. Work bonuses and wealth
/// folds consume this shape.
#[derive(Clone, Debug)]
pub struct Holding {
    pub card: Card,
    pub amount: i64,
}

/// Distribution aggregates for one card, produced in a single round-trip
/// per batch chunk. The price calculator's only view of the inventory.
#[derive(Clone, Copy, Debug, Default)]
pub struct CardAggregates {
    pub card_id: i64,
    /// Σ amount over all owners.
    pub total_copies: i64,
    /// Σ amount over owners active within the inactivity threshold.
    pub active_copies: i64,
    pub unique_owners: i64,
    pub active_owners: i64,
    pub max_per_user: i64,
    pub avg_per_user: f64,
}
