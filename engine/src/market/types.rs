use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::inventory::model::CardAggregates;

/// The four market signals behind a computed price, each clamped to
/// [0.5, 3.0] before weighting.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PriceFactors {
    pub scarcity: f64,
    pub distribution: f64,
    pub hoarding: f64,
    pub activity: f64,
}

impl PriceFactors {
    pub fn neutral() -> Self {
        Self {
            scarcity: 1.0,
            distribution: 1.0,
            hoarding: 1.0,
            activity: 1.0,
        }
    }
}

/// Why a price came out the way it did. Persisted verbatim into market
/// history rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PriceReason {
    /// Too few active owners or copies to trust the signals; the level
    /// base price applies.
    InsufficientData,
    ScarcityPremium,
    HoardingPremium,
    ConcentrationPremium,
    InactiveDiscount,
    Balanced,
}

impl PriceReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientData => "insufficient market data",
            Self::ScarcityPremium => "scarcity premium",
            Self::HoardingPremium => "hoarding premium",
            Self::ConcentrationPremium => "ownership concentration premium",
            Self::InactiveDiscount => "inactive market discount",
            Self::Balanced => "balanced market",
        }
    }
}

/// A full price computation for one card at one point in time.
#[derive(Clone, Debug)]
pub struct ComputedPrice {
    pub card_id: i64,
    pub price: i64,
    pub factors: PriceFactors,
    pub reason: PriceReason,
    pub aggregates: CardAggregates,
    pub computed_at: DateTime<Utc>,
}

/// Result of a batch computation. Ids that could not be priced (missing
/// catalog rows, failed chunks) are enumerated instead of silently dropped.
#[derive(Clone, Debug, Default)]
pub struct BatchPrices {
    pub prices: HashMap<i64, i64>,
    pub missing: Vec<i64>,
}

/// 24-hour price window summary.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarketStats {
    pub min_24h: i64,
    pub max_24h: i64,
    pub avg_24h: i64,
    pub samples: usize,
}
