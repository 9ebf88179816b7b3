use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::inventory::model::CardAggregates;
use crate::market::types::PriceFactors;

/// One appended market sample. The series is append-only; rows are never
/// rewritten.
#[derive(Clone, Debug)]
pub struct MarketSample {
    pub card_id: i64,
    pub created_at: DateTime<Utc>,
    pub price: i64,
    pub factors: PriceFactors,
    pub aggregates: CardAggregates,
    /// Percent move against the previous sample; 0 for the first sample.
    pub price_change_percent: f64,
    pub price_reason: String,
}

#[async_trait]
pub trait MarketHistoryRepo: Send + Sync {
    async fn latest(&self, card_id: i64) -> Result<Option<MarketSample>>;

    async fn in_range(&self, card_id: i64, since: DateTime<Utc>) -> Result<Vec<MarketSample>>;

    async fn append(&self, sample: &MarketSample) -> Result<()>;
}
