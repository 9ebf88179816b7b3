pub mod cache;
pub mod calculator;
pub mod factors;
pub mod history;
pub mod history_sqlx;
pub mod types;

pub use calculator::PriceCalculator;
pub use history::MarketHistoryRepo;
pub use history_sqlx::SqlxMarketHistoryRepo;
pub use types::{BatchPrices, ComputedPrice, MarketStats, PriceFactors, PriceReason};
