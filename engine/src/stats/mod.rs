pub mod collector;
pub mod gini;
pub mod model;
pub mod repository;
pub mod repository_sqlx;

pub use collector::StatsCollector;
pub use model::{EconomyStats, EconomyTrends, WealthBuckets};
pub use repository::EconomyStatsRepo;
pub use repository_sqlx::SqlxEconomyStatsRepo;
