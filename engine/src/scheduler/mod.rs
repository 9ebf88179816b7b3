pub mod settlement;

pub use settlement::{SettlementQueue, SettlementScheduler};
