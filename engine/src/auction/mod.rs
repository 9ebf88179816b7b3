pub mod code;
pub mod manager;
pub mod model;
pub mod repository;
pub mod repository_sqlx;

pub use manager::AuctionManager;
pub use model::{Auction, AuctionStatus, Bid};
pub use repository::{AuctionRepo, BidOutcome, CancelOutcome, NewAuction, SettleOutcome};
pub use repository_sqlx::SqlxAuctionRepo;
