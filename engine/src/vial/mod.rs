pub mod engine;
pub mod repository;
pub mod repository_sqlx;

pub use engine::{LiquefyReceipt, VialEngine};
pub use repository::VialRepo;
pub use repository_sqlx::SqlxVialRepo;
