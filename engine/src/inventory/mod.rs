pub mod model;
pub mod repository;
pub mod repository_sqlx;

pub use model::{CardAggregates, Holding, UserCard};
pub use repository::UserCardRepo;
pub use repository_sqlx::SqlxUserCardRepo;
