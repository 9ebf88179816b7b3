pub mod model;
pub mod repository;
pub mod repository_sqlx;

pub use model::{Card, CardQuery, Collection, DeletionReport};
pub use repository::CardRepo;
pub use repository_sqlx::SqlxCardRepo;
