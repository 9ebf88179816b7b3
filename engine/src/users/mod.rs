pub mod model;
pub mod repository;
pub mod repository_sqlx;

pub use model::User;
pub use repository::UserRepo;
pub use repository_sqlx::SqlxUserRepo;
