pub mod engine;
pub mod repository;
pub mod repository_sqlx;
pub mod rewards;
pub mod scenario;
pub mod state;

pub use engine::{WorkEngine, WorkOutcome, WorkPrompt};
pub use repository::WorkRepo;
pub use repository_sqlx::SqlxWorkRepo;
pub use scenario::{Scenario, ScenarioKind};
