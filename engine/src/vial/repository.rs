use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Result of the liquefaction transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LiquefyOutcome {
    Applied,
    /// The copy vanished between the engine's read and the guarded
    /// decrement.
    NoCopy,
}

#[async_trait]
pub trait VialRepo: Send + Sync {
    /// One copy out, `vials_gained` in, atomically. Irreversible.
    async fn apply_liquefy(
        &self,
        user_id: &str,
        card_id: i64,
        vials_gained: i64,
        now: DateTime<Utc>,
    ) -> Result<LiquefyOutcome>;
}
