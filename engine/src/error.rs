use std::time::Duration;

use thiserror::Error;

/// Domain error taxonomy for the economic core.
///
/// Repositories return `anyhow::Result` annotated with operation context;
/// engines translate those into this taxonomy at the component boundary.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Input violates a documented precondition (bad amount, level, range).
    /// Surfaced to the caller, never logged as an error.
    #[error("{title}: {detail}")]
    Validation { title: String, detail: String },

    /// A referenced entity is absent.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A concurrent update won the race (auction already settled, balance
    /// moved under us). The owning component retries once before surfacing.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Store or transport failure that may heal on retry.
    #[error("service unavailable: {0}")]
    Transient(anyhow::Error),

    /// Invariant violation. The enclosing transaction is already rolled
    /// back; never surfaced as recoverable.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl EngineError {
    pub fn validation(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Validation {
            title: title.into(),
            detail: detail.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::Conflict(detail.into())
    }

    /// Wraps a repository failure as a transient store error.
    pub fn storage(e: anyhow::Error) -> Self {
        Self::Transient(e)
    }

    pub fn fatal(detail: impl Into<String>) -> Self {
        Self::Fatal(detail.into())
    }

    /// Whether an automatic retry is safe and potentially useful.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Transient(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Base delay of the transient-retry backoff schedule.
pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
/// Attempt cap for transient retries.
pub const RETRY_MAX_ATTEMPTS: u32 = 3;

/// Runs `op`, retrying `Transient` failures with exponential backoff
/// (1s, 2s) up to [`RETRY_MAX_ATTEMPTS`] total attempts. `Validation`,
/// `NotFound`, `Conflict` and `Fatal` are returned immediately: retrying
/// them cannot change the outcome or is not safe.
pub async fn retry_transient<T, F, Fut>(label: &'static str, mut op: F) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = EngineResult<T>>,
{
    let mut attempt: u32 = 1;
    loop {
        match op().await {
            Err(EngineError::Transient(e)) if attempt < RETRY_MAX_ATTEMPTS => {
                let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt - 1);
                tracing::warn!(
                    label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure; backing off before retry"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Runs `op`, retrying exactly once on `Conflict`. Used where one
/// optimistic re-read of racing state (bid placement, balance CAS) is
/// allowed before surfacing the conflict.
pub async fn retry_conflict_once<T, F, Fut>(op: F) -> EngineResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = EngineResult<T>>,
{
    match op().await {
        Err(EngineError::Conflict(detail)) => {
            tracing::debug!(detail = %detail, "conflict; retrying once");
            op().await
        }
        other => other,
    }
}
