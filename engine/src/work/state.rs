use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::work::scenario::Scenario;

/// One outstanding prompt awaiting an answer.
#[derive(Clone, Debug)]
pub struct PendingWork {
    pub user_id: String,
    pub scenario: Scenario,
    pub issued_at: DateTime<Utc>,
}

/// In-flight work prompts, one per user.
///
/// Owned by the work engine; nothing here persists. A crashed process
/// simply forgets open prompts, which only costs the user a re-roll.
#[derive(Default)]
pub struct WorkSessions {
    inner: Mutex<HashMap<String, PendingWork>>,
}

impl WorkSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a prompt for the user. Fails when one is already open and
    /// still inside `answer_window`; an expired leftover is replaced.
    pub fn begin(
        &self,
        pending: PendingWork,
        now: DateTime<Utc>,
        answer_window: std::time::Duration,
    ) -> Result<(), PendingWork> {
        let mut g = self.inner.lock();
        if let Some(existing) = g.get(&pending.user_id) {
            let expired = now
                .signed_duration_since(existing.issued_at)
                .to_std()
                .map_or(false, |gap| gap > answer_window);
            if !expired {
                return Err(existing.clone());
            }
        }
        g.insert(pending.user_id.clone(), pending);
        Ok(())
    }

    /// Removes and returns the user's open prompt. Answers from any other
    /// user never see this entry.
    pub fn take(&self, user_id: &str) -> Option<PendingWork> {
        self.inner.lock().remove(user_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
