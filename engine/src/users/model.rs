use chrono::{DateTime, Utc};

/// An economy participant. Created on first interaction, never destroyed.
#[derive(Clone, Debug)]
pub struct User {
    /// Opaque external identity (transport-assigned).
    pub user_id: String,
    pub username: String,

    /// Primary currency. Non-negative invariant, enforced by guarded
    /// debits at the store.
    pub flakes: i64,
    /// Secondary currency from liquefaction. Non-negative invariant.
    pub vials: i64,
    pub xp: i64,

    pub joined: DateTime<Utc>,
    pub last_daily: Option<DateTime<Utc>>,
    pub last_work: Option<DateTime<Utc>>,
}

impl User {
    /// Activity test used by pricing and stats: a user counts as active
    /// when their last daily reward is within `window` of `now`.
    pub fn is_active(&self, now: DateTime<Utc>, window: std::time::Duration) -> bool {
        match self.last_daily {
            Some(at) => now.signed_duration_since(at).to_std().map_or(true, |gap| gap <= window),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn mk_user(last_daily: Option<DateTime<Utc>>) -> User {
        User {
            user_id: "u1".into(),
            username: "collector".into(),
            flakes: 0,
            vials: 0,
            xp: 0,
            joined: Utc::now(),
            last_daily,
            last_work: None,
        }
    }

    #[test]
    fn never_claimed_daily_is_inactive() {
        let u = mk_user(None);
        assert!(!u.is_active(Utc::now(), Duration::from_secs(3600)));
    }

    #[test]
    fn recent_daily_is_active() {
        let now = Utc::now();
        let u = mk_user(Some(now - chrono::Duration::hours(2)));
        assert!(u.is_active(now, Duration::from_secs(7 * 24 * 3600)));
    }

    #[test]
    fn stale_daily_is_inactive() {
        let now = Utc::now();
        let u = mk_user(Some(now - chrono::Duration::days(30)));
        assert!(!u.is_active(now, Duration::from_secs(7 * 24 * 3600)));
    }

    #[test]
    fn future_daily_counts_as_active() {
        // Clock skew between nodes must not flip a user inactive.
        let now = Utc::now();
        let u = mk_user(Some(now + chrono::Duration::minutes(5)));
        assert!(u.is_active(now, Duration::from_secs(3600)));
    }
}
