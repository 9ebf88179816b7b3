use chrono::{DateTime, Utc};

/// Rolling-day claim counters for one user.
#[derive(Clone, Debug)]
pub struct ClaimInfo {
    pub user_id: String,
    pub claims_today: i64,
    pub total_spent_today: i64,
    /// Anchor of the rolling window. An anchor older than the window means
    /// the counters no longer apply.
    pub window_start: Option<DateTime<Utc>>,
}

impl ClaimInfo {
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            claims_today: 0,
            total_spent_today: 0,
            window_start: None,
        }
    }

    /// Claims that still count against the user, honoring the lazy window
    /// roll: an expired anchor zeroes the count without a write.
    pub fn effective_claims(&self, now: DateTime<Utc>, window: std::time::Duration) -> i64 {
        match self.window_start {
            Some(anchor)
                if now
                    .signed_duration_since(anchor)
                    .to_std()
                    .map_or(true, |gap| gap <= window) =>
            {
                self.claims_today
            }
            _ => 0,
        }
    }
}

/// Cost of the n-th new claim (1-indexed) after `claims_so_far` in the
/// window: `base_price * (claims_so_far + n)`.
pub fn nth_claim_cost(base_price: i64, claims_so_far: i64, n: i64) -> i64 {
    base_price * (claims_so_far + n)
}

/// Total cost of `count` claims from state `claims_so_far`:
/// `base_price * (count * claims_so_far + count * (count + 1) / 2)`.
pub fn total_claim_cost(base_price: i64, claims_so_far: i64, count: i64) -> i64 {
    base_price * (count * claims_so_far + count * (count + 1) / 2)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn first_three_claims_cost_one_two_three_hundred() {
        assert_eq!(nth_claim_cost(100, 0, 1), 100);
        assert_eq!(nth_claim_cost(100, 0, 2), 200);
        assert_eq!(nth_claim_cost(100, 0, 3), 300);
        assert_eq!(total_claim_cost(100, 0, 3), 600);
    }

    #[test]
    fn fourth_claim_after_three_costs_four_hundred() {
        assert_eq!(total_claim_cost(100, 3, 1), 400);
    }

    #[test]
    fn zero_count_costs_nothing() {
        assert_eq!(total_claim_cost(100, 5, 0), 0);
    }

    #[test]
    fn expired_window_zeroes_the_count() {
        let now = Utc::now();
        let info = ClaimInfo {
            user_id: "u".into(),
            claims_today: 7,
            total_spent_today: 2800,
            window_start: Some(now - chrono::Duration::hours(25)),
        };
        assert_eq!(info.effective_claims(now, std::time::Duration::from_secs(24 * 3600)), 0);
    }

    #[test]
    fn live_window_keeps_the_count() {
        let now = Utc::now();
        let info = ClaimInfo {
            user_id: "u".into(),
            claims_today: 7,
            total_spent_today: 2800,
            window_start: Some(now - chrono::Duration::hours(3)),
        };
        assert_eq!(info.effective_claims(now, std::time::Duration::from_secs(24 * 3600)), 7);
    }

    proptest! {
        /// The closed form equals the sum of the per-claim progression.
        #[test]
        fn total_matches_sum_of_parts(
            base in 1i64..=1_000,
            k in 0i64..=500,
            count in 0i64..=50,
        ) {
            let summed: i64 = (1..=count).map(|n| nth_claim_cost(base, k, n)).sum();
            prop_assert_eq!(total_claim_cost(base, k, count), summed);
        }
    }
}
