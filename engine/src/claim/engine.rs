use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, instrument};

use crate::catalog::model::Card;
use crate::catalog::repository::CardRepo;
use crate::claim::model::{ClaimInfo, total_claim_cost};
use crate::claim::rarity::sample_level;
use crate::claim::repository::{ClaimApplyOutcome, ClaimRepo};
use crate::config::{ClaimConfig, DailyConfig};
use crate::error::{EngineError, EngineResult, retry_conflict_once};
use crate::metrics::Counters;
use crate::time::Clock;
use crate::users::repository::UserRepo;

/// Outcome of the daily reward operation.
#[derive(Clone, Copy, Debug)]
pub struct DailyReward {
    pub flakes: i64,
    pub next_at: DateTime<Utc>,
}

/// Grants randomly drawn cards priced by an arithmetic progression over
/// the user's rolling-day claim count.
pub struct ClaimEngine {
    users: Arc<dyn UserRepo>,
    cards: Arc<dyn CardRepo>,
    repo: Arc<dyn ClaimRepo>,
    clock: Arc<dyn Clock>,
    cfg: ClaimConfig,
    daily_cfg: DailyConfig,
    counters: Counters,
    rng: Mutex<StdRng>,
}

impl ClaimEngine {
    pub fn new(
        users: Arc<dyn UserRepo>,
        cards: Arc<dyn CardRepo>,
        repo: Arc<dyn ClaimRepo>,
        clock: Arc<dyn Clock>,
        cfg: ClaimConfig,
        daily_cfg: DailyConfig,
        counters: Counters,
    ) -> Self {
        Self::with_rng(
            users,
            cards,
            repo,
            clock,
            cfg,
            daily_cfg,
            counters,
            StdRng::from_entropy(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_rng(
        users: Arc<dyn UserRepo>,
        cards: Arc<dyn CardRepo>,
        repo: Arc<dyn ClaimRepo>,
        clock: Arc<dyn Clock>,
        cfg: ClaimConfig,
        daily_cfg: DailyConfig,
        counters: Counters,
        rng: StdRng,
    ) -> Self {
        Self {
            users,
            cards,
            repo,
            clock,
            cfg,
            daily_cfg,
            counters,
            rng: Mutex::new(rng),
        }
    }

    pub fn base_price(&self) -> i64 {
        self.cfg.base_price
    }

    pub fn claim_window(&self) -> std::time::Duration {
        self.cfg.window
    }

    pub async fn claim_info(&self, user_id: &str) -> EngineResult<ClaimInfo> {
        Ok(self
            .repo
            .get_info(user_id)
            .await
            .map_err(EngineError::storage)?
            .unwrap_or_else(|| ClaimInfo::empty(user_id)))
    }

    /// Grants `count` randomly drawn cards, debiting the full progression
    /// cost up front. Rejects before any mutation when the balance cannot
    /// cover the total; a balance that moves mid-flight loses the race and
    /// is retried once.
    #[instrument(skip(self), target = "claim", fields(user_id = %user_id, count = %count))]
    pub async fn claim(&self, user_id: &str, count: u32) -> EngineResult<Vec<Card>> {
        if count == 0 || count > self.cfg.max_per_invocation {
            return Err(EngineError::validation(
                "Invalid count",
                format!("count must be between 1 and {}", self.cfg.max_per_invocation),
            ));
        }

        retry_conflict_once(|| self.claim_once(user_id, count)).await
    }

    async fn claim_once(&self, user_id: &str, count: u32) -> EngineResult<Vec<Card>> {
        let user = self
            .users
            .get(user_id)
            .await
            .map_err(EngineError::storage)?
            .ok_or_else(|| EngineError::not_found("user", user_id))?;

        let now = self.clock.now();
        let info = self.claim_info(user_id).await?;
        let claims_so_far = info.effective_claims(now, self.cfg.window);

        // A dead or missing anchor restarts the rolling window.
        let window_live = info.window_start.is_some_and(|anchor| {
            now.signed_duration_since(anchor)
                .to_std()
                .map_or(true, |gap| gap <= self.cfg.window)
        });
        let new_window_start = if window_live { None } else { Some(now) };

        let total = total_claim_cost(self.cfg.base_price, claims_so_far, count as i64);
        if user.flakes < total {
            Counters::bump(&self.counters.claims_rejected);
            return Err(EngineError::validation(
                "Insufficient balance",
                format!("you need {total} flakes but hold {}", user.flakes),
            ));
        }

        let catalog = self
            .cards
            .get_all()
            .await
            .map_err(EngineError::storage)?;
        let drawn = self.draw_cards(&catalog, count as usize)?;
        let card_ids: Vec<i64> = drawn.iter().map(|c| c.card_id).collect();

        let outcome = self
            .repo
            .apply_claim(user_id, total, &card_ids, now, new_window_start)
            .await
            .map_err(EngineError::storage)?;

        match outcome {
            ClaimApplyOutcome::Applied => {
                Counters::bump(&self.counters.claims_granted);
                info!(granted = drawn.len(), total_cost = total, "claim granted");
                Ok(drawn)
            }
            ClaimApplyOutcome::InsufficientFunds => {
                Counters::bump(&self.counters.claims_rejected);
                Err(EngineError::conflict("balance changed during claim"))
            }
        }
    }

    /// Independent weighted draws over the claimable catalog. Rarity
    /// weights renormalize over non-empty buckets; within a bucket the
    /// pick is uniform.
    fn draw_cards(&self, catalog: &[Card], count: usize) -> EngineResult<Vec<Card>> {
        let mut buckets: [Vec<&Card>; 5] = Default::default();
        for card in catalog {
            buckets[(card.level - 1) as usize].push(card);
        }
        let available = [
            !buckets[0].is_empty(),
            !buckets[1].is_empty(),
            !buckets[2].is_empty(),
            !buckets[3].is_empty(),
            !buckets[4].is_empty(),
        ];

        let mut rng = self.rng.lock();
        let mut drawn = Vec::with_capacity(count);
        for _ in 0..count {
            let level = sample_level(&mut *rng, &self.cfg.rarity_weights, available)
                .ok_or_else(|| {
                    EngineError::validation(
                        "No cards available",
                        "the catalog holds no claimable cards",
                    )
                })?;
            let bucket = &buckets[(level - 1) as usize];
            let pick = bucket[rng.gen_range(0..bucket.len())];
            drawn.push(pick.clone());
        }

        Ok(drawn)
    }

    /// Grants the daily stipend, stamps `last_daily`, and resets the claim
    /// counters, all in one transaction.
    #[instrument(skip(self), target = "claim", fields(user_id = %user_id))]
    pub async fn daily(&self, user_id: &str) -> EngineResult<DailyReward> {
        let user = self
            .users
            .get(user_id)
            .await
            .map_err(EngineError::storage)?
            .ok_or_else(|| EngineError::not_found("user", user_id))?;

        let now = self.clock.now();
        let window = chrono::Duration::milliseconds(self.daily_cfg.window.as_millis() as i64);

        if let Some(last) = user.last_daily {
            let next_at = last + window;
            if now < next_at {
                return Err(EngineError::validation(
                    "Daily already claimed",
                    format!("your next daily reward unlocks at {next_at}"),
                ));
            }
        }

        let applied = self
            .repo
            .apply_daily(user_id, self.daily_cfg.reward_flakes, now)
            .await
            .map_err(EngineError::storage)?;
        if !applied {
            return Err(EngineError::not_found("user", user_id));
        }

        info!(reward = self.daily_cfg.reward_flakes, "daily reward granted");
        Ok(DailyReward {
            flakes: self.daily_cfg.reward_flakes,
            next_at: now + window,
        })
    }
}
