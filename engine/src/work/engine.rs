use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, instrument};

use crate::catalog::model::Card;
use crate::catalog::repository::CardRepo;
use crate::claim::rarity::sample_level;
use crate::config::{RewardSpec, WorkConfig};
use crate::error::{EngineError, EngineResult};
use crate::inventory::model::Holding;
use crate::inventory::repository::UserCardRepo;
use crate::metrics::Counters;
use crate::time::Clock;
use crate::users::repository::UserRepo;
use crate::work::repository::WorkRepo;
use crate::work::rewards::{
    self, BonusInputs, collection_multiplier, combined_multiplier, scale_rewards, tag_multiplier,
};
use crate::work::scenario::{self, ScenarioKind};
use crate::work::state::{PendingWork, WorkSessions};

/// What the user sees when a scenario opens. The correct option index
/// never leaves the engine.
#[derive(Clone, Debug)]
pub struct WorkPrompt {
    pub kind: ScenarioKind,
    pub rarity: u8,
    pub prompt: String,
    pub options: [String; 4],
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct WorkOutcome {
    pub success: bool,
    pub correct_option: String,
    pub rewards: RewardSpec,
    /// Combined bonus multiplier that was applied (1.0 on failure).
    pub multiplier: f64,
    pub items: Vec<String>,
}

/// Runs the work mini-game: scenario out, answer in, rewards scaled by the
/// user's matching card holdings.
pub struct WorkEngine {
    users: Arc<dyn UserRepo>,
    cards: Arc<dyn CardRepo>,
    inventory: Arc<dyn UserCardRepo>,
    repo: Arc<dyn WorkRepo>,
    clock: Arc<dyn Clock>,
    cfg: WorkConfig,
    counters: Counters,
    sessions: WorkSessions,
    rng: Mutex<StdRng>,
}

impl WorkEngine {
    pub fn new(
        users: Arc<dyn UserRepo>,
        cards: Arc<dyn CardRepo>,
        inventory: Arc<dyn UserCardRepo>,
        repo: Arc<dyn WorkRepo>,
        clock: Arc<dyn Clock>,
        cfg: WorkConfig,
        counters: Counters,
    ) -> Self {
        Self::with_rng(
            users,
            cards,
            inventory,
            repo,
            clock,
            cfg,
            counters,
            StdRng::from_entropy(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_rng(
        users: Arc<dyn UserRepo>,
        cards: Arc<dyn CardRepo>,
        inventory: Arc<dyn UserCardRepo>,
        repo: Arc<dyn WorkRepo>,
        clock: Arc<dyn Clock>,
        cfg: WorkConfig,
        counters: Counters,
        rng: StdRng,
    ) -> Self {
        Self {
            users,
            cards,
            inventory,
            repo,
            clock,
            cfg,
            counters,
            sessions: WorkSessions::new(),
            rng: Mutex::new(rng),
        }
    }

    /// Opens a scenario for the user. One open prompt per user; answers
    /// from anyone else never touch it.
    #[instrument(skip(self), target = "work", fields(user_id = %user_id))]
    pub async fn start(&self, user_id: &str) -> EngineResult<WorkPrompt> {
        let user = self
            .users
            .get(user_id)
            .await
            .map_err(EngineError::storage)?
            .ok_or_else(|| EngineError::not_found("user", user_id))?;

        let now = self.clock.now();
        let cooldown = chrono::Duration::milliseconds(self.cfg.cooldown.as_millis() as i64);

        if let Some(last) = user.last_work {
            let ready_at = last + cooldown;
            if now < ready_at {
                return Err(EngineError::validation(
                    "On cooldown",
                    format!("your next work session unlocks at {ready_at}"),
                ));
            }
        }

        let collections = self
            .cards
            .collections()
            .await
            .map_err(EngineError::storage)?;

        let scenario = {
            let mut rng = self.rng.lock();
            let rarity = sample_level(&mut *rng, &self.cfg.rarity_weights, [true; 5])
                .ok_or_else(|| {
                    EngineError::validation("No scenarios available", "work is disabled")
                })?;
            scenario::generate(&mut *rng, rarity, &collections)
        };

        let prompt = WorkPrompt {
            kind: scenario.kind,
            rarity: scenario.rarity,
            prompt: scenario.prompt.clone(),
            options: scenario.options.clone(),
            expires_at: now
                + chrono::Duration::milliseconds(self.cfg.answer_window.as_millis() as i64),
        };

        let pending = PendingWork {
            user_id: user_id.to_string(),
            scenario,
            issued_at: now,
        };

        if self
            .sessions
            .begin(pending, now, self.cfg.answer_window)
            .is_err()
        {
            return Err(EngineError::validation(
                "Work in progress",
                "answer your open scenario first",
            ));
        }

        info!(rarity = prompt.rarity, kind = prompt.kind.as_str(), "work scenario opened");
        Ok(prompt)
    }

    /// Evaluates the user's answer and pays out. Success scales the base
    /// reward by the tag and collection bonuses of the user's holdings;
    /// failure pays the nominal consolation line.
    #[instrument(skip(self), target = "work", fields(user_id = %user_id, choice = %choice))]
    pub async fn answer(&self, user_id: &str, choice: usize) -> EngineResult<WorkOutcome> {
        if choice >= 4 {
            return Err(EngineError::validation(
                "Invalid answer",
                "pick one of the four options",
            ));
        }

        let pending = self.sessions.take(user_id).ok_or_else(|| {
            EngineError::validation("No open scenario", "start a work session first")
        })?;

        let now = self.clock.now();
        let expired = now
            .signed_duration_since(pending.issued_at)
            .to_std()
            .map_or(false, |gap| gap > self.cfg.answer_window);
        if expired {
            return Err(EngineError::validation(
                "Scenario expired",
                "the answer window closed; start a new work session",
            ));
        }

        let scenario = pending.scenario;
        let success = choice == scenario.correct;

        let (rewards, multiplier) = if success {
            let holdings = self
                .inventory
                .holdings_with_cards(user_id)
                .await
                .map_err(EngineError::storage)?;

            let tag_inputs = bonus_inputs(&holdings, |card| {
                scenario.required_tags.iter().any(|t| card.has_tag(t))
            });
            let col_inputs = bonus_inputs(&holdings, |card| {
                scenario.collection_bonus == Some(card.collection_id)
            });

            let tag_m = tag_multiplier(&self.cfg, &tag_inputs);
            let col_m = collection_multiplier(&self.cfg, &col_inputs);
            let combined = combined_multiplier(&self.cfg, tag_m, col_m);

            let base = self.cfg.base_rewards[(scenario.rarity - 1) as usize];
            (scale_rewards(base, combined), combined)
        } else {
            (self.cfg.failure_reward, 1.0)
        };

        let items = if success {
            let mut rng = self.rng.lock();
            rewards::roll_item_drops(&mut *rng, scenario.rarity)
        } else {
            Vec::new()
        };

        let applied = self
            .repo
            .apply_outcome(user_id, rewards, &items, now)
            .await
            .map_err(EngineError::storage)?;
        if !applied {
            return Err(EngineError::not_found("user", user_id));
        }

        Counters::bump(&self.counters.work_sessions);
        info!(
            success,
            multiplier,
            flakes = rewards.flakes,
            items = items.len(),
            "work scenario resolved"
        );

        Ok(WorkOutcome {
            success,
            correct_option: scenario.options[scenario.correct].clone(),
            rewards,
            multiplier,
            items,
        })
    }
}

/// Folds one bonus lane's inputs out of the user's holdings.
fn bonus_inputs(holdings: &[Holding], matches: impl Fn(&Card) -> bool) -> BonusInputs {
    let mut inputs = BonusInputs::default();
    for h in holdings {
        if !matches(&h.card) {
            continue;
        }
        inputs.matching_copies += h.amount;
        inputs.max_level = inputs.max_level.max(h.card.level);
        inputs.any_animated |= h.card.animated;
    }
    inputs
}
