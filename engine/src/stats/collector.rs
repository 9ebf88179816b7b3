use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::{info, instrument, warn};

use common::logger::warn_if_slow;

use crate::config::StatsConfig;
use crate::error::{EngineError, EngineResult};
use crate::inventory::repository::UserCardRepo;
use crate::market::calculator::PriceCalculator;
use crate::metrics::Counters;
use crate::stats::gini::gini;
use crate::stats::model::{
    EconomyStats, EconomyTrends, WealthBuckets, positive_quantiles,
};
use crate::stats::repository::EconomyStatsRepo;
use crate::time::Clock;
use crate::users::model::User;
use crate::users::repository::UserRepo;

/// Weight split of the health score components.
const HEALTH_GINI_WEIGHT: f64 = 0.4;
const HEALTH_ACTIVE_WEIGHT: f64 = 0.3;
const HEALTH_VOLUME_WEIGHT: f64 = 0.3;

/// Per-user fold result inside a batch.
struct UserWealth {
    flakes: i64,
    card_value: i64,
    active: bool,
}

/// Periodic (and on-demand) aggregation of the whole economy into one
/// snapshot: totals, quantiles, Gini, wealth buckets, health score.
pub struct StatsCollector {
    users: Arc<dyn UserRepo>,
    inventory: Arc<dyn UserCardRepo>,
    pricing: Arc<PriceCalculator>,
    repo: Arc<dyn EconomyStatsRepo>,
    clock: Arc<dyn Clock>,
    cfg: StatsConfig,
    counters: Counters,
    workers: usize,
}

impl StatsCollector {
    pub fn new(
        users: Arc<dyn UserRepo>,
        inventory: Arc<dyn UserCardRepo>,
        pricing: Arc<PriceCalculator>,
        repo: Arc<dyn EconomyStatsRepo>,
        clock: Arc<dyn Clock>,
        cfg: StatsConfig,
        counters: Counters,
    ) -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            users,
            inventory,
            pricing,
            repo,
            clock,
            cfg,
            counters,
            workers,
        }
    }

    /// Aggregates every user and persists the snapshot.
    #[instrument(skip(self), target = "stats")]
    pub async fn collect(&self) -> EngineResult<EconomyStats> {
        let now = self.clock.now();

        let users = warn_if_slow("stats_user_scan", Duration::from_secs(2), async {
            self.users.list().await
        })
        .await
        .map_err(EngineError::storage)?;

        let total_users = users.len() as i64;

        // Batches fold concurrently on a pool sized to the CPU count; each
        // batch prices its cards through one batched calculator call.
        let batches: Vec<Vec<User>> = users
            .chunks(self.cfg.batch_size.max(1))
            .map(|c| c.to_vec())
            .collect();

        let folded: Vec<EngineResult<Vec<UserWealth>>> =
            futures::stream::iter(batches.into_iter().map(|batch| async move {
                self.fold_batch(batch, now).await
            }))
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut wealth: Vec<UserWealth> = Vec::with_capacity(users.len());
        for res in folded {
            wealth.extend(res?);
        }

        let active_users = wealth.iter().filter(|w| w.active).count() as i64;
        let total_flakes: i64 = wealth.iter().map(|w| w.flakes).sum();
        let total_card_value: i64 = wealth.iter().map(|w| w.card_value).sum();

        let flake_balances: Vec<i64> = wealth.iter().map(|w| w.flakes).collect();
        let card_values: Vec<i64> = wealth.iter().map(|w| w.card_value).collect();

        let mut buckets = WealthBuckets::default();
        for w in &wealth {
            buckets.add(w.flakes + w.card_value);
        }

        let gini_flakes = gini(&flake_balances);
        let active_fraction = if total_users > 0 {
            active_users as f64 / total_users as f64
        } else {
            0.0
        };

        let previous = self.repo.latest().await.map_err(EngineError::storage)?;
        let volume = total_flakes + total_card_value;
        let volume_change_percent = match &previous {
            Some(prev) if prev.volume() > 0 => {
                (volume - prev.volume()) as f64 / prev.volume() as f64 * 100.0
            }
            _ => 0.0,
        };

        let health_score = health_score(gini_flakes, active_fraction, volume_change_percent);

        let snapshot = EconomyStats {
            created_at: now,
            total_users,
            active_users,
            total_flakes,
            total_card_value,
            flakes: positive_quantiles(&flake_balances),
            card_value: positive_quantiles(&card_values),
            gini_flakes,
            buckets,
            health_score,
            correction_active: health_score < self.cfg.correction_threshold,
        };

        self.repo
            .create(&snapshot)
            .await
            .map_err(EngineError::storage)?;

        Counters::bump(&self.counters.stats_runs);
        info!(
            total_users,
            active_users,
            gini = format!("{gini_flakes:.3}"),
            health = format!("{health_score:.1}"),
            "economy snapshot collected"
        );

        Ok(snapshot)
    }

    /// The two latest snapshots with the volume move between them.
    pub async fn trends(&self) -> EngineResult<Option<EconomyTrends>> {
        let recent = self.repo.recent(2).await.map_err(EngineError::storage)?;
        let mut iter = recent.into_iter();

        let latest = match iter.next() {
            Some(s) => s,
            None => return Ok(None),
        };
        let previous = iter.next();

        let volume_change_percent = match &previous {
            Some(prev) if prev.volume() > 0 => {
                (latest.volume() - prev.volume()) as f64 / prev.volume() as f64 * 100.0
            }
            _ => 0.0,
        };

        Ok(Some(EconomyTrends {
            latest,
            previous,
            volume_change_percent,
        }))
    }

    async fn fold_batch(
        &self,
        batch: Vec<User>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> EngineResult<Vec<UserWealth>> {
        // Holdings per user, then every card in the batch priced at once.
        let mut holdings = Vec::with_capacity(batch.len());
        let mut card_ids: Vec<i64> = Vec::new();
        for user in &batch {
            let user_holdings = self
                .inventory
                .holdings_with_cards(&user.user_id)
                .await
                .map_err(EngineError::storage)?;
            card_ids.extend(user_holdings.iter().map(|h| h.card.card_id));
            holdings.push(user_holdings);
        }

        let prices = self.pricing.price_of_batch(&card_ids).await?;
        if !prices.missing.is_empty() {
            warn!(
                missing = prices.missing.len(),
                "cards without prices excluded from wealth fold"
            );
        }

        let out = batch
            .iter()
            .zip(holdings)
            .map(|(user, user_holdings)| {
                let card_value = user_holdings
                    .iter()
                    .filter_map(|h| {
                        prices
                            .prices
                            .get(&h.card.card_id)
                            .map(|price| h.amount * price)
                    })
                    .sum();
                UserWealth {
                    flakes: user.flakes,
                    card_value,
                    active: user.is_active(now, self.cfg.active_window),
                }
            })
            .collect();

        Ok(out)
    }
}

/// Composite health score in [0, 100]: distribution equality, active
/// fraction, and volume trend, weighted 40/30/30. The volume component
/// maps a ±20% swing onto its full range.
pub fn health_score(gini: f64, active_fraction: f64, volume_change_percent: f64) -> f64 {
    let gini_component = (1.0 - gini.clamp(0.0, 1.0)) * 100.0;
    let active_component = active_fraction.clamp(0.0, 1.0) * 100.0;
    let volume_component = (50.0 + volume_change_percent * 2.5).clamp(0.0, 100.0);

    (HEALTH_GINI_WEIGHT * gini_component
        + HEALTH_ACTIVE_WEIGHT * active_component
        + HEALTH_VOLUME_WEIGHT * volume_component)
        .clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_economy_scores_near_the_top() {
        // Equal wealth, everyone active, steady volume.
        let score = health_score(0.0, 1.0, 0.0);
        assert!((score - 85.0).abs() < 1e-9);
    }

    #[test]
    fn collapsed_economy_scores_near_the_bottom() {
        let score = health_score(1.0, 0.0, -100.0);
        assert!(score.abs() < 1e-9);
    }

    #[test]
    fn volume_component_saturates() {
        let up = health_score(0.5, 0.5, 500.0);
        let more_up = health_score(0.5, 0.5, 5_000.0);
        assert_eq!(up, more_up);
    }

    #[test]
    fn score_stays_in_range() {
        for gini in [0.0, 0.3, 0.9, 1.0] {
            for active in [0.0, 0.5, 1.0] {
                for vol in [-1_000.0, -10.0, 0.0, 10.0, 1_000.0] {
                    let s = health_score(gini, active, vol);
                    assert!((0.0..=100.0).contains(&s));
                }
            }
        }
    }
}
