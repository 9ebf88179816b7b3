use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tracing::{debug, instrument, warn};

use common::logger::warn_if_slow;

use crate::catalog::model::Card;
use crate::catalog::repository::CardRepo;
use crate::config::PricingConfig;
use crate::error::{EngineError, EngineResult};
use crate::inventory::model::CardAggregates;
use crate::inventory::repository::UserCardRepo;
use crate::market::cache::PriceCache;
use crate::market::factors;
use crate::market::history::{MarketHistoryRepo, MarketSample};
use crate::market::types::{BatchPrices, ComputedPrice, MarketStats, PriceFactors, PriceReason};
use crate::metrics::Counters;
use crate::time::Clock;

/// Computes per-card prices from inventory distribution signals.
///
/// All reads go through a TTL cache with per-card single-flight; batch
/// requests aggregate a whole chunk of cards in one store round-trip and
/// run chunks concurrently up to a small cap. Every full recompute appends
/// a market history sample.
pub struct PriceCalculator {
    cards: Arc<dyn CardRepo>,
    inventory: Arc<dyn UserCardRepo>,
    history: Arc<dyn MarketHistoryRepo>,
    clock: Arc<dyn Clock>,
    cache: PriceCache,
    cfg: PricingConfig,
    counters: Counters,
}

impl PriceCalculator {
    pub fn new(
        cards: Arc<dyn CardRepo>,
        inventory: Arc<dyn UserCardRepo>,
        history: Arc<dyn MarketHistoryRepo>,
        clock: Arc<dyn Clock>,
        cfg: PricingConfig,
        counters: Counters,
    ) -> Self {
        Self {
            cards,
            inventory,
            history,
            clock,
            cache: PriceCache::new(cfg.cache_expiration),
            cfg,
            counters,
        }
    }

    /// Current price of one card.
    pub async fn price_of(&self, card_id: i64) -> EngineResult<i64> {
        Ok(self.computed_price_of(card_id).await?.price)
    }

    /// Drops a cached price. Called when a card leaves the catalog.
    pub fn invalidate(&self, card_id: i64) {
        self.cache.invalidate(card_id);
    }

    /// Current price with factors and reason, cached.
    #[instrument(skip(self), target = "pricing", fields(card_id = %card_id))]
    pub async fn computed_price_of(&self, card_id: i64) -> EngineResult<ComputedPrice> {
        if let Some(hit) = self.cache.get_fresh(card_id) {
            Counters::bump(&self.counters.price_cache_hits);
            return Ok(hit);
        }

        self.cache
            .get_or_compute(card_id, || self.compute_single(card_id))
            .await
    }

    /// Prices a set of cards, one aggregate round-trip per chunk of
    /// [`PricingConfig::batch_chunk`] ids, up to
    /// [`PricingConfig::batch_concurrency`] chunks in flight.
    ///
    /// Ids that cannot be priced (absent from the catalog, or inside a
    /// failed chunk) come back in [`BatchPrices::missing`] instead of
    /// failing the whole batch.
    #[instrument(skip_all, target = "pricing", fields(requested = ids.len()))]
    pub async fn price_of_batch(&self, ids: &[i64]) -> EngineResult<BatchPrices> {
        let mut out = BatchPrices::default();

        let mut to_compute: Vec<i64> = Vec::new();
        let mut seen: HashSet<i64> = HashSet::new();
        for &id in ids {
            if !seen.insert(id) {
                continue;
            }
            match self.cache.get_fresh(id) {
                Some(hit) => {
                    Counters::bump(&self.counters.price_cache_hits);
                    out.prices.insert(id, hit.price);
                }
                None => to_compute.push(id),
            }
        }

        if to_compute.is_empty() {
            return Ok(out);
        }

        Counters::bump(&self.counters.price_batches);

        let chunks: Vec<Vec<i64>> = to_compute
            .chunks(self.cfg.batch_chunk.max(1))
            .map(|c| c.to_vec())
            .collect();

        let results: Vec<(Vec<i64>, EngineResult<Vec<ComputedPrice>>)> =
            futures::stream::iter(chunks.into_iter().map(|chunk| async move {
                let res = self.compute_chunk(&chunk).await;
                (chunk, res)
            }))
            .buffer_unordered(self.cfg.batch_concurrency.max(1))
            .collect()
            .await;

        for (chunk, res) in results {
            match res {
                Ok(computed) => {
                    let mut priced: HashSet<i64> = HashSet::new();
                    for c in computed {
                        priced.insert(c.card_id);
                        out.prices.insert(c.card_id, c.price);
                        self.cache.insert(c);
                    }
                    // Ids the catalog no longer knows.
                    out.missing.extend(chunk.into_iter().filter(|id| !priced.contains(id)));
                }
                Err(e) => {
                    warn!(error = %e, chunk_len = chunk.len(), "price chunk failed");
                    out.missing.extend(chunk);
                }
            }
        }

        if !out.missing.is_empty() {
            out.missing.sort_unstable();
            debug!(missing = ?out.missing, "batch left ids unpriced");
        }

        Ok(out)
    }

    /// Min/max/avg over the last 24 hours of samples. An empty window
    /// degrades to the caller-provided reference price.
    pub async fn market_stats(
        &self,
        card_id: i64,
        reference_price: i64,
    ) -> EngineResult<MarketStats> {
        let since = self.clock.now() - chrono::Duration::hours(24);
        let samples = self
            .history
            .in_range(card_id, since)
            .await
            .map_err(EngineError::storage)?;

        if samples.is_empty() {
            return Ok(MarketStats {
                min_24h: reference_price,
                max_24h: reference_price,
                avg_24h: reference_price,
                samples: 0,
            });
        }

        let mut min = i64::MAX;
        let mut max = i64::MIN;
        let mut sum: i64 = 0;
        for s in &samples {
            min = min.min(s.price);
            max = max.max(s.price);
            sum += s.price;
        }

        Ok(MarketStats {
            min_24h: min,
            max_24h: max,
            avg_24h: sum / samples.len() as i64,
            samples: samples.len(),
        })
    }

    async fn compute_single(&self, card_id: i64) -> EngineResult<ComputedPrice> {
        let card = self
            .cards
            .get(card_id)
            .await
            .map_err(EngineError::storage)?
            .ok_or_else(|| EngineError::not_found("card", card_id))?;

        let aggs = warn_if_slow("pricing_aggregates", Duration::from_millis(250), async {
            self.inventory
                .aggregates_for(&[card_id], self.active_since())
                .await
        })
        .await
        .map_err(EngineError::storage)?;

        let computed = self.build_computed(&card, aggs.first().copied());
        self.record_sample(&computed).await?;

        Counters::bump(&self.counters.price_computations);
        Ok(computed)
    }

    async fn compute_chunk(&self, ids: &[i64]) -> EngineResult<Vec<ComputedPrice>> {
        let cards = self
            .cards
            .get_by_ids(ids)
            .await
            .map_err(EngineError::storage)?;

        let aggs = warn_if_slow("pricing_chunk_aggregates", Duration::from_millis(500), async {
            self.inventory.aggregates_for(ids, self.active_since()).await
        })
        .await
        .map_err(EngineError::storage)?;

        let by_id: HashMap<i64, CardAggregates> =
            aggs.into_iter().map(|a| (a.card_id, a)).collect();

        let mut out = Vec::with_capacity(cards.len());
        for card in &cards {
            let computed = self.build_computed(card, by_id.get(&card.card_id).copied());
            self.record_sample(&computed).await?;
            Counters::bump(&self.counters.price_computations);
            out.push(computed);
        }

        Ok(out)
    }

    /// Factor evaluation over one card's aggregates. Cards below the
    /// establishment floors take the level base price.
    fn build_computed(&self, card: &Card, agg: Option<CardAggregates>) -> ComputedPrice {
        let now = self.clock.now();

        let established = agg
            .as_ref()
            .is_some_and(|a| factors::is_established(&self.cfg, a));

        if !established {
            return ComputedPrice {
                card_id: card.card_id,
                price: factors::base_price_for_level(&self.cfg, card.level),
                factors: PriceFactors::neutral(),
                reason: PriceReason::InsufficientData,
                aggregates: agg.unwrap_or(CardAggregates {
                    card_id: card.card_id,
                    ..CardAggregates::default()
                }),
                computed_at: now,
            };
        }

        let agg = agg.unwrap_or_default();
        let f = factors::compute_factors(&self.cfg, &agg);
        let multiplier = factors::composite_multiplier(&self.cfg, &f);
        let price = factors::price_from_factors(&self.cfg, card.level, &f);

        ComputedPrice {
            card_id: card.card_id,
            price,
            factors: f,
            reason: factors::describe(&f, multiplier),
            aggregates: agg,
            computed_at: now,
        }
    }

    async fn record_sample(&self, computed: &ComputedPrice) -> EngineResult<()> {
        let previous = self
            .history
            .latest(computed.card_id)
            .await
            .map_err(EngineError::storage)?;

        let price_change_percent = match previous {
            Some(prev) if prev.price > 0 => {
                (computed.price - prev.price) as f64 / prev.price as f64 * 100.0
            }
            _ => 0.0,
        };

        let sample = MarketSample {
            card_id: computed.card_id,
            created_at: computed.computed_at,
            price: computed.price,
            factors: computed.factors,
            aggregates: computed.aggregates,
            price_change_percent,
            price_reason: computed.reason.as_str().to_string(),
        };

        self.history
            .append(&sample)
            .await
            .map_err(EngineError::storage)
    }

    fn active_since(&self) -> DateTime<Utc> {
        self.clock.now()
            - chrono::Duration::milliseconds(self.cfg.inactivity_threshold.as_millis() as i64)
    }
}
