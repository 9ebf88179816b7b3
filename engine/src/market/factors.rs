//! Pure price math. Everything here is deterministic over its inputs; the
//! calculator owns data access and caching.

use crate::config::PricingConfig;
use crate::inventory::model::CardAggregates;
use crate::market::types::{PriceFactors, PriceReason};

/// Factor clamp bounds applied to each signal before weighting.
pub const FACTOR_MIN: f64 = 0.5;
pub const FACTOR_MAX: f64 = 3.0;

fn clamp_factor(v: f64) -> f64 {
    v.clamp(FACTOR_MIN, FACTOR_MAX)
}

/// Level-scaled base price: `base_price * level_multiplier^(level-1)`.
pub fn base_price_for_level(cfg: &PricingConfig, level: u8) -> i64 {
    let scaled = cfg.base_price as f64 * cfg.level_multiplier.powi(level.saturating_sub(1) as i32);
    clamp_price(cfg, scaled)
}

/// A card is established once enough distinct active owners and copies
/// exist for the distribution signals to mean anything.
pub fn is_established(cfg: &PricingConfig, agg: &CardAggregates) -> bool {
    agg.active_owners >= cfg.min_active_owners && agg.total_copies >= cfg.min_total_copies
}

pub fn compute_factors(cfg: &PricingConfig, agg: &CardAggregates) -> PriceFactors {
    let total = agg.total_copies.max(1) as f64;

    let scarcity_gap = (cfg.min_total_copies - agg.total_copies).max(0) as f64;
    let scarcity = 1.0 + cfg.scarcity_impact * scarcity_gap / cfg.min_total_copies.max(1) as f64;

    let distribution =
        1.0 + cfg.distribution_impact * (agg.total_copies - agg.unique_owners).max(0) as f64 / total;

    let hoard_gap = (agg.max_per_user - cfg.hoarding_threshold).max(0) as f64;
    let hoarding = 1.0 + cfg.hoarding_impact * hoard_gap / cfg.hoarding_threshold.max(1) as f64;

    let active_fraction = agg.active_copies as f64 / total;
    let activity = if active_fraction >= cfg.activity_floor {
        1.0 + cfg.activity_impact * active_fraction
    } else {
        // Below the floor the signal flips into a symmetric discount.
        1.0 - cfg.activity_impact * (cfg.activity_floor - active_fraction)
    };

    PriceFactors {
        scarcity: clamp_factor(scarcity),
        distribution: clamp_factor(distribution),
        hoarding: clamp_factor(hoarding),
        activity: clamp_factor(activity),
    }
}

/// Weighted composite of the factor deviations from neutral.
pub fn composite_multiplier(cfg: &PricingConfig, f: &PriceFactors) -> f64 {
    1.0 + cfg.scarcity_weight * (f.scarcity - 1.0)
        + cfg.activity_weight * (f.activity - 1.0)
        + (f.distribution - 1.0)
        + (f.hoarding - 1.0)
}

pub fn price_from_factors(cfg: &PricingConfig, level: u8, f: &PriceFactors) -> i64 {
    let base = cfg.base_price as f64 * cfg.level_multiplier.powi(level.saturating_sub(1) as i32);
    clamp_price(cfg, base * composite_multiplier(cfg, f))
}

fn clamp_price(cfg: &PricingConfig, raw: f64) -> i64 {
    (raw.floor() as i64).clamp(cfg.min_price, cfg.max_price)
}

/// Picks the reason string for a computed price: the dominant deviation
/// wins; near-neutral composites read as balanced.
pub fn describe(f: &PriceFactors, multiplier: f64) -> PriceReason {
    if (multiplier - 1.0).abs() < 0.05 {
        return PriceReason::Balanced;
    }
    if multiplier < 1.0 {
        return PriceReason::InactiveDiscount;
    }

    let scarcity_dev = f.scarcity - 1.0;
    let hoarding_dev = f.hoarding - 1.0;
    let distribution_dev = f.distribution - 1.0;

    if scarcity_dev >= hoarding_dev && scarcity_dev >= distribution_dev {
        PriceReason::ScarcityPremium
    } else if hoarding_dev >= distribution_dev {
        PriceReason::HoardingPremium
    } else {
        PriceReason::ConcentrationPremium
    }
}
