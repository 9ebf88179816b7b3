//! Reward math for work outcomes. Pure functions over the user's matching
//! holdings; the engine owns data access.

use rand::Rng;

use crate::config::{RewardSpec, WorkConfig};

/// What the user's matching holdings look like for one bonus lane.
#[derive(Clone, Copy, Debug, Default)]
pub struct BonusInputs {
    /// Copies held that match the lane (tag match or collection match).
    pub matching_copies: i64,
    /// Highest level among matching cards, 0 when nothing matches.
    pub max_level: u8,
    pub any_animated: bool,
}

/// Matching copies required before either bonus lane engages.
pub const BONUS_MIN_MATCHES: i64 = 3;

/// Tag lane: `1 + 0.02*min(copies,10) + 0.05*(max_level-1) + 0.10*animated`,
/// capped, and only with at least [`BONUS_MIN_MATCHES`] matching copies.
pub fn tag_multiplier(cfg: &WorkConfig, inputs: &BonusInputs) -> f64 {
    if inputs.matching_copies < BONUS_MIN_MATCHES {
        return 1.0;
    }
    let m = 1.0
        + 0.02 * inputs.matching_copies.min(10) as f64
        + 0.05 * inputs.max_level.saturating_sub(1) as f64
        + if inputs.any_animated { 0.10 } else { 0.0 };
    m.min(cfg.tag_bonus_cap)
}

/// Collection lane: `1 + 0.10*min(copies,5) + 0.05*(max_level-1) + 0.10*animated`,
/// same gating and its own cap.
pub fn collection_multiplier(cfg: &WorkConfig, inputs: &BonusInputs) -> f64 {
    if inputs.matching_copies < BONUS_MIN_MATCHES {
        return 1.0;
    }
    let m = 1.0
        + 0.10 * inputs.matching_copies.min(5) as f64
        + 0.05 * inputs.max_level.saturating_sub(1) as f64
        + if inputs.any_animated { 0.10 } else { 0.0 };
    m.min(cfg.collection_bonus_cap)
}

pub fn combined_multiplier(cfg: &WorkConfig, tag: f64, collection: f64) -> f64 {
    (tag * collection).min(cfg.combined_bonus_cap)
}

/// Scales a reward line, flooring every field.
pub fn scale_rewards(base: RewardSpec, multiplier: f64) -> RewardSpec {
    RewardSpec {
        flakes: (base.flakes as f64 * multiplier).floor() as i64,
        vials: (base.vials as f64 * multiplier).floor() as i64,
        xp: (base.xp as f64 * multiplier).floor() as i64,
    }
}

const ITEM_POOL: &[&str] = &[
    "polish_kit",
    "stage_pass",
    "spark_fragment",
    "prism_shard",
    "encore_ticket",
];

/// Item drops by scenario rarity: 2 rolls 3%, 3 rolls 9%, 4 guarantees
/// one, 5 guarantees one with a 50% second.
pub fn roll_item_drops<R: Rng + ?Sized>(rng: &mut R, rarity: u8) -> Vec<String> {
    let mut drops = Vec::new();
    let mut draw = |rng: &mut R| ITEM_POOL[rng.gen_range(0..ITEM_POOL.len())].to_string();

    match rarity {
        2 => {
            if rng.gen_bool(0.03) {
                drops.push(draw(rng));
            }
        }
        3 => {
            if rng.gen_bool(0.09) {
                drops.push(draw(rng));
            }
        }
        4 => drops.push(draw(rng)),
        5 => {
            drops.push(draw(rng));
            if rng.gen_bool(0.5) {
                drops.push(draw(rng));
            }
        }
        _ => {}
    }

    drops
}
