use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bounds of the wealth buckets; the last bucket is open-ended.
pub const BUCKET_BOUNDS: [i64; 6] = [1_000, 10_000, 50_000, 100_000, 500_000, 1_000_000];

pub const BUCKET_LABELS: [&str; 7] = [
    "0-1k", "1k-10k", "10k-50k", "50k-100k", "100k-500k", "500k-1M", "1M+",
];

/// Population counts per wealth bucket. Serialized as JSON into the
/// snapshot row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WealthBuckets(pub [u64; 7]);

impl WealthBuckets {
    pub fn add(&mut self, wealth: i64) {
        self.0[bucket_index(wealth)] += 1;
    }

    pub fn labeled(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        BUCKET_LABELS.iter().copied().zip(self.0.iter().copied())
    }
}

pub fn bucket_index(wealth: i64) -> usize {
    BUCKET_BOUNDS
        .iter()
        .position(|bound| wealth < *bound)
        .unwrap_or(BUCKET_BOUNDS.len())
}

/// Low/middle/high quantiles of a positive population.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Quantiles {
    pub bottom: i64,
    pub median: i64,
    pub top: i64,
}

/// Decile-based summary: bottom is p10, top is p90. Zero-valued entries
/// are excluded before ranking.
pub fn positive_quantiles(values: &[i64]) -> Quantiles {
    let mut positive: Vec<i64> = values.iter().copied().filter(|v| *v > 0).collect();
    if positive.is_empty() {
        return Quantiles::default();
    }
    positive.sort_unstable();

    let rank = |q: f64| -> i64 {
        let idx = ((positive.len() - 1) as f64 * q).round() as usize;
        positive[idx]
    };

    Quantiles {
        bottom: rank(0.10),
        median: rank(0.50),
        top: rank(0.90),
    }
}

/// One economy snapshot.
#[derive(Clone, Debug)]
pub struct EconomyStats {
    pub created_at: DateTime<Utc>,

    pub total_users: i64,
    /// Users with a daily reward inside the activity window.
    pub active_users: i64,
    pub total_flakes: i64,
    /// Σ over users of Σ (amount * price).
    pub total_card_value: i64,

    pub flakes: Quantiles,
    pub card_value: Quantiles,

    pub gini_flakes: f64,
    pub buckets: WealthBuckets,

    /// Composite 0..=100 indicator of economy health.
    pub health_score: f64,
    pub correction_active: bool,
}

impl EconomyStats {
    /// Market volume proxy used by the trend component.
    pub fn volume(&self) -> i64 {
        self.total_flakes + self.total_card_value
    }
}

/// The two latest snapshots compared.
#[derive(Clone, Debug)]
pub struct EconomyTrends {
    pub latest: EconomyStats,
    pub previous: Option<EconomyStats>,
    /// Percent change in volume against the previous snapshot; 0 without
    /// history.
    pub volume_change_percent: f64,
}
