use std::time::Duration;

/// Reward line of the work payout table.
#[derive(Clone, Copy, Debug)]
pub struct RewardSpec {
    pub flakes: i64,
    pub vials: i64,
    pub xp: i64,
}

/// Dynamic pricing tunables.
///
/// Prices are derived from inventory aggregates; every knob here shifts how
/// strongly a market signal moves the final price. Factors are clamped to
/// [0.5, 3.0] regardless of these settings.
#[derive(Clone, Debug)]
pub struct PricingConfig {
    /// Price of a level-1 card with no market data.
    pub base_price: i64,

    /// Per-level geometric growth of the base price
    /// (`base_price * level_multiplier^(level-1)`).
    pub level_multiplier: f64,

    /// A user counts as inactive when `last_daily` is older than this.
    /// Inactive copies do not count toward the activity signal.
    pub inactivity_threshold: Duration,

    /// Hard output bounds for every computed price.
    pub min_price: i64,
    pub max_price: i64,

    /// A card with fewer active owners or total copies than these floors is
    /// not considered established; it falls back to the level base price.
    pub min_active_owners: i64,
    pub min_total_copies: i64,

    /// Weights of the scarcity and activity terms in the composite
    /// multiplier. Distribution and hoarding contribute with weight 1.
    pub scarcity_weight: f64,
    pub activity_weight: f64,

    pub scarcity_impact: f64,
    pub distribution_impact: f64,

    /// Copies-per-user count above which the hoarding factor engages.
    pub hoarding_threshold: i64,
    pub hoarding_impact: f64,

    pub activity_impact: f64,

    /// Active fraction below which the activity factor turns into a
    /// symmetric discount instead of a premium.
    pub activity_floor: f64,

    /// Cadence of the background full-catalog refresh.
    pub price_update_interval: Duration,

    /// Validity window of a cached price.
    pub cache_expiration: Duration,

    /// Max card ids per aggregate round-trip in a batch computation.
    pub batch_chunk: usize,

    /// Max aggregate round-trips in flight during a batch computation.
    pub batch_concurrency: usize,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            base_price: 500,
            level_multiplier: 1.5,
            inactivity_threshold: Duration::from_secs(7 * 24 * 3600),
            min_price: 100,
            max_price: 50_000,
            min_active_owners: 3,
            min_total_copies: 5,
            scarcity_weight: 0.4,
            activity_weight: 0.25,
            scarcity_impact: 0.6,
            distribution_impact: 0.3,
            hoarding_threshold: 10,
            hoarding_impact: 0.4,
            activity_impact: 0.5,
            activity_floor: 0.2,
            price_update_interval: Duration::from_secs(15 * 60),
            cache_expiration: Duration::from_secs(5 * 60),
            batch_chunk: 25,
            batch_concurrency: 4,
        }
    }
}

/// Claim (random card draw) tunables.
#[derive(Clone, Debug)]
pub struct ClaimConfig {
    /// Cost anchor: the n-th claim of the rolling day costs
    /// `base_price * (claims_so_far + n)`.
    pub base_price: i64,

    /// Upper bound on cards per invocation.
    pub max_per_invocation: u32,

    /// Draw weights by card level 1..=5. Level 5 stays at zero: legendaries
    /// are never claimable.
    pub rarity_weights: [u32; 5],

    /// Length of the rolling claim-count window.
    pub window: Duration,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            base_price: 100,
            max_per_invocation: 10,
            rarity_weights: [70, 20, 7, 3, 0],
            window: Duration::from_secs(24 * 3600),
        }
    }
}

/// Auction lifecycle tunables.
#[derive(Clone, Debug)]
pub struct AuctionConfig {
    pub min_start_price: i64,

    /// Allowed auction duration range.
    pub min_duration: Duration,
    pub max_duration: Duration,

    /// Minimum outbid step as a fraction of the current price, in basis
    /// points. The absolute step never drops below one flake.
    pub min_increment_bps: i64,

    /// A bid landing closer to the deadline than this window extends the
    /// auction by `snipe_extension`.
    pub snipe_window: Duration,
    pub snipe_extension: Duration,

    /// Fee retained from the seller's proceeds, in basis points.
    pub seller_fee_bps: i64,

    /// Settlement attempts before the auction is left Active and alerted on.
    pub settle_max_retries: u32,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            min_start_price: 100,
            min_duration: Duration::from_secs(5 * 60),
            max_duration: Duration::from_secs(24 * 3600),
            min_increment_bps: 200,
            snipe_window: Duration::from_secs(60),
            snipe_extension: Duration::from_secs(60),
            seller_fee_bps: 500,
            settle_max_retries: 3,
        }
    }
}

/// Work mini-game tunables.
#[derive(Clone, Debug)]
pub struct WorkConfig {
    /// Minimum gap between work sessions per user.
    pub cooldown: Duration,

    /// How long a prompt stays answerable.
    pub answer_window: Duration,

    /// Scenario rarity weights 1..=5.
    pub rarity_weights: [u32; 5],

    /// Success payouts by scenario rarity 1..=5.
    pub base_rewards: [RewardSpec; 5],

    /// Consolation payout on a wrong answer.
    pub failure_reward: RewardSpec,

    /// Bonus multiplier ceilings.
    pub tag_bonus_cap: f64,
    pub collection_bonus_cap: f64,
    pub combined_bonus_cap: f64,
}

impl Default for WorkConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(3600),
            answer_window: Duration::from_secs(60),
            rarity_weights: [40, 30, 15, 10, 5],
            base_rewards: [
                RewardSpec { flakes: 50, vials: 1, xp: 10 },
                RewardSpec { flakes: 100, vials: 2, xp: 20 },
                RewardSpec { flakes: 200, vials: 4, xp: 40 },
                RewardSpec { flakes: 400, vials: 8, xp: 80 },
                RewardSpec { flakes: 800, vials: 16, xp: 160 },
            ],
            failure_reward: RewardSpec { flakes: 10, vials: 0, xp: 5 },
            tag_bonus_cap: 1.5,
            collection_bonus_cap: 1.5,
            combined_bonus_cap: 3.0,
        }
    }
}

/// Liquefaction tunables.
#[derive(Clone, Debug)]
pub struct VialConfig {
    /// Vial yield as a fraction of the live market price, indexed by card
    /// level 1..=5. Higher levels liquefy at a better rate.
    pub yield_ratios: [f64; 5],
}

impl Default for VialConfig {
    fn default() -> Self {
        Self {
            yield_ratios: [0.10, 0.15, 0.20, 0.25, 0.30],
        }
    }
}

/// Economy stats collection tunables.
#[derive(Clone, Debug)]
pub struct StatsConfig {
    /// Cadence of the periodic collection run.
    pub collect_interval: Duration,

    /// A user counts as active when `last_daily` is within this window.
    pub active_window: Duration,

    /// Users per aggregation batch. Batches fold in parallel on a worker
    /// pool sized to the CPU count.
    pub batch_size: usize,

    /// Health score below which the correction flag raises.
    pub correction_threshold: f64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            collect_interval: Duration::from_secs(3600),
            active_window: Duration::from_secs(7 * 24 * 3600),
            batch_size: 200,
            correction_threshold: 40.0,
        }
    }
}

/// Daily reward tunables.
#[derive(Clone, Debug)]
pub struct DailyConfig {
    /// Flake stipend granted once per window.
    pub reward_flakes: i64,

    /// Minimum gap between daily rewards.
    pub window: Duration,
}

impl Default for DailyConfig {
    fn default() -> Self {
        Self {
            reward_flakes: 500,
            window: Duration::from_secs(24 * 3600),
        }
    }
}

/// Component-level default deadlines applied at dispatch boundaries.
#[derive(Clone, Debug)]
pub struct DeadlineConfig {
    pub price_batch: Duration,
    pub claim: Duration,
    pub auction: Duration,
    pub stats: Duration,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            price_batch: Duration::from_secs(15),
            claim: Duration::from_secs(30),
            auction: Duration::from_secs(30),
            stats: Duration::from_secs(60),
        }
    }
}

/// Immutable top-level configuration, fixed at startup.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Database connection string.
    pub database_url: String,

    /// Switches logging to the production (json) format.
    pub production: bool,

    pub pricing: PricingConfig,
    pub claim: ClaimConfig,
    pub auction: AuctionConfig,
    pub work: WorkConfig,
    pub vial: VialConfig,
    pub stats: StatsConfig,
    pub daily: DailyConfig,
    pub deadlines: DeadlineConfig,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://economy_dev.db".to_string());
        let production = std::env::var("APP_ENV").unwrap_or_default() == "production";

        Self {
            database_url,
            production,
            pricing: PricingConfig::default(),
            claim: ClaimConfig::default(),
            auction: AuctionConfig::default(),
            work: WorkConfig::default(),
            vial: VialConfig::default(),
            stats: StatsConfig::default(),
            daily: DailyConfig::default(),
            deadlines: DeadlineConfig::default(),
        }
    }
}
