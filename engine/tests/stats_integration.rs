mod support;

use std::sync::Arc;

use chrono::Utc;
use sqlx::AnyPool;

use engine::catalog::SqlxCardRepo;
use engine::config::{PricingConfig, StatsConfig};
use engine::inventory::SqlxUserCardRepo;
use engine::market::{PriceCalculator, SqlxMarketHistoryRepo};
use engine::metrics::Counters;
use engine::stats::{SqlxEconomyStatsRepo, StatsCollector};
use engine::stats::repository::EconomyStatsRepo;
use engine::time::{Clock, ManualClock};
use engine::users::SqlxUserRepo;

use support::{manual_clock, seed_card, seed_collection, seed_user, seed_user_card, setup_pool};

fn collector(pool: &AnyPool, clock: Arc<ManualClock>) -> StatsCollector {
    let pricing = Arc::new(PriceCalculator::new(
        Arc::new(SqlxCardRepo::new(pool.clone())),
        Arc::new(SqlxUserCardRepo::new(pool.clone())),
        Arc::new(SqlxMarketHistoryRepo::new(pool.clone())),
        clock.clone() as Arc<dyn Clock>,
        PricingConfig::default(),
        Counters::default(),
    ));

    StatsCollector::new(
        Arc::new(SqlxUserRepo::new(pool.clone())),
        Arc::new(SqlxUserCardRepo::new(pool.clone())),
        pricing,
        Arc::new(SqlxEconomyStatsRepo::new(pool.clone())),
        clock as Arc<dyn Clock>,
        StatsConfig::default(),
        Counters::default(),
    )
}

#[tokio::test]
async fn empty_economy_produces_a_zeroed_snapshot() {
    let pool = setup_pool().await;
    let clock = manual_clock();

    let snapshot = collector(&pool, clock).collect().await.unwrap();

    assert_eq!(snapshot.total_users, 0);
    assert_eq!(snapshot.active_users, 0);
    assert_eq!(snapshot.total_flakes, 0);
    assert_eq!(snapshot.gini_flakes, 0.0);
    assert!(!snapshot.correction_active || snapshot.health_score < 40.0);

    // The snapshot persisted.
    let repo = SqlxEconomyStatsRepo::new(pool.clone());
    assert!(repo.latest().await.unwrap().is_some());
}

#[tokio::test]
async fn equal_balances_have_zero_gini() {
    let pool = setup_pool().await;
    let clock = manual_clock();
    for i in 0..4 {
        seed_user(&pool, &format!("u{i}"), 100, Some(Utc::now())).await;
    }

    let snapshot = collector(&pool, clock).collect().await.unwrap();

    assert_eq!(snapshot.total_users, 4);
    assert_eq!(snapshot.active_users, 4);
    assert_eq!(snapshot.total_flakes, 400);
    assert!(snapshot.gini_flakes.abs() < 1e-12);
    assert_eq!(snapshot.flakes.median, 100);
}

#[tokio::test]
async fn single_holder_gini_matches_the_closed_form() {
    let pool = setup_pool().await;
    let clock = manual_clock();
    seed_user(&pool, "whale", 1_000, None).await;
    for i in 0..3 {
        seed_user(&pool, &format!("u{i}"), 0, None).await;
    }

    let snapshot = collector(&pool, clock).collect().await.unwrap();

    // (n - 1) / n for one non-zero balance among 4.
    assert!((snapshot.gini_flakes - 0.75).abs() < 1e-12);
    assert_eq!(snapshot.active_users, 0);
}

#[tokio::test]
async fn card_wealth_folds_through_batched_prices() {
    let pool = setup_pool().await;
    let clock = manual_clock();
    seed_collection(&pool, 1, "debut", false, false).await;
    // Thin markets: both cards price at the level-1 base of 500.
    seed_card(&pool, 1, "print a", 1, 1, false, &["stage"]).await;
    seed_card(&pool, 2, "print b", 1, 1, false, &["stage"]).await;

    seed_user(&pool, "holder", 250, Some(Utc::now())).await;
    seed_user_card(&pool, "holder", 1, 2).await;
    seed_user_card(&pool, "holder", 2, 1).await;

    let snapshot = collector(&pool, clock).collect().await.unwrap();

    assert_eq!(snapshot.total_card_value, 1_500);
    assert_eq!(snapshot.card_value.median, 1_500);
    // Wealth bucket: 250 flakes + 1500 card value lands in 1k-10k.
    assert_eq!(snapshot.buckets.0[1], 1);
}

#[tokio::test]
async fn trends_compare_the_two_latest_snapshots() {
    let pool = setup_pool().await;
    let clock = manual_clock();
    seed_user(&pool, "u1", 1_000, Some(Utc::now())).await;

    let c = collector(&pool, clock.clone());
    c.collect().await.unwrap();

    // Balance doubles between snapshots.
    sqlx::query("UPDATE users SET flakes = 2000 WHERE user_id = 'u1';")
        .execute(&pool)
        .await
        .unwrap();
    clock.advance(std::time::Duration::from_secs(3600));
    c.collect().await.unwrap();

    let trends = c.trends().await.unwrap().unwrap();
    assert_eq!(trends.latest.total_flakes, 2_000);
    assert_eq!(trends.previous.as_ref().unwrap().total_flakes, 1_000);
    assert!((trends.volume_change_percent - 100.0).abs() < 1e-9);
}

#[tokio::test]
async fn many_users_fold_across_batches() {
    let pool = setup_pool().await;
    let clock = manual_clock();

    // 450 users span three batches at the default batch size of 200.
    for i in 0..450i64 {
        seed_user(&pool, &format!("u{i}"), i, None).await;
    }

    let snapshot = collector(&pool, clock).collect().await.unwrap();

    assert_eq!(snapshot.total_users, 450);
    assert_eq!(snapshot.total_flakes, (0..450i64).sum::<i64>());
    assert_eq!(snapshot.buckets.0.iter().sum::<u64>(), 450);
}
