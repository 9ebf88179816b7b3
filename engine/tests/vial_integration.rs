mod support;

use std::sync::Arc;

use sqlx::AnyPool;

use engine::catalog::SqlxCardRepo;
use engine::config::{PricingConfig, VialConfig};
use engine::error::EngineError;
use engine::inventory::SqlxUserCardRepo;
use engine::market::{PriceCalculator, SqlxMarketHistoryRepo};
use engine::metrics::Counters;
use engine::time::{Clock, ManualClock};
use engine::vial::{SqlxVialRepo, VialEngine};

use support::{
    card_amount, manual_clock, seed_card, seed_collection, seed_user, seed_user_card, setup_pool,
    vials_of,
};

fn vial_engine(pool: &AnyPool, clock: Arc<ManualClock>) -> VialEngine {
    let pricing = Arc::new(PriceCalculator::new(
        Arc::new(SqlxCardRepo::new(pool.clone())),
        Arc::new(SqlxUserCardRepo::new(pool.clone())),
        Arc::new(SqlxMarketHistoryRepo::new(pool.clone())),
        clock.clone() as Arc<dyn Clock>,
        PricingConfig::default(),
        Counters::default(),
    ));

    VialEngine::new(
        Arc::new(SqlxCardRepo::new(pool.clone())),
        Arc::new(SqlxUserCardRepo::new(pool.clone())),
        pricing,
        Arc::new(SqlxVialRepo::new(pool.clone())),
        clock as Arc<dyn Clock>,
        VialConfig::default(),
        Counters::default(),
    )
}

#[tokio::test]
async fn liquefy_consumes_one_copy_and_credits_the_yield() {
    let pool = setup_pool().await;
    let clock = manual_clock();
    seed_collection(&pool, 1, "debut", false, false).await;
    // Thin market: a level-3 card prices at the 1125 base fallback.
    seed_card(&pool, 7, "stage light", 1, 3, false, &["stage"]).await;
    seed_user(&pool, "u1", 0, None).await;
    seed_user_card(&pool, "u1", 7, 2).await;

    let engine = vial_engine(&pool, clock);
    let receipt = engine.liquefy("u1", 7).await.unwrap();

    // Level 3 liquefies at ratio 0.20: floor(1125 * 0.20) = 225.
    assert_eq!(receipt.price, 1_125);
    assert_eq!(receipt.vials_gained, 225);
    assert_eq!(card_amount(&pool, "u1", 7).await, 1);
    assert_eq!(vials_of(&pool, "u1").await, 225);
}

#[tokio::test]
async fn higher_levels_yield_a_better_ratio() {
    let pool = setup_pool().await;
    let clock = manual_clock();
    seed_collection(&pool, 1, "debut", false, false).await;
    seed_card(&pool, 1, "opening act", 1, 1, false, &["stage"]).await;
    seed_card(&pool, 2, "finale", 1, 5, false, &["stage"]).await;
    seed_user(&pool, "u1", 0, None).await;
    seed_user_card(&pool, "u1", 1, 1).await;
    seed_user_card(&pool, "u1", 2, 1).await;

    let engine = vial_engine(&pool, clock);

    let low = engine.quote(1).await.unwrap();
    let high = engine.quote(2).await.unwrap();
    assert!(low.ratio < high.ratio);
    assert!(low.vials_gained < high.vials_gained);
}

#[tokio::test]
async fn liquefy_requires_a_held_unlocked_copy() {
    let pool = setup_pool().await;
    let clock = manual_clock();
    seed_collection(&pool, 1, "debut", false, false).await;
    seed_card(&pool, 7, "stage light", 1, 2, false, &["stage"]).await;
    seed_card(&pool, 8, "locked print", 1, 2, false, &["stage"]).await;
    seed_user(&pool, "u1", 0, None).await;
    seed_user_card(&pool, "u1", 8, 1).await;
    sqlx::query("UPDATE user_cards SET locked = TRUE WHERE user_id = 'u1' AND card_id = 8;")
        .execute(&pool)
        .await
        .unwrap();

    let engine = vial_engine(&pool, clock);

    // No copy at all.
    assert!(matches!(
        engine.liquefy("u1", 7).await,
        Err(EngineError::Validation { .. })
    ));

    // A locked copy does not liquefy.
    assert!(matches!(
        engine.liquefy("u1", 8).await,
        Err(EngineError::Validation { .. })
    ));
    assert_eq!(card_amount(&pool, "u1", 8).await, 1);
    assert_eq!(vials_of(&pool, "u1").await, 0);
}

#[tokio::test]
async fn last_copy_liquefies_to_an_absent_row() {
    let pool = setup_pool().await;
    let clock = manual_clock();
    seed_collection(&pool, 1, "debut", false, false).await;
    seed_card(&pool, 7, "stage light", 1, 1, false, &["stage"]).await;
    seed_user(&pool, "u1", 0, None).await;
    seed_user_card(&pool, "u1", 7, 1).await;

    let engine = vial_engine(&pool, clock);
    engine.liquefy("u1", 7).await.unwrap();

    assert_eq!(card_amount(&pool, "u1", 7).await, 0);
    // A second attempt finds nothing to consume.
    assert!(matches!(
        engine.liquefy("u1", 7).await,
        Err(EngineError::Validation { .. })
    ));
}
