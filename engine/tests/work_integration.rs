mod support;

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use sqlx::{AnyPool, Row};

use engine::config::WorkConfig;
use engine::catalog::SqlxCardRepo;
use engine::error::EngineError;
use engine::inventory::SqlxUserCardRepo;
use engine::metrics::Counters;
use engine::time::{Clock, ManualClock};
use engine::users::SqlxUserRepo;
use engine::work::{SqlxWorkRepo, WorkEngine};

use support::{
    flakes_of, manual_clock, seed_card, seed_collection, seed_user, seed_user_card, setup_pool,
};

fn work_engine(pool: &AnyPool, clock: Arc<ManualClock>, seed: u64) -> WorkEngine {
    WorkEngine::with_rng(
        Arc::new(SqlxUserRepo::new(pool.clone())),
        Arc::new(SqlxCardRepo::new(pool.clone())),
        Arc::new(SqlxUserCardRepo::new(pool.clone())),
        Arc::new(SqlxWorkRepo::new(pool.clone())),
        clock as Arc<dyn Clock>,
        WorkConfig::default(),
        Counters::default(),
        StdRng::seed_from_u64(seed),
    )
}

async fn seed_world(pool: &AnyPool) {
    seed_collection(pool, 1, "debut", false, false).await;
    seed_card(pool, 1, "backdrop", 1, 1, false, &["stage"]).await;
    seed_user(pool, "u1", 0, None).await;
}

/// Identically seeded engines over identical state produce the same
/// scenario, so trying every option across four fresh copies finds the
/// winning answer exactly once.
async fn outcomes_for_every_choice(
    seed: u64,
) -> Vec<(usize, engine::work::WorkOutcome, AnyPool)> {
    let mut out = Vec::new();
    for choice in 0..4 {
        let pool = setup_pool().await;
        seed_world(&pool).await;
        let clock = manual_clock();
        let engine = work_engine(&pool, clock, seed);

        engine.start("u1").await.unwrap();
        let outcome = engine.answer("u1", choice).await.unwrap();
        out.push((choice, outcome, pool));
    }
    out
}

#[tokio::test]
async fn exactly_one_choice_succeeds_and_pays_more() {
    let runs = outcomes_for_every_choice(17).await;

    let successes: Vec<_> = runs.iter().filter(|(_, o, _)| o.success).collect();
    assert_eq!(successes.len(), 1);

    let failure_cfg = WorkConfig::default().failure_reward;
    for (_, outcome, pool) in &runs {
        if outcome.success {
            assert!(outcome.rewards.flakes > failure_cfg.flakes);
            assert_eq!(flakes_of(pool, "u1").await, outcome.rewards.flakes);
        } else {
            assert_eq!(outcome.rewards.flakes, failure_cfg.flakes);
            assert_eq!(outcome.rewards.vials, failure_cfg.vials);
            assert_eq!(flakes_of(pool, "u1").await, failure_cfg.flakes);
        }
        // Every outcome names the right answer.
        assert!(!outcome.correct_option.is_empty());
    }
}

#[tokio::test]
async fn answer_stamps_last_work_and_starts_cooldown() {
    let pool = setup_pool().await;
    seed_world(&pool).await;
    let clock = manual_clock();
    let engine = work_engine(&pool, clock.clone(), 3);

    engine.start("u1").await.unwrap();
    engine.answer("u1", 0).await.unwrap();

    let last_work: Option<i64> = sqlx::query("SELECT last_work_ms FROM users WHERE user_id = 'u1';")
        .fetch_one(&pool)
        .await
        .unwrap()
        .get("last_work_ms");
    assert!(last_work.is_some());

    // Still cooling down.
    assert!(matches!(
        engine.start("u1").await,
        Err(EngineError::Validation { .. })
    ));

    clock.advance(Duration::from_secs(3601));
    engine.start("u1").await.unwrap();
}

#[tokio::test]
async fn only_one_prompt_per_user_at_a_time() {
    let pool = setup_pool().await;
    seed_world(&pool).await;
    let clock = manual_clock();
    let engine = work_engine(&pool, clock, 5);

    engine.start("u1").await.unwrap();
    assert!(matches!(
        engine.start("u1").await,
        Err(EngineError::Validation { .. })
    ));
}

#[tokio::test]
async fn answers_are_rejected_without_an_open_prompt() {
    let pool = setup_pool().await;
    seed_world(&pool).await;
    seed_user(&pool, "bystander", 0, None).await;
    let clock = manual_clock();
    let engine = work_engine(&pool, clock, 7);

    engine.start("u1").await.unwrap();

    // A different user answering the same message sees nothing.
    assert!(matches!(
        engine.answer("bystander", 0).await,
        Err(EngineError::Validation { .. })
    ));

    // The owner's prompt is still answerable afterwards.
    engine.answer("u1", 0).await.unwrap();

    // And a second answer finds nothing.
    assert!(matches!(
        engine.answer("u1", 0).await,
        Err(EngineError::Validation { .. })
    ));
}

#[tokio::test]
async fn late_answers_expire() {
    let pool = setup_pool().await;
    seed_world(&pool).await;
    let clock = manual_clock();
    let engine = work_engine(&pool, clock.clone(), 11);

    engine.start("u1").await.unwrap();
    clock.advance(Duration::from_secs(120));

    assert!(matches!(
        engine.answer("u1", 0).await,
        Err(EngineError::Validation { .. })
    ));
    // Nothing was paid out.
    assert_eq!(flakes_of(&pool, "u1").await, 0);
}

#[tokio::test]
async fn matching_holdings_raise_the_payout() {
    // Two identical worlds except one user holds bonus-relevant cards.
    let seed = 17;

    let bare_pool = setup_pool().await;
    seed_world(&bare_pool).await;

    let rich_pool = setup_pool().await;
    seed_world(&rich_pool).await;
    // Matching copies for every tag lane used by the pools.
    for (card_id, tag) in [
        (11, "stage"),
        (12, "vocal"),
        (13, "variety"),
        (14, "photo"),
        (15, "studio"),
        (16, "tour"),
    ] {
        seed_card(&rich_pool, card_id, &format!("{tag} print"), 1, 4, true, &[tag]).await;
        seed_user_card(&rich_pool, "u1", card_id, 5).await;
    }

    // Find the winning choice in the bare world, then replay both.
    let mut winning = None;
    for (choice, outcome, _) in outcomes_for_every_choice(seed).await {
        if outcome.success {
            winning = Some(choice);
        }
    }
    let winning = winning.unwrap();

    let bare = work_engine(&bare_pool, manual_clock(), seed);
    bare.start("u1").await.unwrap();
    let bare_outcome = bare.answer("u1", winning).await.unwrap();
    assert!(bare_outcome.success);
    assert_eq!(bare_outcome.multiplier, 1.0);

    let rich = work_engine(&rich_pool, manual_clock(), seed);
    rich.start("u1").await.unwrap();
    let rich_outcome = rich.answer("u1", winning).await.unwrap();
    assert!(rich_outcome.success);
    assert!(rich_outcome.multiplier > 1.0);
    assert!(rich_outcome.rewards.flakes > bare_outcome.rewards.flakes);
}
