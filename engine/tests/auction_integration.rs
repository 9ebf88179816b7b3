mod support;

use std::sync::Arc;
use std::time::Duration;

use sqlx::AnyPool;

use engine::auction::repository::SettleOutcome;
use engine::auction::{AuctionManager, SqlxAuctionRepo};
use engine::catalog::SqlxCardRepo;
use engine::config::AuctionConfig;
use engine::error::EngineError;
use engine::inventory::SqlxUserCardRepo;
use engine::metrics::Counters;
use engine::scheduler::SettlementQueue;
use engine::time::{Clock, ManualClock};

use support::{
    card_amount, flakes_of, manual_clock, seed_card, seed_collection, seed_user, seed_user_card,
    setup_pool, total_copies,
};

fn manager(pool: &AnyPool, clock: Arc<ManualClock>) -> AuctionManager {
    let (queue, _rx) = SettlementQueue::bounded(8);
    AuctionManager::new(
        Arc::new(SqlxAuctionRepo::new(pool.clone())),
        Arc::new(SqlxCardRepo::new(pool.clone())),
        Arc::new(SqlxUserCardRepo::new(pool.clone())),
        clock as Arc<dyn Clock>,
        AuctionConfig::default(),
        Counters::default(),
        queue,
    )
}

async fn seed_market(pool: &AnyPool) {
    seed_collection(pool, 1, "debut", false, false).await;
    seed_card(pool, 7, "stage light", 1, 3, false, &["stage"]).await;
    seed_user(pool, "seller", 0, None).await;
    seed_user(pool, "b1", 1_000, None).await;
    seed_user(pool, "b2", 2_000, None).await;
    seed_user_card(pool, "seller", 7, 2).await;
}

#[tokio::test]
async fn create_escrows_one_copy() {
    let pool = setup_pool().await;
    let clock = manual_clock();
    seed_market(&pool).await;

    let m = manager(&pool, clock);
    let auction = m
        .create("seller", 7, 500, Duration::from_secs(600))
        .await
        .unwrap();

    assert_eq!(auction.start_price, 500);
    assert_eq!(auction.current_price, 500);
    assert_eq!(auction.bid_count, 0);
    assert!(auction.code.len() == 6 && auction.code.starts_with("ST"));
    assert_eq!(card_amount(&pool, "seller", 7).await, 1);
}

#[tokio::test]
async fn happy_path_bid_refund_and_settlement() {
    let pool = setup_pool().await;
    let clock = manual_clock();
    seed_market(&pool).await;

    let m = manager(&pool, clock.clone());
    let auction = m
        .create("seller", 7, 500, Duration::from_secs(600))
        .await
        .unwrap();

    // Escrow conservation: two copies total, one held in escrow.
    assert_eq!(total_copies(&pool, 7).await, 1);

    // Opening bid at the start price.
    let a = m.place_bid(auction.auction_id, "b1", 500).await.unwrap();
    assert_eq!(a.current_price, 500);
    assert_eq!(flakes_of(&pool, "b1").await, 500);

    // One below the increment floor (500 + 10) is rejected.
    let err = m.place_bid(auction.auction_id, "b2", 509).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation { .. }));

    // A full increment displaces and refunds the previous top bidder.
    let a = m.place_bid(auction.auction_id, "b2", 510).await.unwrap();
    assert_eq!(a.current_price, 510);
    assert_eq!(a.bid_count, 2);
    assert_eq!(flakes_of(&pool, "b1").await, 1_000);
    assert_eq!(flakes_of(&pool, "b2").await, 1_490);

    // The audit trail holds both bids in strictly increasing order.
    let history = m.bid_history(auction.auction_id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].amount < history[1].amount);
    assert_eq!(history[1].bidder_id, "b2");

    clock.advance(Duration::from_secs(601));

    let outcome = m.settle(auction.auction_id).await.unwrap();
    let SettleOutcome::Completed {
        auction: settled,
        seller_proceeds,
    } = outcome
    else {
        panic!("expected completion, got {outcome:?}");
    };

    assert_eq!(settled.current_price, 510);
    // 5% fee on 510 flakes.
    assert_eq!(seller_proceeds, 485);
    assert_eq!(flakes_of(&pool, "seller").await, 485);
    assert_eq!(card_amount(&pool, "b2", 7).await, 1);
    assert_eq!(card_amount(&pool, "seller", 7).await, 1);
    assert_eq!(total_copies(&pool, 7).await, 2);
}

#[tokio::test]
async fn settlement_is_idempotent() {
    let pool = setup_pool().await;
    let clock = manual_clock();
    seed_market(&pool).await;

    let m = manager(&pool, clock.clone());
    let auction = m
        .create("seller", 7, 500, Duration::from_secs(600))
        .await
        .unwrap();
    m.place_bid(auction.auction_id, "b1", 500).await.unwrap();

    clock.advance(Duration::from_secs(601));
    m.settle(auction.auction_id).await.unwrap();

    // The second run must not move funds or cards again.
    let outcome = m.settle(auction.auction_id).await.unwrap();
    assert!(matches!(outcome, SettleOutcome::AlreadySettled));
    assert_eq!(card_amount(&pool, "b1", 7).await, 1);
    assert_eq!(flakes_of(&pool, "seller").await, 475);
}

#[tokio::test]
async fn no_bids_expires_and_restores_escrow() {
    let pool = setup_pool().await;
    let clock = manual_clock();
    seed_market(&pool).await;

    let m = manager(&pool, clock.clone());
    let auction = m
        .create("seller", 7, 500, Duration::from_secs(600))
        .await
        .unwrap();
    assert_eq!(card_amount(&pool, "seller", 7).await, 1);

    clock.advance(Duration::from_secs(601));

    let outcome = m.settle(auction.auction_id).await.unwrap();
    assert!(matches!(outcome, SettleOutcome::Expired(_)));
    assert_eq!(card_amount(&pool, "seller", 7).await, 2);
    assert_eq!(total_copies(&pool, 7).await, 2);
}

#[tokio::test]
async fn anti_snipe_extends_the_deadline() {
    let pool = setup_pool().await;
    let clock = manual_clock();
    seed_market(&pool).await;

    let m = manager(&pool, clock.clone());
    let auction = m
        .create("seller", 7, 500, Duration::from_secs(600))
        .await
        .unwrap();
    let original_end = auction.end;

    // 30s before the deadline, inside the 60s snipe window.
    clock.advance(Duration::from_secs(570));
    let a = m.place_bid(auction.auction_id, "b1", 500).await.unwrap();
    assert_eq!(a.end, original_end + chrono::Duration::seconds(60));

    // The old deadline passing is no longer enough to settle.
    clock.advance(Duration::from_secs(31));
    let outcome = m.settle(auction.auction_id).await.unwrap();
    let SettleOutcome::NotDue { end } = outcome else {
        panic!("expected NotDue, got {outcome:?}");
    };
    assert_eq!(end, a.end);
}

#[tokio::test]
async fn early_bids_do_not_extend() {
    let pool = setup_pool().await;
    let clock = manual_clock();
    seed_market(&pool).await;

    let m = manager(&pool, clock.clone());
    let auction = m
        .create("seller", 7, 500, Duration::from_secs(600))
        .await
        .unwrap();

    clock.advance(Duration::from_secs(60));
    let a = m.place_bid(auction.auction_id, "b1", 500).await.unwrap();
    assert_eq!(a.end, auction.end);
}

#[tokio::test]
async fn bid_preconditions_are_enforced() {
    let pool = setup_pool().await;
    let clock = manual_clock();
    seed_market(&pool).await;

    let m = manager(&pool, clock.clone());
    let auction = m
        .create("seller", 7, 500, Duration::from_secs(600))
        .await
        .unwrap();

    // Sellers cannot bid on their own auction.
    assert!(matches!(
        m.place_bid(auction.auction_id, "seller", 600).await,
        Err(EngineError::Validation { .. })
    ));

    // First bid below the start price.
    assert!(matches!(
        m.place_bid(auction.auction_id, "b1", 499).await,
        Err(EngineError::Validation { .. })
    ));

    // More flakes than the bidder holds.
    assert!(matches!(
        m.place_bid(auction.auction_id, "b1", 1_500).await,
        Err(EngineError::Validation { .. })
    ));
    assert_eq!(flakes_of(&pool, "b1").await, 1_000);

    // Bids after the deadline.
    clock.advance(Duration::from_secs(601));
    assert!(matches!(
        m.place_bid(auction.auction_id, "b1", 500).await,
        Err(EngineError::Validation { .. })
    ));
}

#[tokio::test]
async fn cancel_only_before_first_bid() {
    let pool = setup_pool().await;
    let clock = manual_clock();
    seed_market(&pool).await;

    let m = manager(&pool, clock.clone());
    let auction = m
        .create("seller", 7, 500, Duration::from_secs(600))
        .await
        .unwrap();

    // Only the seller may cancel.
    assert!(matches!(
        m.cancel(auction.auction_id, "b1").await,
        Err(EngineError::Validation { .. })
    ));

    let cancelled = m.cancel(auction.auction_id, "seller").await.unwrap();
    assert_eq!(cancelled.status, engine::auction::AuctionStatus::Cancelled);
    assert_eq!(card_amount(&pool, "seller", 7).await, 2);

    // A second auction with a bid cannot be cancelled.
    let auction = m
        .create("seller", 7, 500, Duration::from_secs(600))
        .await
        .unwrap();
    m.place_bid(auction.auction_id, "b1", 500).await.unwrap();
    assert!(matches!(
        m.cancel(auction.auction_id, "seller").await,
        Err(EngineError::Validation { .. })
    ));
}

#[tokio::test]
async fn create_preconditions_are_enforced() {
    let pool = setup_pool().await;
    let clock = manual_clock();
    seed_market(&pool).await;
    seed_card(&pool, 9, "legendary finale", 1, 5, true, &["stage"]).await;
    seed_user_card(&pool, "seller", 9, 1).await;

    let m = manager(&pool, clock);

    // Legendary cards are excluded.
    assert!(matches!(
        m.create("seller", 9, 500, Duration::from_secs(600)).await,
        Err(EngineError::Validation { .. })
    ));

    // Below the start-price floor.
    assert!(matches!(
        m.create("seller", 7, 50, Duration::from_secs(600)).await,
        Err(EngineError::Validation { .. })
    ));

    // Duration out of range.
    assert!(matches!(
        m.create("seller", 7, 500, Duration::from_secs(10)).await,
        Err(EngineError::Validation { .. })
    ));
    assert!(matches!(
        m.create("seller", 7, 500, Duration::from_secs(48 * 3600)).await,
        Err(EngineError::Validation { .. })
    ));

    // No copy held.
    assert!(matches!(
        m.create("b1", 7, 500, Duration::from_secs(600)).await,
        Err(EngineError::Validation { .. })
    ));

    // Escrow never went out for any rejected attempt.
    assert_eq!(card_amount(&pool, "seller", 7).await, 2);
}

#[tokio::test]
async fn codes_are_unique_across_many_auctions() {
    let pool = setup_pool().await;
    let clock = manual_clock();
    seed_collection(&pool, 1, "debut", false, false).await;
    seed_card(&pool, 7, "stage light", 1, 3, false, &["stage"]).await;
    seed_user(&pool, "seller", 0, None).await;
    seed_user_card(&pool, "seller", 7, 30).await;

    let m = manager(&pool, clock);

    let mut codes = std::collections::HashSet::new();
    let mut ids = std::collections::HashSet::new();
    for _ in 0..30 {
        let auction = m
            .create("seller", 7, 500, Duration::from_secs(600))
            .await
            .unwrap();
        assert!(codes.insert(auction.code.clone()), "duplicate {}", auction.code);
        assert!(ids.insert(auction.auction_id), "duplicate id {}", auction.auction_id);
    }
}
