mod support;

use chrono::Utc;

use engine::catalog::model::CardQuery;
use engine::catalog::repository::CardRepo;
use engine::catalog::SqlxCardRepo;
use engine::claim::repository::ClaimRepo;
use engine::claim::SqlxClaimRepo;
use engine::inventory::repository::UserCardRepo;
use engine::inventory::SqlxUserCardRepo;
use engine::users::repository::UserRepo;
use engine::users::SqlxUserRepo;

use support::{
    card_amount, flakes_of, seed_card, seed_collection, seed_user, seed_user_card, setup_pool,
};

#[tokio::test]
async fn get_or_create_is_idempotent() {
    let pool = setup_pool().await;
    let repo = SqlxUserRepo::new(pool.clone());
    let now = Utc::now();

    let created = repo.get_or_create("u1", "collector", now).await.unwrap();
    assert_eq!(created.flakes, 0);
    assert_eq!(created.username, "collector");

    // A second call neither duplicates nor resets.
    repo.update_balance("u1", 500).await.unwrap();
    let again = repo.get_or_create("u1", "collector", now).await.unwrap();
    assert_eq!(again.flakes, 500);
    assert_eq!(repo.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn balance_guard_refuses_overdraft() {
    let pool = setup_pool().await;
    let repo = SqlxUserRepo::new(pool.clone());
    seed_user(&pool, "u1", 100, None).await;

    assert!(repo.update_balance("u1", -100).await.unwrap());
    assert!(!repo.update_balance("u1", -1).await.unwrap());
    assert_eq!(flakes_of(&pool, "u1").await, 0);
}

#[tokio::test]
async fn last_daily_and_last_work_round_trip() {
    let pool = setup_pool().await;
    let repo = SqlxUserRepo::new(pool.clone());
    seed_user(&pool, "u1", 0, None).await;

    let user = repo.get("u1").await.unwrap().unwrap();
    assert!(user.last_daily.is_none());
    assert!(user.last_work.is_none());

    let now = Utc::now();
    repo.update_last_daily("u1", now).await.unwrap();
    repo.update_last_work("u1", now).await.unwrap();

    let user = repo.get("u1").await.unwrap().unwrap();
    assert_eq!(
        user.last_daily.unwrap().timestamp_millis(),
        now.timestamp_millis()
    );
    assert_eq!(
        user.last_work.unwrap().timestamp_millis(),
        now.timestamp_millis()
    );
}

#[tokio::test]
async fn inventory_adjust_enforces_non_negativity() {
    let pool = setup_pool().await;
    let repo = SqlxUserCardRepo::new(pool.clone());
    seed_user(&pool, "u1", 0, None).await;
    seed_collection(&pool, 1, "debut", false, false).await;
    seed_card(&pool, 7, "stage light", 1, 2, false, &["stage"]).await;

    // Positive delta creates the row.
    assert!(repo.adjust("u1", 7, 2, Utc::now()).await.unwrap());
    assert_eq!(card_amount(&pool, "u1", 7).await, 2);

    // Down to zero is fine; below zero is refused.
    assert!(repo.adjust("u1", 7, -2, Utc::now()).await.unwrap());
    assert!(!repo.adjust("u1", 7, -1, Utc::now()).await.unwrap());
    assert_eq!(card_amount(&pool, "u1", 7).await, 0);

    // Decrement of an absent row is refused too.
    assert!(!repo.adjust("u1", 999, -1, Utc::now()).await.unwrap());

    // Zero-amount rows read as absent.
    assert!(repo.get("u1", 7).await.unwrap().is_none());
}

#[tokio::test]
async fn aggregates_split_active_and_inactive_owners() {
    let pool = setup_pool().await;
    let repo = SqlxUserCardRepo::new(pool.clone());
    seed_collection(&pool, 1, "debut", false, false).await;
    seed_card(&pool, 7, "stage light", 1, 2, false, &["stage"]).await;

    let now = Utc::now();
    seed_user(&pool, "active-1", 0, Some(now)).await;
    seed_user(&pool, "active-2", 0, Some(now - chrono::Duration::days(1))).await;
    seed_user(&pool, "dormant", 0, Some(now - chrono::Duration::days(30))).await;
    seed_user(&pool, "never", 0, None).await;

    seed_user_card(&pool, "active-1", 7, 3).await;
    seed_user_card(&pool, "active-2", 7, 1).await;
    seed_user_card(&pool, "dormant", 7, 5).await;
    seed_user_card(&pool, "never", 7, 1).await;

    let aggs = repo
        .aggregates_for(&[7], now - chrono::Duration::days(7))
        .await
        .unwrap();
    assert_eq!(aggs.len(), 1);

    let agg = aggs[0];
    assert_eq!(agg.total_copies, 10);
    assert_eq!(agg.active_copies, 4);
    assert_eq!(agg.unique_owners, 4);
    assert_eq!(agg.active_owners, 2);
    assert_eq!(agg.max_per_user, 5);
    assert!((agg.avg_per_user - 2.5).abs() < 1e-9);
}

#[tokio::test]
async fn holdings_join_cards_and_skip_empty_rows() {
    let pool = setup_pool().await;
    let repo = SqlxUserCardRepo::new(pool.clone());
    seed_user(&pool, "u1", 0, None).await;
    seed_collection(&pool, 1, "debut", false, false).await;
    seed_card(&pool, 1, "vocal take", 1, 2, true, &["vocal"]).await;
    seed_card(&pool, 2, "spare print", 1, 1, false, &["stage"]).await;
    seed_user_card(&pool, "u1", 1, 3).await;
    seed_user_card(&pool, "u1", 2, 0).await;

    let holdings = repo.holdings_with_cards("u1").await.unwrap();
    assert_eq!(holdings.len(), 1);
    assert_eq!(holdings[0].card.card_id, 1);
    assert_eq!(holdings[0].amount, 3);
    assert!(holdings[0].card.animated);
    assert_eq!(holdings[0].card.tags, vec!["vocal"]);
}

#[tokio::test]
async fn card_queries_filter_by_every_axis() {
    let pool = setup_pool().await;
    let repo = SqlxCardRepo::new(pool.clone());
    seed_collection(&pool, 1, "debut", false, false).await;
    seed_collection(&pool, 2, "tour", false, false).await;
    seed_card(&pool, 1, "Stage Light", 1, 3, false, &["stage"]).await;
    seed_card(&pool, 2, "Stage Pass", 2, 1, true, &["stage", "tour"]).await;
    seed_card(&pool, 3, "Vocal Booth", 1, 3, false, &["vocal"]).await;

    let by_name = repo.get_by_name("stage").await.unwrap();
    assert_eq!(by_name.len(), 2);

    let q = CardQuery {
        level: Some(3),
        ..Default::default()
    };
    assert_eq!(repo.get_by_query(&q).await.unwrap().len(), 2);

    let q = CardQuery {
        collection_id: Some(2),
        animated: Some(true),
        ..Default::default()
    };
    let hits = repo.get_by_query(&q).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].card_id, 2);

    let q = CardQuery {
        tag: Some("tour".into()),
        ..Default::default()
    };
    assert_eq!(repo.get_by_query(&q).await.unwrap().len(), 1);

    assert_eq!(repo.get_by_ids(&[1, 3, 99]).await.unwrap().len(), 2);
    assert_eq!(repo.get_all().await.unwrap().len(), 3);
    assert_eq!(repo.collections().await.unwrap().len(), 2);
}

#[tokio::test]
async fn safe_delete_reports_and_refunds() {
    let pool = setup_pool().await;
    let repo = SqlxCardRepo::new(pool.clone());
    seed_collection(&pool, 1, "debut", false, false).await;
    seed_card(&pool, 7, "stage light", 1, 3, true, &["stage"]).await;
    seed_user(&pool, "owner", 0, None).await;
    seed_user(&pool, "bidder", 0, None).await;
    seed_user_card(&pool, "owner", 7, 4).await;

    // An active auction on the card with a live top bid of 600.
    sqlx::query(
        r#"
INSERT INTO auctions (auction_id, code, card_id, seller_id, start_price, current_price,
  min_increment, top_bidder_id, bid_count, status, start_ms, end_ms)
VALUES (1, 'ST1234', 7, 'owner', 500, 600, 10, 'bidder', 1, 'ACTIVE', 0, 99999999999);
"#,
    )
    .execute(&pool)
    .await
    .unwrap();

    let report = repo.safe_delete(7).await.unwrap().unwrap();

    assert_eq!(report.owners_affected, 1);
    assert_eq!(report.copies_removed, 4);
    assert_eq!(report.auctions_cancelled, 1);
    assert_eq!(report.media_paths.len(), 2);
    assert!(report.media_paths[0].ends_with(".gif"));

    // The displaced bidder got their escrowed flakes back.
    assert_eq!(flakes_of(&pool, "bidder").await, 600);
    assert!(repo.get(7).await.unwrap().is_none());
    assert_eq!(card_amount(&pool, "owner", 7).await, 0);

    // Deleting again reports nothing.
    assert!(repo.safe_delete(7).await.unwrap().is_none());
}

#[tokio::test]
async fn claim_transaction_updates_counters_and_inventory_together() {
    let pool = setup_pool().await;
    let repo = SqlxClaimRepo::new(pool.clone());
    seed_user(&pool, "u1", 1_000, None).await;
    seed_collection(&pool, 1, "debut", false, false).await;
    seed_card(&pool, 1, "print a", 1, 1, false, &["stage"]).await;
    seed_card(&pool, 2, "print b", 1, 1, false, &["stage"]).await;

    let now = Utc::now();
    repo.apply_claim("u1", 300, &[1, 2], now, Some(now)).await.unwrap();

    let info = repo.get_info("u1").await.unwrap().unwrap();
    assert_eq!(info.claims_today, 2);
    assert_eq!(info.total_spent_today, 300);
    assert_eq!(flakes_of(&pool, "u1").await, 700);
    assert_eq!(card_amount(&pool, "u1", 1).await, 1);
    assert_eq!(card_amount(&pool, "u1", 2).await, 1);

    // The count is visible from any instant at or before the anchor, and
    // invisible from after it.
    assert_eq!(
        repo.claims_in_period("u1", now - chrono::Duration::hours(1)).await.unwrap(),
        2
    );
    assert_eq!(
        repo.claims_in_period("u1", now + chrono::Duration::hours(1)).await.unwrap(),
        0
    );

    // Accumulate without rolling the window.
    repo.apply_claim("u1", 300, &[1], now, None).await.unwrap();
    let info = repo.get_info("u1").await.unwrap().unwrap();
    assert_eq!(info.claims_today, 3);
    assert_eq!(info.total_spent_today, 600);
    assert_eq!(card_amount(&pool, "u1", 1).await, 2);

    repo.reset_daily("u1", now).await.unwrap();
    let info = repo.get_info("u1").await.unwrap().unwrap();
    assert_eq!(info.claims_today, 0);
    assert_eq!(info.total_spent_today, 0);
}

#[tokio::test]
async fn claim_transaction_rejects_overdraft_without_side_effects() {
    let pool = setup_pool().await;
    let repo = SqlxClaimRepo::new(pool.clone());
    seed_user(&pool, "u1", 100, None).await;
    seed_collection(&pool, 1, "debut", false, false).await;
    seed_card(&pool, 1, "print a", 1, 1, false, &["stage"]).await;

    let now = Utc::now();
    let outcome = repo.apply_claim("u1", 500, &[1], now, Some(now)).await.unwrap();
    assert_eq!(
        outcome,
        engine::claim::repository::ClaimApplyOutcome::InsufficientFunds
    );

    assert_eq!(flakes_of(&pool, "u1").await, 100);
    assert_eq!(card_amount(&pool, "u1", 1).await, 0);
    assert!(repo.get_info("u1").await.unwrap().is_none());
}
