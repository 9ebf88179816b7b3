//! Shared fixtures for the integration suite: a unique in-memory SQLite
//! database per test plus seed helpers.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use uuid::Uuid;

use engine::time::to_ms;

/// Unique shared-cache in-memory database. The unique name keeps parallel
/// tests isolated while letting one test's pool share the same data across
/// connections.
pub async fn setup_pool() -> AnyPool {
    sqlx::any::install_default_drivers();

    let db_name = Uuid::new_v4().to_string();
    let conn_str = format!("sqlite:file:{db_name}?mode=memory&cache=shared");

    let pool = AnyPoolOptions::new()
        .max_connections(5)
        .connect(&conn_str)
        .await
        .unwrap();

    engine::db::schema::migrate(&pool).await.unwrap();

    pool
}

pub async fn seed_user(pool: &AnyPool, user_id: &str, flakes: i64, last_daily: Option<DateTime<Utc>>) {
    sqlx::query(
        r#"
INSERT INTO users (user_id, username, flakes, vials, xp, joined_ms, last_daily_ms, last_work_ms)
VALUES (?, ?, ?, 0, 0, ?, ?, NULL);
"#,
    )
    .bind(user_id)
    .bind(format!("user-{user_id}"))
    .bind(flakes)
    .bind(to_ms(Utc::now()))
    .bind(last_daily.map(to_ms))
    .execute(pool)
    .await
    .unwrap();
}

pub async fn seed_collection(pool: &AnyPool, collection_id: i64, name: &str, promo: bool, fragment: bool) {
    sqlx::query(
        "INSERT INTO collections (collection_id, name, promo, fragment) VALUES (?, ?, ?, ?);",
    )
    .bind(collection_id)
    .bind(name)
    .bind(promo as i64)
    .bind(fragment as i64)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn seed_card(
    pool: &AnyPool,
    card_id: i64,
    name: &str,
    collection_id: i64,
    level: i64,
    animated: bool,
    tags: &[&str],
) {
    sqlx::query(
        r#"
INSERT INTO cards (card_id, name, collection_id, level, animated, tags)
VALUES (?, ?, ?, ?, ?, ?);
"#,
    )
    .bind(card_id)
    .bind(name)
    .bind(collection_id)
    .bind(level)
    .bind(animated as i64)
    .bind(serde_json::to_string(tags).unwrap())
    .execute(pool)
    .await
    .unwrap();
}

pub async fn seed_user_card(pool: &AnyPool, user_id: &str, card_id: i64, amount: i64) {
    sqlx::query(
        r#"
INSERT INTO user_cards (user_id, card_id, amount, favorite, locked, obtained_ms)
VALUES (?, ?, ?, FALSE, FALSE, ?);
"#,
    )
    .bind(user_id)
    .bind(card_id)
    .bind(amount)
    .bind(to_ms(Utc::now()))
    .execute(pool)
    .await
    .unwrap();
}

pub async fn flakes_of(pool: &AnyPool, user_id: &str) -> i64 {
    use sqlx::Row;
    sqlx::query("SELECT flakes FROM users WHERE user_id = ?;")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .unwrap()
        .get("flakes")
}

pub async fn vials_of(pool: &AnyPool, user_id: &str) -> i64 {
    use sqlx::Row;
    sqlx::query("SELECT vials FROM users WHERE user_id = ?;")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .unwrap()
        .get("vials")
}

pub async fn card_amount(pool: &AnyPool, user_id: &str, card_id: i64) -> i64 {
    use sqlx::Row;
    sqlx::query("SELECT amount FROM user_cards WHERE user_id = ? AND card_id = ?;")
        .bind(user_id)
        .bind(card_id)
        .fetch_optional(pool)
        .await
        .unwrap()
        .map(|r| r.get("amount"))
        .unwrap_or(0)
}

/// Total copies of a card across all inventories.
pub async fn total_copies(pool: &AnyPool, card_id: i64) -> i64 {
    use sqlx::Row;
    sqlx::query("SELECT COALESCE(SUM(amount), 0) AS total FROM user_cards WHERE card_id = ?;")
        .bind(card_id)
        .fetch_one(pool)
        .await
        .unwrap()
        .get("total")
}

/// A manual clock pinned to a fixed start, shared with engines under test.
pub fn manual_clock() -> Arc<engine::time::ManualClock> {
    Arc::new(engine::time::ManualClock::new(Utc::now()))
}
