use sqlx::AnyPool;

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    // Users
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS users (
  user_id TEXT PRIMARY KEY,
  username TEXT NOT NULL,

  flakes BIGINT NOT NULL,
  vials BIGINT NOT NULL,
  xp BIGINT NOT NULL,

  joined_ms BIGINT NOT NULL,
  last_daily_ms BIGINT,
  last_work_ms BIGINT
);
"#,
    )
    .execute(pool)
    .await?;

    // Card collections
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS collections (
  collection_id BIGINT PRIMARY KEY,
  name TEXT NOT NULL,
  promo BOOLEAN NOT NULL,
  fragment BOOLEAN NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // Card catalog
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS cards (
  card_id BIGINT PRIMARY KEY,
  name TEXT NOT NULL,
  collection_id BIGINT NOT NULL,
  level INTEGER NOT NULL,
  animated BOOLEAN NOT NULL,
  tags TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // Per-user inventory
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS user_cards (
  user_id TEXT NOT NULL,
  card_id BIGINT NOT NULL,
  amount BIGINT NOT NULL,
  favorite BOOLEAN NOT NULL,
  locked BOOLEAN NOT NULL,
  obtained_ms BIGINT NOT NULL,
  PRIMARY KEY (user_id, card_id)
);
"#,
    )
    .execute(pool)
    .await?;

    // Opaque item drops from work sessions
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS user_items (
  user_id TEXT NOT NULL,
  item_id TEXT NOT NULL,
  amount BIGINT NOT NULL,
  PRIMARY KEY (user_id, item_id)
);
"#,
    )
    .execute(pool)
    .await?;

    // Auctions
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS auctions (
  auction_id BIGINT PRIMARY KEY,
  code TEXT NOT NULL UNIQUE,
  card_id BIGINT NOT NULL,
  seller_id TEXT NOT NULL,

  start_price BIGINT NOT NULL,
  current_price BIGINT NOT NULL,
  min_increment BIGINT NOT NULL,
  top_bidder_id TEXT,
  bid_count BIGINT NOT NULL,

  status TEXT NOT NULL,
  start_ms BIGINT NOT NULL,
  end_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // Integer id allocation. The allocating transaction updates the row
    // before reading it back, so concurrent allocators serialize on the
    // row lock instead of racing a MAX() read.
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS id_sequences (
  name TEXT PRIMARY KEY,
  next_id BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // Seed the auction sequence past any rows an existing database holds.
    sqlx::query(
        r#"
INSERT INTO id_sequences (name, next_id)
SELECT 'auctions', COALESCE((SELECT MAX(auction_id) FROM auctions), 0)
WHERE NOT EXISTS (SELECT 1 FROM id_sequences WHERE name = 'auctions');
"#,
    )
    .execute(pool)
    .await?;

    // Bid audit trail
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS bids (
  bid_id TEXT PRIMARY KEY,
  auction_id BIGINT NOT NULL,
  bidder_id TEXT NOT NULL,
  amount BIGINT NOT NULL,
  created_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // Append-only market samples
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS card_market_history (
  history_id TEXT PRIMARY KEY,
  card_id BIGINT NOT NULL,
  created_ms BIGINT NOT NULL,

  price BIGINT NOT NULL,
  scarcity DOUBLE PRECISION NOT NULL,
  distribution DOUBLE PRECISION NOT NULL,
  hoarding DOUBLE PRECISION NOT NULL,
  activity DOUBLE PRECISION NOT NULL,

  total_copies BIGINT NOT NULL,
  active_copies BIGINT NOT NULL,
  unique_owners BIGINT NOT NULL,
  active_owners BIGINT NOT NULL,
  max_per_user BIGINT NOT NULL,
  avg_per_user DOUBLE PRECISION NOT NULL,

  price_change_percent DOUBLE PRECISION NOT NULL,
  price_reason TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // Rolling claim window per user
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS claim_stats (
  user_id TEXT PRIMARY KEY,
  claims_today BIGINT NOT NULL,
  total_spent_today BIGINT NOT NULL,
  window_start_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // Economy snapshots
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS economy_stats (
  stats_id TEXT PRIMARY KEY,
  created_ms BIGINT NOT NULL,

  total_users BIGINT NOT NULL,
  active_users BIGINT NOT NULL,
  total_flakes BIGINT NOT NULL,
  total_card_value BIGINT NOT NULL,

  bottom_flakes BIGINT NOT NULL,
  median_flakes BIGINT NOT NULL,
  top_flakes BIGINT NOT NULL,
  bottom_card_value BIGINT NOT NULL,
  median_card_value BIGINT NOT NULL,
  top_card_value BIGINT NOT NULL,

  gini_flakes DOUBLE PRECISION NOT NULL,
  buckets TEXT NOT NULL,
  health_score DOUBLE PRECISION NOT NULL,
  correction_active BOOLEAN NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_user_cards_card ON user_cards(card_id);"#)
        .execute(pool)
        .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_auctions_status_end ON auctions(status, end_ms);"#)
        .execute(pool)
        .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_bids_auction ON bids(auction_id);"#)
        .execute(pool)
        .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_history_card ON card_market_history(card_id, created_ms);"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
