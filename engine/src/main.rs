use std::sync::Arc;
use std::time::Duration;

use engine::{
    auction::{AuctionManager, SqlxAuctionRepo},
    catalog::{SqlxCardRepo, repository::CardRepo},
    claim::{ClaimEngine, SqlxClaimRepo},
    config::EngineConfig,
    db::Db,
    dispatch::Dispatcher,
    inventory::{SqlxUserCardRepo, repository::UserCardRepo},
    market::{PriceCalculator, SqlxMarketHistoryRepo},
    metrics::Counters,
    scheduler::{SettlementQueue, SettlementScheduler},
    stats::{SqlxEconomyStatsRepo, StatsCollector},
    storage::MemoryObjectStore,
    time::{Clock, SystemClock},
    transport::{CommandTransport, InteractionToken, Reply},
    users::{SqlxUserRepo, repository::UserRepo},
    vial::{SqlxVialRepo, VialEngine},
    work::{SqlxWorkRepo, WorkEngine},
};

/// Stand-in transport until the chat adapter is wired up: every reply
/// lands in the log instead of a channel.
struct LoggingTransport;

#[async_trait::async_trait]
impl CommandTransport for LoggingTransport {
    async fn defer(&self, token: &InteractionToken, ephemeral: bool) -> anyhow::Result<()> {
        tracing::debug!(token = %token.0, ephemeral, "interaction deferred");
        Ok(())
    }

    async fn follow_up(&self, token: &InteractionToken, reply: Reply) -> anyhow::Result<()> {
        tracing::info!(token = %token.0, title = %reply.title, body = %reply.body, "reply");
        Ok(())
    }

    async fn update_page(
        &self,
        token: &InteractionToken,
        reply: Reply,
        page: u32,
        total_pages: u32,
    ) -> anyhow::Result<()> {
        tracing::info!(token = %token.0, title = %reply.title, page, total_pages, "page update");
        Ok(())
    }
}

struct Repos {
    users: Arc<dyn UserRepo>,
    cards: Arc<dyn CardRepo>,
    inventory: Arc<dyn UserCardRepo>,
}

/// Connects the store, runs schema bootstrap, and builds the repositories.
async fn init_store(cfg: &EngineConfig) -> anyhow::Result<(Db, Repos)> {
    let db = Db::connect(&cfg.database_url).await?;
    db.migrate().await?;

    let repos = Repos {
        users: Arc::new(SqlxUserRepo::new((*db.pool).clone())),
        cards: Arc::new(SqlxCardRepo::new((*db.pool).clone())),
        inventory: Arc::new(SqlxUserCardRepo::new((*db.pool).clone())),
    };

    Ok((db, repos))
}

/// Periodic full-catalog price refresh; keeps the cache and the market
/// history series warm.
fn start_price_refresh_loop(
    pricing: Arc<PriceCalculator>,
    cards: Arc<dyn CardRepo>,
    interval: Duration,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;

            let ids = match cards.get_all().await {
                Ok(catalog) => catalog.iter().map(|c| c.card_id).collect::<Vec<_>>(),
                Err(e) => {
                    tracing::warn!(error = %e, "price refresh could not load catalog");
                    continue;
                }
            };

            match pricing.price_of_batch(&ids).await {
                Ok(batch) => {
                    tracing::debug!(
                        priced = batch.prices.len(),
                        missing = batch.missing.len(),
                        "price refresh tick"
                    );
                }
                Err(e) => tracing::warn!(error = %e, "price refresh failed"),
            }
        }
    });
}

fn start_stats_loop(stats: Arc<StatsCollector>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;

            if let Err(e) = stats.collect().await {
                tracing::warn!(error = %e, "scheduled stats collection failed");
            }
        }
    });
}

fn start_counter_loop(counters: Counters, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;
            counters.log_snapshot();
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sqlx::any::install_default_drivers();

    let cfg = EngineConfig::from_env();
    common::logger::init_tracing("economy-engine", cfg.production);

    tracing::info!("Starting economy engine...");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let counters = Counters::default();

    let (db, repos) = init_store(&cfg).await?;

    let history = Arc::new(SqlxMarketHistoryRepo::new((*db.pool).clone()));
    let pricing = Arc::new(PriceCalculator::new(
        repos.cards.clone(),
        repos.inventory.clone(),
        history,
        clock.clone(),
        cfg.pricing.clone(),
        counters.clone(),
    ));

    let auction_repo = Arc::new(SqlxAuctionRepo::new((*db.pool).clone()));

    // The manager holds the queue's sender; the scheduler attaches to the
    // manager with the receiver.
    let (settlement_queue, settlement_rx) = SettlementQueue::bounded(256);

    let auctions = Arc::new(AuctionManager::new(
        auction_repo,
        repos.cards.clone(),
        repos.inventory.clone(),
        clock.clone(),
        cfg.auction.clone(),
        counters.clone(),
        settlement_queue,
    ));

    let mut scheduler = SettlementScheduler::new(
        auctions.clone(),
        clock.clone(),
        counters.clone(),
        settlement_rx,
    );
    scheduler.rehydrate().await?;
    tokio::spawn(scheduler.run());

    let claims = Arc::new(ClaimEngine::new(
        repos.users.clone(),
        repos.cards.clone(),
        Arc::new(SqlxClaimRepo::new((*db.pool).clone())),
        clock.clone(),
        cfg.claim.clone(),
        cfg.daily.clone(),
        counters.clone(),
    ));

    let vials = Arc::new(VialEngine::new(
        repos.cards.clone(),
        repos.inventory.clone(),
        pricing.clone(),
        Arc::new(SqlxVialRepo::new((*db.pool).clone())),
        clock.clone(),
        cfg.vial.clone(),
        counters.clone(),
    ));

    let work = Arc::new(WorkEngine::new(
        repos.users.clone(),
        repos.cards.clone(),
        repos.inventory.clone(),
        Arc::new(SqlxWorkRepo::new((*db.pool).clone())),
        clock.clone(),
        cfg.work.clone(),
        counters.clone(),
    ));

    let stats = Arc::new(StatsCollector::new(
        repos.users.clone(),
        repos.inventory.clone(),
        pricing.clone(),
        Arc::new(SqlxEconomyStatsRepo::new((*db.pool).clone())),
        clock.clone(),
        cfg.stats.clone(),
        counters.clone(),
    ));

    let _dispatcher = Arc::new(Dispatcher::new(
        repos.users.clone(),
        repos.cards.clone(),
        pricing.clone(),
        auctions,
        claims,
        vials,
        work,
        stats.clone(),
        Arc::new(MemoryObjectStore::new()),
        Arc::new(LoggingTransport),
        clock,
        cfg.deadlines.clone(),
    ));

    start_price_refresh_loop(
        pricing,
        repos.cards.clone(),
        cfg.pricing.price_update_interval,
    );
    start_stats_loop(stats, cfg.stats.collect_interval);
    start_counter_loop(counters, Duration::from_secs(60));

    tracing::info!("Engine started; waiting for shutdown signal");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    Ok(())
}
