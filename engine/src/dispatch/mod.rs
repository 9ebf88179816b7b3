//! Command coordination layer: receives typed commands from the transport,
//! drives the engines under component deadlines, and turns every outcome
//! (including errors) into a user-visible [`Reply`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{Instrument, error, instrument};

use common::TraceId;
use common::logger::{annotate_span, root_span};

use crate::auction::AuctionManager;
use crate::catalog::repository::CardRepo;
use crate::claim::ClaimEngine;
use crate::config::DeadlineConfig;
use crate::error::{EngineError, EngineResult};
use crate::market::PriceCalculator;
use crate::stats::StatsCollector;
use crate::storage::ObjectStore;
use crate::time::Clock;
use crate::transport::{CommandTransport, ComponentAction, InteractionToken, Reply};
use crate::users::repository::UserRepo;
use crate::vial::VialEngine;
use crate::work::WorkEngine;

const AUCTION_PAGE_SIZE: usize = 10;

/// A command as decoded by the transport adapter.
#[derive(Clone, Debug)]
pub enum Command {
    Daily,
    Claim { count: u32 },
    ClaimInfo,
    Liquefy { card_id: i64 },
    Work,
    AuctionCreate { card_id: i64, start_price: i64, duration: Duration },
    AuctionBid { code: String, amount: i64 },
    AuctionCancel { code: String },
    AuctionList,
    Price { card_id: i64 },
    EconomyStats,
    /// Admin: remove a card and its media from the economy.
    DeleteCard { card_id: i64 },
}

/// Who is asking, and on which interaction.
#[derive(Clone, Debug)]
pub struct CommandContext {
    pub token: InteractionToken,
    pub user_id: String,
    pub username: String,
}

pub struct Dispatcher {
    users: Arc<dyn UserRepo>,
    cards: Arc<dyn CardRepo>,
    pricing: Arc<PriceCalculator>,
    auctions: Arc<AuctionManager>,
    claims: Arc<ClaimEngine>,
    vials: Arc<VialEngine>,
    work: Arc<WorkEngine>,
    stats: Arc<StatsCollector>,
    media: Arc<dyn ObjectStore>,
    transport: Arc<dyn CommandTransport>,
    clock: Arc<dyn Clock>,
    deadlines: DeadlineConfig,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: Arc<dyn UserRepo>,
        cards: Arc<dyn CardRepo>,
        pricing: Arc<PriceCalculator>,
        auctions: Arc<AuctionManager>,
        claims: Arc<ClaimEngine>,
        vials: Arc<VialEngine>,
        work: Arc<WorkEngine>,
        stats: Arc<StatsCollector>,
        media: Arc<dyn ObjectStore>,
        transport: Arc<dyn CommandTransport>,
        clock: Arc<dyn Clock>,
        deadlines: DeadlineConfig,
    ) -> Self {
        Self {
            users,
            cards,
            pricing,
            auctions,
            claims,
            vials,
            work,
            stats,
            media,
            transport,
            clock,
            deadlines,
        }
    }

    /// Full command round-trip: ensure the user exists, defer, execute
    /// under the component deadline, reply.
    #[instrument(skip(self, command), target = "dispatch", fields(user_id = %ctx.user_id))]
    pub async fn handle(&self, ctx: &CommandContext, command: Command) -> EngineResult<Reply> {
        let trace_id = TraceId::default();
        let span = root_span("command", &trace_id);
        self.handle_inner(ctx, command).instrument(span).await
    }

    async fn handle_inner(&self, ctx: &CommandContext, command: Command) -> EngineResult<Reply> {
        annotate_span(Some(&ctx.user_id), None, None);

        self.users
            .get_or_create(&ctx.user_id, &ctx.username, self.clock.now())
            .await
            .map_err(EngineError::storage)?;

        if self
            .transport
            .defer(&ctx.token, false)
            .await
            .is_err()
        {
            // The interaction is already gone; executing anyway would pay
            // out invisibly.
            return Err(EngineError::conflict("interaction expired before deferral"));
        }

        let reply = match self.execute(ctx, command).await {
            Ok(reply) => reply,
            Err(e) => reply_for_error(&e),
        };

        self.transport
            .follow_up(&ctx.token, reply.clone())
            .await
            .map_err(EngineError::storage)?;

        Ok(reply)
    }

    /// Component (button/select) round-trip.
    pub async fn handle_component(
        &self,
        token: &InteractionToken,
        action: ComponentAction,
    ) -> EngineResult<Reply> {
        match action {
            ComponentAction::WorkAnswer { user_id, choice } => {
                let reply = match self.work.answer(&user_id, choice).await {
                    Ok(outcome) => {
                        let title = if outcome.success {
                            "Work complete"
                        } else {
                            "Work flopped"
                        };
                        let mut body = format!(
                            "{}. The right call was \"{}\". You earned {} flakes, {} vials, {} xp",
                            if outcome.success { "Correct" } else { "Not quite" },
                            outcome.correct_option,
                            outcome.rewards.flakes,
                            outcome.rewards.vials,
                            outcome.rewards.xp,
                        );
                        if outcome.multiplier > 1.0 {
                            body.push_str(&format!(
                                " (collection bonus x{:.2})",
                                outcome.multiplier
                            ));
                        }
                        if !outcome.items.is_empty() {
                            body.push_str(&format!(", plus items: {}", outcome.items.join(", ")));
                        }
                        Reply::new(title, body)
                    }
                    Err(e) => reply_for_error(&e),
                };

                self.transport
                    .follow_up(token, reply.clone())
                    .await
                    .map_err(EngineError::storage)?;
                Ok(reply)
            }
            ComponentAction::Page { query, page, .. } => {
                let auctions = self.auctions.list_active().await?;
                let filtered: Vec<_> = auctions
                    .iter()
                    .filter(|a| query.is_empty() || a.code.contains(&query.to_ascii_uppercase()))
                    .collect();

                let total_pages =
                    (filtered.len().max(1) as u32).div_ceil(AUCTION_PAGE_SIZE as u32);
                let page = page.min(total_pages.saturating_sub(1));

                let body = filtered
                    .iter()
                    .skip(page as usize * AUCTION_PAGE_SIZE)
                    .take(AUCTION_PAGE_SIZE)
                    .map(|a| {
                        format!(
                            "{}: card {} at {} flakes ({} bids), ends {}",
                            a.code, a.card_id, a.current_price, a.bid_count, a.end
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n");

                let reply = Reply::new(
                    "Active auctions",
                    if body.is_empty() { "none open".to_string() } else { body },
                );
                self.transport
                    .update_page(token, reply.clone(), page, total_pages)
                    .await
                    .map_err(EngineError::storage)?;
                Ok(reply)
            }
        }
    }

    async fn execute(&self, ctx: &CommandContext, command: Command) -> EngineResult<Reply> {
        match command {
            Command::Daily => {
                let reward = self
                    .with_deadline(self.deadlines.claim, self.claims.daily(&ctx.user_id))
                    .await?;
                Ok(Reply::new(
                    "Daily reward",
                    format!(
                        "{} flakes collected; next reward at {}",
                        reward.flakes, reward.next_at
                    ),
                ))
            }
            Command::Claim { count } => {
                let cards = self
                    .with_deadline(self.deadlines.claim, self.claims.claim(&ctx.user_id, count))
                    .await?;
                let names = cards
                    .iter()
                    .map(|c| format!("{} (lv{})", c.name, c.level))
                    .collect::<Vec<_>>()
                    .join(", ");
                Ok(Reply::new(
                    format!("{} card(s) claimed", cards.len()),
                    names,
                ))
            }
            Command::ClaimInfo => {
                let info = self.claims.claim_info(&ctx.user_id).await?;
                let now = self.clock.now();
                let k = info.effective_claims(now, self.claims.claim_window());
                Ok(Reply::ephemeral(
                    "Claims today",
                    format!(
                        "{k} claimed, {} flakes spent; the next claim costs {}",
                        info.total_spent_today,
                        crate::claim::model::nth_claim_cost(self.claims.base_price(), k, 1),
                    ),
                ))
            }
            Command::Liquefy { card_id } => {
                let receipt = self
                    .with_deadline(self.deadlines.claim, self.vials.liquefy(&ctx.user_id, card_id))
                    .await?;
                Ok(Reply::new(
                    "Card liquefied",
                    format!(
                        "one copy converted at market price {} into {} vials",
                        receipt.price, receipt.vials_gained
                    ),
                ))
            }
            Command::Work => {
                let prompt = self.work.start(&ctx.user_id).await?;
                Ok(Reply::new(
                    format!("Work: {} (rarity {})", prompt.kind.as_str(), prompt.rarity),
                    format!(
                        "{}\n1. {}\n2. {}\n3. {}\n4. {}\nAnswer before {}",
                        prompt.prompt,
                        prompt.options[0],
                        prompt.options[1],
                        prompt.options[2],
                        prompt.options[3],
                        prompt.expires_at
                    ),
                ))
            }
            Command::AuctionCreate {
                card_id,
                start_price,
                duration,
            } => {
                let auction = self
                    .with_deadline(
                        self.deadlines.auction,
                        self.auctions
                            .create(&ctx.user_id, card_id, start_price, duration),
                    )
                    .await?;
                Ok(Reply::new(
                    "Auction opened",
                    format!(
                        "code {}, starting at {} flakes, ends {}",
                        auction.code, auction.start_price, auction.end
                    ),
                ))
            }
            Command::AuctionBid { code, amount } => {
                let auction = self.auctions.get_by_code(&code).await?;
                let auction = self
                    .with_deadline(
                        self.deadlines.auction,
                        self.auctions
                            .place_bid(auction.auction_id, &ctx.user_id, amount),
                    )
                    .await?;
                Ok(Reply::new(
                    "Bid placed",
                    format!(
                        "you lead auction {} at {} flakes; it ends {}",
                        auction.code, auction.current_price, auction.end
                    ),
                ))
            }
            Command::AuctionCancel { code } => {
                let auction = self.auctions.get_by_code(&code).await?;
                let auction = self
                    .with_deadline(
                        self.deadlines.auction,
                        self.auctions.cancel(auction.auction_id, &ctx.user_id),
                    )
                    .await?;
                Ok(Reply::new(
                    "Auction cancelled",
                    format!("auction {} withdrawn; your card is back", auction.code),
                ))
            }
            Command::AuctionList => {
                self.handle_component(
                    &ctx.token,
                    ComponentAction::Page {
                        user_id: ctx.user_id.clone(),
                        query: String::new(),
                        page: 0,
                    },
                )
                .await
            }
            Command::Price { card_id } => {
                let computed = self
                    .with_deadline(
                        self.deadlines.price_batch,
                        self.pricing.computed_price_of(card_id),
                    )
                    .await?;
                let window = self
                    .pricing
                    .market_stats(card_id, computed.price)
                    .await?;
                Ok(Reply::new(
                    format!("Card {card_id} price"),
                    format!(
                        "{} flakes ({}); 24h min {} / avg {} / max {}",
                        computed.price,
                        computed.reason.as_str(),
                        window.min_24h,
                        window.avg_24h,
                        window.max_24h
                    ),
                ))
            }
            Command::EconomyStats => {
                let snapshot = self
                    .with_deadline(self.deadlines.stats, self.stats.collect())
                    .await?;
                let buckets = snapshot
                    .buckets
                    .labeled()
                    .map(|(label, count)| format!("{label}: {count}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                Ok(Reply::new(
                    "Economy snapshot",
                    format!(
                        "{} users ({} active), {} flakes and {} card value in circulation; gini {:.3}, health {:.1}{}\nwealth: {buckets}",
                        snapshot.total_users,
                        snapshot.active_users,
                        snapshot.total_flakes,
                        snapshot.total_card_value,
                        snapshot.gini_flakes,
                        snapshot.health_score,
                        if snapshot.correction_active {
                            " (correction active)"
                        } else {
                            ""
                        },
                    ),
                ))
            }
            Command::DeleteCard { card_id } => {
                let report = self
                    .cards
                    .safe_delete(card_id)
                    .await
                    .map_err(EngineError::storage)?
                    .ok_or_else(|| EngineError::not_found("card", card_id))?;

                self.pricing.invalidate(card_id);

                // Media cleanup runs after the catalog transaction; a failed
                // delete only leaves an orphaned object.
                for path in &report.media_paths {
                    if let Err(e) = self.media.delete(path).await {
                        error!(path = %path, error = %e, "card media deletion failed");
                    }
                }

                Ok(Reply::ephemeral(
                    "Card deleted",
                    format!(
                        "card {} removed: {} copies across {} owners, {} auctions cancelled",
                        report.card_id,
                        report.copies_removed,
                        report.owners_affected,
                        report.auctions_cancelled
                    ),
                ))
            }
        }
    }

    /// Applies a component deadline. Mutations roll back through their
    /// owning transaction when the future is dropped at expiry.
    async fn with_deadline<T>(
        &self,
        deadline: Duration,
        fut: impl std::future::Future<Output = EngineResult<T>>,
    ) -> EngineResult<T> {
        match tokio::time::timeout(deadline, fut).await {
            Ok(out) => out,
            Err(_) => Err(EngineError::Transient(anyhow::anyhow!(
                "operation exceeded {}s deadline",
                deadline.as_secs()
            ))),
        }
    }
}

/// Error-to-reply mapping per the taxonomy: validation and not-found get a
/// short titled message, conflicts and transients a retry hint, fatals a
/// generic apology. Internal detail never reaches the user.
pub fn reply_for_error(e: &EngineError) -> Reply {
    match e {
        EngineError::Validation { title, detail } => Reply::ephemeral(title.clone(), detail.clone()),
        EngineError::NotFound { entity, id } => {
            Reply::ephemeral("Not found", format!("no {entity} matching {id}"))
        }
        EngineError::Conflict(_) => Reply::ephemeral(
            "Please try again",
            "someone beat you to it; the action was not applied",
        ),
        EngineError::Transient(_) => Reply::ephemeral(
            "Service unavailable",
            "the economy is catching its breath; try again shortly",
        ),
        EngineError::Fatal(detail) => {
            error!(detail = %detail, "fatal engine error surfaced to dispatcher");
            Reply::ephemeral("Something went wrong", "our side, not yours; the team is on it")
        }
    }
}
