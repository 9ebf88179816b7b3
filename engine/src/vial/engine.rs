use std::sync::Arc;

use tracing::{info, instrument};

use crate::catalog::repository::CardRepo;
use crate::config::VialConfig;
use crate::error::{EngineError, EngineResult, retry_conflict_once};
use crate::inventory::repository::UserCardRepo;
use crate::market::calculator::PriceCalculator;
use crate::metrics::Counters;
use crate::time::Clock;
use crate::vial::repository::{LiquefyOutcome, VialRepo};

#[derive(Clone, Copy, Debug)]
pub struct LiquefyReceipt {
    pub card_id: i64,
    /// Market price the yield was computed from.
    pub price: i64,
    pub ratio: f64,
    pub vials_gained: i64,
}

/// Converts single card copies into vials at a level-dependent fraction of
/// the live market price.
pub struct VialEngine {
    cards: Arc<dyn CardRepo>,
    inventory: Arc<dyn UserCardRepo>,
    pricing: Arc<PriceCalculator>,
    repo: Arc<dyn VialRepo>,
    clock: Arc<dyn Clock>,
    cfg: VialConfig,
    counters: Counters,
}

impl VialEngine {
    pub fn new(
        cards: Arc<dyn CardRepo>,
        inventory: Arc<dyn UserCardRepo>,
        pricing: Arc<PriceCalculator>,
        repo: Arc<dyn VialRepo>,
        clock: Arc<dyn Clock>,
        cfg: VialConfig,
        counters: Counters,
    ) -> Self {
        Self {
            cards,
            inventory,
            pricing,
            repo,
            clock,
            cfg,
            counters,
        }
    }

    /// Yield preview without consuming anything.
    pub async fn quote(&self, card_id: i64) -> EngineResult<LiquefyReceipt> {
        let card = self
            .cards
            .get(card_id)
            .await
            .map_err(EngineError::storage)?
            .ok_or_else(|| EngineError::not_found("card", card_id))?;

        let price = self.pricing.price_of(card_id).await?;
        let ratio = self.cfg.yield_ratios[(card.level - 1) as usize];

        Ok(LiquefyReceipt {
            card_id,
            price,
            ratio,
            vials_gained: (price as f64 * ratio).floor() as i64,
        })
    }

    /// Consumes one copy and credits the vial yield. Irreversible; there is
    /// no cancellation path.
    #[instrument(skip(self), target = "vial", fields(user_id = %user_id, card_id = %card_id))]
    pub async fn liquefy(&self, user_id: &str, card_id: i64) -> EngineResult<LiquefyReceipt> {
        match self
            .inventory
            .get(user_id, card_id)
            .await
            .map_err(EngineError::storage)?
        {
            Some(held) if held.locked => {
                return Err(EngineError::validation(
                    "Card locked",
                    "unlock this card before liquefying it",
                ));
            }
            Some(_) => {}
            None => {
                return Err(EngineError::validation(
                    "No copies held",
                    "you do not own a copy of this card",
                ));
            }
        }

        let receipt = self.quote(card_id).await?;

        let outcome = retry_conflict_once(|| async {
            match self
                .repo
                .apply_liquefy(user_id, card_id, receipt.vials_gained, self.clock.now())
                .await
                .map_err(EngineError::storage)?
            {
                LiquefyOutcome::Applied => Ok(()),
                LiquefyOutcome::NoCopy => {
                    Err(EngineError::conflict("copy consumed by a concurrent operation"))
                }
            }
        })
        .await;

        match outcome {
            Ok(()) => {
                Counters::bump(&self.counters.liquefactions);
                info!(
                    price = receipt.price,
                    vials = receipt.vials_gained,
                    "card liquefied"
                );
                Ok(receipt)
            }
            Err(EngineError::Conflict(_)) => Err(EngineError::validation(
                "No copies held",
                "you no longer own a copy of this card",
            )),
            Err(e) => Err(e),
        }
    }
}
