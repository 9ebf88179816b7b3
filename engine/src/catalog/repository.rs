use anyhow::Result;
use async_trait::async_trait;

use crate::catalog::model::{Card, CardQuery, Collection, DeletionReport};

#[async_trait]
pub trait CardRepo: Send + Sync {
    async fn get(&self, card_id: i64) -> Result<Option<Card>>;

    /// Case-insensitive substring search over card names.
    async fn get_by_name(&self, q: &str) -> Result<Vec<Card>>;

    async fn get_by_query(&self, q: &CardQuery) -> Result<Vec<Card>>;

    async fn get_all(&self) -> Result<Vec<Card>>;

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Card>>;

    async fn collections(&self) -> Result<Vec<Collection>>;

    /// Removes a card from the economy in one transaction: cancels its
    /// active auctions (refunding top bidders), deletes inventory rows,
    /// then the catalog row. The report carries the object-store keys the
    /// caller must delete; the catalog never touches media itself.
    async fn safe_delete(&self, card_id: i64) -> Result<Option<DeletionReport>>;
}
