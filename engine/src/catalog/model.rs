/// A catalog entry. Immutable after creation except by admin delete.
#[derive(Clone, Debug)]
pub struct Card {
    pub card_id: i64,
    pub name: String,
    pub collection_id: i64,
    /// Rarity, 1..=5. Level 5 is legendary: excluded from claims and
    /// auctions.
    pub level: u8,
    pub animated: bool,
    pub tags: Vec<String>,
}

pub const MAX_LEVEL: u8 = 5;

impl Card {
    pub fn is_legendary(&self) -> bool {
        self.level >= MAX_LEVEL
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// Object-store keys for this card's media. Deletion reports carry
    /// these so the media cleanup can run outside the catalog transaction.
    pub fn media_paths(&self) -> Vec<String> {
        let ext = if self.animated { "gif" } else { "webp" };
        vec![
            format!("cards/{}/full.{ext}", self.card_id),
            format!("cards/{}/thumb.{ext}", self.card_id),
        ]
    }
}

#[derive(Clone, Debug)]
pub struct Collection {
    pub collection_id: i64,
    pub name: String,
    /// Promotional collections never serve as a work collection bonus.
    pub promo: bool,
    /// Fragment collections never serve as a work collection bonus.
    pub fragment: bool,
}

/// Catalog filter. Unset fields do not constrain the result.
#[derive(Clone, Debug, Default)]
pub struct CardQuery {
    pub name_contains: Option<String>,
    pub level: Option<u8>,
    pub collection_id: Option<i64>,
    pub animated: Option<bool>,
    pub tag: Option<String>,
}

/// Outcome of an admin card deletion.
#[derive(Clone, Debug)]
pub struct DeletionReport {
    pub card_id: i64,
    /// Inventory rows removed.
    pub owners_affected: u64,
    /// Total copies those rows held.
    pub copies_removed: i64,
    /// Active auctions cancelled, top bidders refunded.
    pub auctions_cancelled: u64,
    /// Object-store keys the caller must delete.
    pub media_paths: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_card(level: u8, animated: bool, tags: &[&str]) -> Card {
        Card {
            card_id: 9,
            name: "stage light".into(),
            collection_id: 1,
            level,
            animated,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn legendary_is_level_five() {
        assert!(mk_card(5, false, &[]).is_legendary());
        assert!(!mk_card(4, false, &[]).is_legendary());
    }

    #[test]
    fn tag_match_is_case_insensitive() {
        let c = mk_card(2, false, &["Vocal", "stage"]);
        assert!(c.has_tag("vocal"));
        assert!(c.has_tag("STAGE"));
        assert!(!c.has_tag("dance"));
    }

    #[test]
    fn media_paths_follow_animation() {
        assert!(mk_card(1, true, &[]).media_paths()[0].ends_with(".gif"));
        assert!(mk_card(1, false, &[]).media_paths()[0].ends_with(".webp"));
    }
}
