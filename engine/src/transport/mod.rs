//! Command transport boundary. How replies reach the user (chat surface,
//! message edits, buttons) is the transport's concern; the engine hands it
//! typed values only.

use anyhow::Result;
use async_trait::async_trait;

/// A user-visible reply: a short title plus body text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub title: String,
    pub body: String,
    /// Shown only to the invoking user.
    pub ephemeral: bool,
}

impl Reply {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            ephemeral: false,
        }
    }

    pub fn ephemeral(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            ephemeral: true,
        }
    }
}

/// Component interactions arrive as typed values, never string-packed
/// callback ids. The transport may serialize these however it wants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComponentAction {
    /// Page turn on a paginated listing.
    Page {
        user_id: String,
        query: String,
        page: u32,
    },
    /// Multiple-choice answer to an open work scenario.
    WorkAnswer { user_id: String, choice: usize },
}

/// Opaque handle to an in-flight interaction, issued by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InteractionToken(pub String);

#[async_trait]
pub trait CommandTransport: Send + Sync {
    /// Acknowledges an interaction before slow work starts.
    async fn defer(&self, token: &InteractionToken, ephemeral: bool) -> Result<()>;

    /// Sends the final reply for a deferred interaction.
    async fn follow_up(&self, token: &InteractionToken, reply: Reply) -> Result<()>;

    /// Replaces the content of a paginated message.
    async fn update_page(
        &self,
        token: &InteractionToken,
        reply: Reply,
        page: u32,
        total_pages: u32,
    ) -> Result<()>;
}
