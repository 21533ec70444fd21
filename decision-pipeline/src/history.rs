//! Token history - which tokens a user has transacted in
//!
//! Set-valued, union-only: the transaction stage records every token it
//! touches and nothing ever removes one.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;

use common::TokenHistory;

#[async_trait]
pub trait TokenHistoryStore: Send + Sync {
    /// Atomic add-if-absent. Returns true when the token was newly recorded.
    async fn record_token(&self, user_id: &str, token: &str) -> Result<bool>;

    async fn tokens_for_user(&self, user_id: &str) -> Result<Vec<String>>;
}

/// In-memory history keyed by user. The map entry lock makes the union
/// insert atomic per user.
pub struct InMemoryTokenHistory {
    users: DashMap<String, TokenHistory>,
}

impl InMemoryTokenHistory {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
        }
    }
}

impl Default for InMemoryTokenHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenHistoryStore for InMemoryTokenHistory {
    async fn record_token(&self, user_id: &str, token: &str) -> Result<bool> {
        let mut entry = self
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| TokenHistory::new(user_id));
        Ok(entry.tokens.insert(token.to_string()))
    }

    async fn tokens_for_user(&self, user_id: &str) -> Result<Vec<String>> {
        Ok(self
            .users
            .get(user_id)
            .map(|h| h.tokens.iter().cloned().collect())
            .unwrap_or_default())
    }
}
