//! Trade collaborator boundary
//!
//! Balance queries and buy/sell primitives live outside the core; the
//! pipeline only sees this trait. The bundled implementation simulates
//! fills against in-memory balances.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use common::{TradeReceipt, TradeSide};

#[async_trait]
pub trait TradeExecutor: Send + Sync {
    /// Base-currency balance for a user.
    async fn base_balance(&self, user_id: &str) -> Result<f64>;

    /// Held balance of a specific token.
    async fn token_balance(&self, user_id: &str, token: &str) -> Result<f64>;

    /// Spend `amount` of base currency on the token.
    async fn buy(&self, user_id: &str, token: &str, amount: f64) -> Result<TradeReceipt>;

    /// Sell `amount` units of the token back into base currency.
    async fn sell(&self, user_id: &str, token: &str, amount: f64) -> Result<TradeReceipt>;
}

#[derive(Debug, Default, Clone)]
struct SimAccount {
    base: f64,
    tokens: HashMap<String, f64>,
}

/// In-memory exchange with unit pricing. Fills are immediate and receipts
/// carry a synthetic transaction hash.
pub struct SimulatedExchange {
    accounts: DashMap<String, SimAccount>,
}

impl SimulatedExchange {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
        }
    }

    /// Credit base currency to a user.
    pub fn fund(&self, user_id: &str, amount: f64) {
        self.accounts.entry(user_id.to_string()).or_default().base += amount;
    }

    /// Set a held-token balance directly.
    pub fn set_token_balance(&self, user_id: &str, token: &str, amount: f64) {
        self.accounts
            .entry(user_id.to_string())
            .or_default()
            .tokens
            .insert(token.to_string(), amount);
    }

    fn receipt(token: &str, side: TradeSide, amount: f64) -> TradeReceipt {
        TradeReceipt {
            tx_hash: format!("0xsim{}", Uuid::new_v4().simple()),
            token: token.to_string(),
            side,
            amount,
            executed_at: Utc::now(),
        }
    }
}

impl Default for SimulatedExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TradeExecutor for SimulatedExchange {
    async fn base_balance(&self, user_id: &str) -> Result<f64> {
        Ok(self.accounts.get(user_id).map(|a| a.base).unwrap_or(0.0))
    }

    async fn token_balance(&self, user_id: &str, token: &str) -> Result<f64> {
        Ok(self
            .accounts
            .get(user_id)
            .and_then(|a| a.tokens.get(token).copied())
            .unwrap_or(0.0))
    }

    async fn buy(&self, user_id: &str, token: &str, amount: f64) -> Result<TradeReceipt> {
        if amount <= 0.0 {
            anyhow::bail!("buy amount must be positive, got {amount}");
        }

        let mut account = self.accounts.entry(user_id.to_string()).or_default();
        if account.base < amount {
            anyhow::bail!(
                "insufficient base balance: have {}, need {amount}",
                account.base
            );
        }

        account.base -= amount;
        *account.tokens.entry(token.to_string()).or_insert(0.0) += amount;
        drop(account);

        info!(user_id, token, amount, "simulated buy filled");
        Ok(Self::receipt(token, TradeSide::Buy, amount))
    }

    async fn sell(&self, user_id: &str, token: &str, amount: f64) -> Result<TradeReceipt> {
        if amount <= 0.0 {
            anyhow::bail!("sell amount must be positive, got {amount}");
        }

        let mut account = self.accounts.entry(user_id.to_string()).or_default();
        let held = account.tokens.get(token).copied().unwrap_or(0.0);
        if held < amount {
            anyhow::bail!("insufficient {token} balance: have {held}, need {amount}");
        }

        *account.tokens.entry(token.to_string()).or_insert(0.0) -= amount;
        account.base += amount;
        drop(account);

        info!(user_id, token, amount, "simulated sell filled");
        Ok(Self::receipt(token, TradeSide::Sell, amount))
    }
}
