//! Transaction stage - records the interaction and executes the trade
//!
//! Runs only after every gate has passed: the token goes into the user's
//! history (union insert, idempotent), then the trade collaborator buys with
//! a fraction of the base balance or sells the whole held position.

use anyhow::Result;
use std::sync::Arc;
use tracing::error;

use crate::audit::AuditLog;
use crate::history::TokenHistoryStore;
use crate::trade::TradeExecutor;
use common::{AlphaSignal, Sentiment, TradeReceipt};

#[derive(Debug, Clone)]
pub struct TransactionConfig {
    /// Fraction of the base balance committed to a buy.
    pub buy_fraction: f64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self { buy_fraction: 0.6 }
    }
}

pub struct TransactionStage {
    history: Arc<dyn TokenHistoryStore>,
    trader: Arc<dyn TradeExecutor>,
    audit: AuditLog,
    config: TransactionConfig,
}

impl TransactionStage {
    pub fn new(
        history: Arc<dyn TokenHistoryStore>,
        trader: Arc<dyn TradeExecutor>,
        audit: AuditLog,
        config: TransactionConfig,
    ) -> Self {
        Self {
            history,
            trader,
            audit,
            config,
        }
    }

    /// Record the token and delegate the trade. Balances are re-read here so
    /// a position drained since the precondition gate fails loudly instead
    /// of producing a zero-size order.
    pub async fn execute(&self, signal: &AlphaSignal, user_id: &str) -> Result<TradeReceipt> {
        // History write failures must not block the trade.
        if let Err(e) = self.history.record_token(user_id, &signal.token).await {
            error!(user_id, token = %signal.token, error = %e, "token history write failed");
        }

        let receipt = match signal.sentiment {
            Sentiment::Positive => {
                let balance = self.trader.base_balance(user_id).await?;
                if balance <= 0.0 {
                    anyhow::bail!("base balance drained before buy of {}", signal.token);
                }
                let amount = balance * self.config.buy_fraction;
                let receipt = self.trader.buy(user_id, &signal.token, amount).await?;
                self.audit
                    .record(&format!("Buy Token {}", signal.token), signal, &receipt, user_id)
                    .await;
                receipt
            }
            Sentiment::Negative => {
                let balance = self.trader.token_balance(user_id, &signal.token).await?;
                if balance <= 0.0 {
                    anyhow::bail!("{} position drained before sell", signal.token);
                }
                let receipt = self.trader.sell(user_id, &signal.token, balance).await?;
                self.audit
                    .record(&format!("Sell Token {}", signal.token), signal, &receipt, user_id)
                    .await;
                receipt
            }
        };

        Ok(receipt)
    }
}
