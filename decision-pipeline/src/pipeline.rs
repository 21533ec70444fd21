//! Decision pipeline - staged approval of extracted signals
//!
//! One sealed window flows through: extraction, then per signal a balance
//! precondition, the validation stage, the trust stage, the profitability
//! threshold, and finally the transaction stage. The first failing gate ends
//! processing for that signal with a specific reason; remaining signals in
//! the batch continue independently. Every step is audited.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::audit::AuditLog;
use crate::extractor::SignalExtractor;
use crate::trade::TradeExecutor;
use crate::transaction::TransactionStage;
use crate::trust::TrustStage;
use crate::validation::ValidationStage;
use common::{AlphaSignal, GateReason, SealedWindow, Sentiment, TradeReceipt};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Minimum absolute profitability score a signal must clear.
    pub min_pnl_abs: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { min_pnl_abs: 10.0 }
    }
}

/// Terminal outcome for one signal.
#[derive(Debug, Clone, Serialize)]
pub enum Decision {
    Executed(TradeReceipt),
    Rejected(GateReason),
    /// A backend or collaborator fault ended the chain; logged, not retried.
    Abandoned { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SignalDecision {
    pub signal: AlphaSignal,
    pub decision: Decision,
}

/// Result of processing one sealed window.
#[derive(Debug, Clone, Serialize, Default)]
pub struct BatchOutcome {
    pub decisions: Vec<SignalDecision>,
}

impl BatchOutcome {
    pub fn executed_count(&self) -> usize {
        self.decisions
            .iter()
            .filter(|d| matches!(d.decision, Decision::Executed(_)))
            .count()
    }
}

pub struct DecisionPipeline {
    extractor: SignalExtractor,
    validation: ValidationStage,
    trust: TrustStage,
    transaction: TransactionStage,
    trader: Arc<dyn TradeExecutor>,
    audit: AuditLog,
    config: PipelineConfig,
}

impl DecisionPipeline {
    pub fn new(
        extractor: SignalExtractor,
        validation: ValidationStage,
        trust: TrustStage,
        transaction: TransactionStage,
        trader: Arc<dyn TradeExecutor>,
        audit: AuditLog,
        config: PipelineConfig,
    ) -> Self {
        Self {
            extractor,
            validation,
            trust,
            transaction,
            trader,
            audit,
            config,
        }
    }

    /// Run the full staged pipeline for one sealed window.
    ///
    /// An extraction backend failure abandons the whole batch; per-signal
    /// faults and gate rejections are terminal for that signal only.
    pub async fn process_window(&self, window: &SealedWindow, user_id: &str) -> Result<BatchOutcome> {
        let signals = match self.extractor.extract(window).await {
            Ok(signals) => signals,
            Err(e) => {
                error!(topic = window.topic_name(), error = %e, "alpha extraction abandoned");
                self.audit
                    .record("Alpha Extraction Failed", &window.messages, &e.to_string(), user_id)
                    .await;
                return Err(e);
            }
        };

        self.audit
            .record("Get Alpha from Group Texts", &window.messages, &signals, user_id)
            .await;

        if signals.is_empty() {
            self.audit
                .record("Analyse Texts", &signals, "No token alphas detected", user_id)
                .await;
            return Ok(BatchOutcome::default());
        }

        let mut outcome = BatchOutcome::default();
        for signal in signals {
            self.audit
                .record("Analyse Each Alpha", &signal, "Analyzing alpha", user_id)
                .await;

            let decision = match self.process_signal(&signal, user_id).await {
                Ok(decision) => decision,
                Err(e) => {
                    error!(token = %signal.token, error = %e, "signal chain abandoned");
                    self.audit
                        .record("Signal Abandoned", &signal, &e.to_string(), user_id)
                        .await;
                    Decision::Abandoned {
                        error: e.to_string(),
                    }
                }
            };

            outcome.decisions.push(SignalDecision { signal, decision });
        }

        info!(
            topic = window.topic_name(),
            signals = outcome.decisions.len(),
            executed = outcome.executed_count(),
            "batch processed"
        );
        Ok(outcome)
    }

    async fn process_signal(&self, signal: &AlphaSignal, user_id: &str) -> Result<Decision> {
        if let Some(reason) = self.check_balance_precondition(signal, user_id).await? {
            return Ok(Decision::Rejected(reason));
        }

        let (observed, valid) = self.validation.validate(signal, user_id).await?;
        if !valid {
            let reason = GateReason::SentimentMismatch {
                claimed: signal.sentiment,
                observed,
            };
            self.audit
                .record(
                    "Validation Layer Declined",
                    signal,
                    &serde_json::json!({
                        "reason": "Token is not valid",
                        "sentiment": observed,
                        "validity": valid,
                    }),
                    user_id,
                )
                .await;
            return Ok(Decision::Rejected(reason));
        }

        let (trust, price_trend) = self.trust.trust(observed, signal, user_id).await?;
        if !trust.sentiment_confirmed {
            let reason = GateReason::TrendMismatch {
                claimed: observed,
                observed: price_trend,
            };
            self.audit
                .record(
                    "Trust Layer Declined",
                    &serde_json::json!({ "token": signal, "sentiment": observed }),
                    &serde_json::json!({
                        "reason": "Token is not trusted",
                        "trust": trust.sentiment_confirmed,
                        "pnl_potential": trust.pnl_potential,
                    }),
                    user_id,
                )
                .await;
            return Ok(Decision::Rejected(reason));
        }

        if trust.pnl_potential.abs() < self.config.min_pnl_abs {
            let reason = GateReason::PnlBelowThreshold {
                pnl_potential: trust.pnl_potential,
                threshold: self.config.min_pnl_abs,
            };
            self.audit
                .record(
                    "PNL Potential is too low",
                    &trust.pnl_potential,
                    "PNL Potential is too low",
                    user_id,
                )
                .await;
            return Ok(Decision::Rejected(reason));
        }

        let receipt = self.transaction.execute(signal, user_id).await?;
        Ok(Decision::Executed(receipt))
    }

    /// Balance gate ahead of validation: a positive signal needs base
    /// currency to buy with, a negative one needs a position to sell.
    async fn check_balance_precondition(
        &self,
        signal: &AlphaSignal,
        user_id: &str,
    ) -> Result<Option<GateReason>> {
        match signal.sentiment {
            Sentiment::Positive => {
                self.audit
                    .record(
                        "Check Base Balance [Alpha is positive so we need to buy with base currency]",
                        signal,
                        "Checking base balance",
                        user_id,
                    )
                    .await;
                if self.trader.base_balance(user_id).await? <= 0.0 {
                    warn!(token = %signal.token, user_id, "base balance is zero");
                    self.audit
                        .record("Check Base Balance", signal, "Base balance is zero", user_id)
                        .await;
                    return Ok(Some(GateReason::InsufficientBaseBalance));
                }
            }
            Sentiment::Negative => {
                self.audit
                    .record(
                        "Check Token Balance [Alpha is negative so we need to sell the token]",
                        signal,
                        "Checking token balance",
                        user_id,
                    )
                    .await;
                if self.trader.token_balance(user_id, &signal.token).await? <= 0.0 {
                    warn!(token = %signal.token, user_id, "token balance is zero");
                    self.audit
                        .record("Check Token Balance", signal, "Token balance is zero", user_id)
                        .await;
                    return Ok(Some(GateReason::InsufficientTokenBalance));
                }
            }
        }
        Ok(None)
    }
}
