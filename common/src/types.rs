//! Core data types shared across the agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A single message delivered by the chat-transport listener.
///
/// Immutable once created; ownership moves into the window buffer. The
/// `overlap` flag marks messages carried forward from a previously sealed
/// window for context continuity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub topic_key: String,
    pub group_name: String,
    pub topic_name: String,
    pub sender_name: String,
    pub text: String,
    pub user_id: String,
    pub overlap: bool,
}

/// Claimed or derived direction of a trading signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sentiment::Positive => write!(f, "positive"),
            Sentiment::Negative => write!(f, "negative"),
        }
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" => Ok(Sentiment::Positive),
            "negative" => Ok(Sentiment::Negative),
            other => Err(format!("unknown sentiment: {other:?}")),
        }
    }
}

/// Directional classification of a numeric series.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Positive,
    Negative,
    Mixed,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Positive => write!(f, "positive"),
            Trend::Negative => write!(f, "negative"),
            Trend::Mixed => write!(f, "mixed"),
        }
    }
}

/// A candidate trading signal extracted from one sealed window.
///
/// Ephemeral: consumed by the pipeline, persisted only through the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphaSignal {
    pub token: String,
    /// Supporting message snippets, in window order.
    pub texts: Vec<String>,
    pub sentiment: Sentiment,
    /// Token-identification confidence, 0.0 to 1.0.
    pub confidence: f64,
}

/// Outcome of the trust stage for one signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrustResult {
    pub sentiment_confirmed: bool,
    pub pnl_potential: f64,
}

/// A full batch of messages emitted by the window buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedWindow {
    pub topic_key: String,
    pub messages: Vec<ChatMessage>,
}

impl SealedWindow {
    /// Topic name shared by the batch, taken from the first message.
    pub fn topic_name(&self) -> &str {
        self.messages
            .first()
            .map(|m| m.topic_name.as_str())
            .unwrap_or(self.topic_key.as_str())
    }
}

/// One append-only audit record per pipeline stage invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
    pub user_id: String,
}

impl AuditEntry {
    pub fn new(
        action: impl Into<String>,
        input: serde_json::Value,
        output: serde_json::Value,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action: action.into(),
            input,
            output,
            user_id: user_id.into(),
        }
    }
}

/// Set of tokens a user has transacted in. Grows by union, never shrinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenHistory {
    pub user_id: String,
    pub tokens: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl TokenHistory {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            tokens: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }
}

/// Synthetic historical price/volume/market-cap series for a token.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MarketSeries {
    pub prices: Vec<f64>,
    pub market_caps: Vec<f64>,
    pub total_volumes: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Receipt returned by the trade collaborator for a simulated fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeReceipt {
    pub tx_hash: String,
    pub token: String,
    pub side: TradeSide,
    pub amount: f64,
    pub executed_at: DateTime<Utc>,
}

/// Specific reason a signal was turned away by a decision gate.
///
/// Gate rejections are business outcomes, not faults: they are always
/// audited and end processing for the affected signal only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum GateReason {
    InsufficientBaseBalance,
    InsufficientTokenBalance,
    SentimentMismatch {
        claimed: Sentiment,
        observed: Sentiment,
    },
    TrendMismatch {
        claimed: Sentiment,
        observed: Trend,
    },
    PnlBelowThreshold {
        pnl_potential: f64,
        threshold: f64,
    },
}

impl fmt::Display for GateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateReason::InsufficientBaseBalance => write!(f, "base-currency balance is zero"),
            GateReason::InsufficientTokenBalance => write!(f, "token balance is zero"),
            GateReason::SentimentMismatch { claimed, observed } => {
                write!(f, "sentiment mismatch: claimed {claimed}, observed {observed}")
            }
            GateReason::TrendMismatch { claimed, observed } => {
                write!(f, "trend mismatch: claimed {claimed}, price trend {observed}")
            }
            GateReason::PnlBelowThreshold {
                pnl_potential,
                threshold,
            } => write!(
                f,
                "pnl potential {pnl_potential:.2} below threshold {threshold:.2}"
            ),
        }
    }
}
