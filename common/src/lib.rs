//! Shared data model for the alpha agent
//!
//! Types that cross crate boundaries live here: chat messages and sealed
//! windows from ingestion, alpha signals and gate outcomes from the decision
//! pipeline, and the audit/history records both sides persist.

pub mod error;
pub mod types;

pub use error::PipelineError;
pub use types::{
    AlphaSignal, AuditEntry, ChatMessage, GateReason, MarketSeries, SealedWindow, Sentiment,
    TokenHistory, TradeReceipt, TradeSide, Trend, TrustResult,
};
