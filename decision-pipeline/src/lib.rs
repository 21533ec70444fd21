//! Decision pipeline - staged approval of chat-derived trading signals
//!
//! Takes sealed message windows from ingestion and runs them through:
//! - Signal extraction via the generative backend
//! - Independent sentiment validation against freshly generated commentary
//! - Trust scoring against a synthetic historical trend series
//! - Profitability and balance gates
//! - A simulated transaction stage
//!
//! Every stage invocation, pass or reject, lands in the append-only audit
//! log. Business rejections are values; only backend and collaborator
//! faults surface as errors.

pub mod audit;
pub mod extractor;
pub mod generator;
pub mod history;
pub mod pipeline;
pub mod trade;
pub mod transaction;
pub mod trust;
pub mod validation;

pub use audit::{AuditLog, AuditStore, InMemoryAuditStore};
pub use extractor::SignalExtractor;
pub use generator::{CompletionClient, CompletionClientConfig, ScriptedGenerator, TextGenerator};
pub use history::{InMemoryTokenHistory, TokenHistoryStore};
pub use pipeline::{BatchOutcome, Decision, DecisionPipeline, PipelineConfig, SignalDecision};
pub use trade::{SimulatedExchange, TradeExecutor};
pub use transaction::{TransactionConfig, TransactionStage};
pub use trust::{
    classify_series, detect_trend, pnl_potential, FixedMarketData, MarketDataSource, SeriesTrends,
    SyntheticDataConfig, SyntheticMarketData, TrustStage,
};
pub use validation::{ValidationConfig, ValidationStage};
