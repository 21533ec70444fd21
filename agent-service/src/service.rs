//! Service wiring - connects ingestion to the decision pipeline
//!
//! Sealed windows are dispatched into detached pipeline tasks, so a watcher
//! that stops only prevents new windows; batches already in flight run to
//! completion.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use chat_ingestion::{ChannelTransport, WatcherRegistry, WindowBuffer, WindowConfig, WindowSink};
use common::{AuditEntry, ChatMessage, SealedWindow};
use decision_pipeline::{
    AuditLog, AuditStore, CompletionClient, CompletionClientConfig, DecisionPipeline,
    InMemoryAuditStore, InMemoryTokenHistory, PipelineConfig, SignalExtractor, SimulatedExchange,
    SyntheticMarketData, TextGenerator, TokenHistoryStore, TradeExecutor, TransactionConfig,
    TransactionStage, TrustStage, ValidationConfig, ValidationStage,
};

use crate::config::ServiceConfig;

/// Dispatches each sealed window into its own pipeline task.
struct PipelineSink {
    pipeline: Arc<DecisionPipeline>,
}

#[async_trait]
impl WindowSink for PipelineSink {
    async fn window_sealed(&self, window: SealedWindow) {
        let Some(user_id) = window.messages.first().map(|m| m.user_id.clone()) else {
            error!(topic_key = %window.topic_key, "sealed window without messages");
            return;
        };

        let pipeline = self.pipeline.clone();
        tokio::spawn(async move {
            if let Err(e) = pipeline.process_window(&window, &user_id).await {
                error!(topic_key = %window.topic_key, error = %e, "batch processing failed");
            }
        });
    }
}

pub struct AgentService {
    registry: WatcherRegistry,
    sink: Arc<PipelineSink>,
    audit_store: Arc<dyn AuditStore>,
    history: Arc<dyn TokenHistoryStore>,
    exchange: Arc<SimulatedExchange>,
    starting_balance: f64,
}

impl AgentService {
    /// Assemble the service against the live chat-completions backend.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let generator = Arc::new(CompletionClient::new(CompletionClientConfig {
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            request_timeout: config.request_timeout,
            ..CompletionClientConfig::default()
        })?);

        let window_config = WindowConfig::new(config.window_capacity, config.window_overlap)?;
        Self::wire(
            generator,
            window_config,
            PipelineConfig {
                min_pnl_abs: config.min_pnl_abs,
            },
            config.starting_balance,
        )
    }

    /// Assemble the service from parts. Tests inject a scripted generator.
    pub fn wire(
        generator: Arc<dyn TextGenerator>,
        window_config: WindowConfig,
        pipeline_config: PipelineConfig,
        starting_balance: f64,
    ) -> Result<Self> {
        let audit_store: Arc<InMemoryAuditStore> = Arc::new(InMemoryAuditStore::new());
        let history: Arc<InMemoryTokenHistory> = Arc::new(InMemoryTokenHistory::new());
        let exchange = Arc::new(SimulatedExchange::new());
        let audit = AuditLog::new(audit_store.clone());

        let trader: Arc<dyn TradeExecutor> = exchange.clone();
        let pipeline = Arc::new(DecisionPipeline::new(
            SignalExtractor::new(generator.clone()),
            ValidationStage::new(generator, audit.clone(), ValidationConfig::default()),
            TrustStage::new(Arc::new(SyntheticMarketData::default()), audit.clone()),
            TransactionStage::new(
                history.clone(),
                trader.clone(),
                audit.clone(),
                TransactionConfig::default(),
            ),
            trader,
            audit,
            pipeline_config,
        ));

        let buffer = Arc::new(WindowBuffer::new(window_config));
        Ok(Self {
            registry: WatcherRegistry::new(buffer),
            sink: Arc::new(PipelineSink { pipeline }),
            audit_store,
            history,
            exchange,
            starting_balance,
        })
    }

    /// Start watching a topic. Returns the sender half the external chat
    /// listener pushes messages into; the watched user's simulated account
    /// is credited with the starting balance on first watch.
    pub fn watch_topic(&self, topic_key: &str, user_id: &str) -> mpsc::Sender<ChatMessage> {
        let (tx, transport) = ChannelTransport::pair(256);
        self.exchange.fund(user_id, self.starting_balance);
        self.registry.watch(topic_key, transport, self.sink.clone());
        info!(topic_key, user_id, "watching topic");
        tx
    }

    pub async fn unwatch_topic(&self, topic_key: &str) -> Result<()> {
        self.registry.unwatch(topic_key).await
    }

    /// Read-only view of all open windows, keyed by topic name.
    pub fn open_windows(&self) -> BTreeMap<String, Vec<ChatMessage>> {
        self.registry.buffer().snapshot()
    }

    pub async fn audit_entries(&self, user_id: &str) -> Result<Vec<AuditEntry>> {
        self.audit_store.entries_for_user(user_id).await
    }

    pub async fn token_history(&self, user_id: &str) -> Result<Vec<String>> {
        self.history.tokens_for_user(user_id).await
    }

    pub fn exchange(&self) -> Arc<SimulatedExchange> {
        self.exchange.clone()
    }

    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}
