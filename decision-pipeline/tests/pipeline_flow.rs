//! End-to-end pipeline scenarios with deterministic collaborators:
//! scripted generative backend, fixed market series, simulated exchange.

use std::sync::Arc;

use decision_pipeline::{
    AuditLog, AuditStore, Decision, DecisionPipeline, FixedMarketData, InMemoryAuditStore,
    InMemoryTokenHistory, PipelineConfig, ScriptedGenerator, SignalExtractor, SimulatedExchange,
    TokenHistoryStore, TradeExecutor, TransactionConfig, TransactionStage, TrustStage,
    ValidationConfig, ValidationStage,
};
use common::{AuditEntry, ChatMessage, GateReason, MarketSeries, SealedWindow, TradeSide};

fn window(texts: &[&str]) -> SealedWindow {
    let messages = texts
        .iter()
        .enumerate()
        .map(|(i, text)| ChatMessage {
            topic_key: "alpha-chat".into(),
            group_name: "Degen Lounge".into(),
            topic_name: "alpha-chat".into(),
            sender_name: format!("anon{i}"),
            text: text.to_string(),
            user_id: "user-1".into(),
            overlap: false,
        })
        .collect();
    SealedWindow {
        topic_key: "alpha-chat".into(),
        messages,
    }
}

fn rising_series() -> MarketSeries {
    MarketSeries {
        prices: vec![100.0, 107.0, 115.0],
        market_caps: vec![2e6, 2e6, 2e6],
        total_volumes: vec![8e4, 8e4, 8e4],
    }
}

fn falling_series() -> MarketSeries {
    MarketSeries {
        prices: vec![100.0, 90.0, 80.0],
        market_caps: vec![2e6, 2e6, 2e6],
        total_volumes: vec![8e4, 8e4, 8e4],
    }
}

fn extraction(token: &str, sentiment: &str) -> String {
    format!(
        r#"[{{"token": "{token}", "texts": ["{token} talk"], "sentiment": "{sentiment}", "confidence": 0.8}}]"#
    )
}

fn tweets() -> String {
    r#"{"tweets": ["number go up", "chart is vertical", "my cat bought some"]}"#.to_string()
}

fn sentiment(value: &str) -> String {
    format!(r#"{{"sentiment": "{value}"}}"#)
}

struct Harness {
    pipeline: DecisionPipeline,
    generator: Arc<ScriptedGenerator>,
    exchange: Arc<SimulatedExchange>,
    history: Arc<InMemoryTokenHistory>,
    audit_store: Arc<InMemoryAuditStore>,
}

fn harness(replies: Vec<String>, series: MarketSeries) -> Harness {
    let generator = Arc::new(ScriptedGenerator::new(replies));
    let exchange = Arc::new(SimulatedExchange::new());
    let history = Arc::new(InMemoryTokenHistory::new());
    let audit_store = Arc::new(InMemoryAuditStore::new());
    let audit = AuditLog::new(audit_store.clone());

    let pipeline = DecisionPipeline::new(
        SignalExtractor::new(generator.clone()),
        ValidationStage::new(generator.clone(), audit.clone(), ValidationConfig::default()),
        TrustStage::new(Arc::new(FixedMarketData::new(series)), audit.clone()),
        TransactionStage::new(
            history.clone(),
            exchange.clone(),
            audit.clone(),
            TransactionConfig::default(),
        ),
        exchange.clone(),
        audit,
        PipelineConfig::default(),
    );

    Harness {
        pipeline,
        generator,
        exchange,
        history,
        audit_store,
    }
}

async fn audit_actions(store: &InMemoryAuditStore, user: &str) -> Vec<String> {
    store
        .entries_for_user(user)
        .await
        .unwrap()
        .into_iter()
        .map(|e: AuditEntry| e.action)
        .collect()
}

#[tokio::test]
async fn positive_alpha_flows_through_to_a_buy() {
    let h = harness(
        vec![extraction("XYZ", "positive"), tweets(), sentiment("positive")],
        rising_series(),
    );
    h.exchange.fund("user-1", 1000.0);

    let outcome = h
        .pipeline
        .process_window(
            &window(&["XYZ looks strong", "team shipped", "volume is up", "sending it"]),
            "user-1",
        )
        .await
        .unwrap();

    assert_eq!(outcome.decisions.len(), 1);
    assert_eq!(outcome.executed_count(), 1);
    let Decision::Executed(receipt) = &outcome.decisions[0].decision else {
        panic!("expected executed decision, got {:?}", outcome.decisions[0].decision);
    };
    assert_eq!(receipt.side, TradeSide::Buy);
    assert_eq!(receipt.amount, 600.0); // 0.6 * 1000

    assert_eq!(h.exchange.base_balance("user-1").await.unwrap(), 400.0);
    assert_eq!(h.history.tokens_for_user("user-1").await.unwrap(), vec!["XYZ".to_string()]);

    let actions = audit_actions(&h.audit_store, "user-1").await;
    assert_eq!(actions.iter().filter(|a| *a == "Buy Token XYZ").count(), 1);
    assert!(actions.contains(&"Get Alpha from Group Texts".to_string()));
    assert!(actions.contains(&"Validation Layer Passed".to_string()));
}

#[tokio::test]
async fn zero_base_balance_short_circuits_before_validation() {
    let h = harness(vec![extraction("XYZ", "positive")], rising_series());
    // No funding: base balance stays zero.

    let outcome = h
        .pipeline
        .process_window(&window(&["a", "b", "c", "d"]), "user-1")
        .await
        .unwrap();

    assert_eq!(outcome.decisions.len(), 1);
    assert!(matches!(
        outcome.decisions[0].decision,
        Decision::Rejected(GateReason::InsufficientBaseBalance)
    ));

    // Only the extraction call hit the backend; validation never ran.
    assert_eq!(h.generator.call_count(), 1);

    let actions = audit_actions(&h.audit_store, "user-1").await;
    assert_eq!(
        actions.iter().filter(|a| *a == "Check Base Balance").count(),
        1
    );
    assert!(!actions.contains(&"Get Tweets".to_string()));
}

#[tokio::test]
async fn independent_sentiment_mismatch_rejects_the_signal() {
    let h = harness(
        vec![extraction("XYZ", "positive"), tweets(), sentiment("negative")],
        rising_series(),
    );
    h.exchange.fund("user-1", 1000.0);

    let outcome = h
        .pipeline
        .process_window(&window(&["a", "b", "c", "d"]), "user-1")
        .await
        .unwrap();

    assert!(matches!(
        outcome.decisions[0].decision,
        Decision::Rejected(GateReason::SentimentMismatch { .. })
    ));
    // Extraction, commentary, classification; trust never consulted the backend.
    assert_eq!(h.generator.call_count(), 3);
    assert_eq!(h.exchange.base_balance("user-1").await.unwrap(), 1000.0);
}

#[tokio::test]
async fn mixed_trend_fails_the_trust_gate() {
    let mixed = MarketSeries {
        prices: vec![100.0, 140.0, 95.0],
        market_caps: vec![2e6, 2.5e6, 1.8e6],
        total_volumes: vec![8e4, 9e4, 7e4],
    };
    let h = harness(
        vec![extraction("XYZ", "positive"), tweets(), sentiment("positive")],
        mixed,
    );
    h.exchange.fund("user-1", 1000.0);

    let outcome = h
        .pipeline
        .process_window(&window(&["a", "b", "c", "d"]), "user-1")
        .await
        .unwrap();

    assert!(matches!(
        outcome.decisions[0].decision,
        Decision::Rejected(GateReason::TrendMismatch { .. })
    ));
    let actions = audit_actions(&h.audit_store, "user-1").await;
    assert!(actions.contains(&"Trust Layer Declined".to_string()));
    assert_eq!(h.exchange.base_balance("user-1").await.unwrap(), 1000.0);
}

#[tokio::test]
async fn low_pnl_rejects_even_when_validated_and_trusted() {
    // Rising but barely: 1% move leaves pnl well under the threshold of 10.
    let flat_rise = MarketSeries {
        prices: vec![100.0, 100.5, 101.0],
        market_caps: vec![2e6, 2e6, 2e6],
        total_volumes: vec![8e4, 8e4, 8e4],
    };
    let h = harness(
        vec![extraction("XYZ", "positive"), tweets(), sentiment("positive")],
        flat_rise,
    );
    h.exchange.fund("user-1", 1000.0);

    let outcome = h
        .pipeline
        .process_window(&window(&["a", "b", "c", "d"]), "user-1")
        .await
        .unwrap();

    assert!(matches!(
        outcome.decisions[0].decision,
        Decision::Rejected(GateReason::PnlBelowThreshold { .. })
    ));
    let actions = audit_actions(&h.audit_store, "user-1").await;
    assert!(actions.contains(&"PNL Potential is too low".to_string()));
}

#[tokio::test]
async fn negative_alpha_sells_the_entire_position() {
    let h = harness(
        vec![extraction("ABC", "negative"), tweets(), sentiment("negative")],
        falling_series(),
    );
    h.exchange.set_token_balance("user-1", "ABC", 500.0);

    let outcome = h
        .pipeline
        .process_window(&window(&["ABC rugging", "devs gone", "exit now", "dumping"]), "user-1")
        .await
        .unwrap();

    assert_eq!(outcome.executed_count(), 1);
    let Decision::Executed(receipt) = &outcome.decisions[0].decision else {
        panic!("expected sell execution");
    };
    assert_eq!(receipt.side, TradeSide::Sell);
    assert_eq!(receipt.amount, 500.0);
    assert_eq!(h.exchange.token_balance("user-1", "ABC").await.unwrap(), 0.0);

    let actions = audit_actions(&h.audit_store, "user-1").await;
    assert!(actions.contains(&"Sell Token ABC".to_string()));
}

#[tokio::test]
async fn rejected_signal_does_not_block_the_rest_of_the_batch() {
    let two_signals = r#"[
        {"token": "BAD", "texts": [], "sentiment": "positive", "confidence": 0.7},
        {"token": "XYZ", "texts": [], "sentiment": "positive", "confidence": 0.9}
    ]"#
    .to_string();
    let h = harness(
        vec![
            two_signals,
            tweets(),
            sentiment("negative"), // BAD fails validation
            tweets(),
            sentiment("positive"), // XYZ passes
        ],
        rising_series(),
    );
    h.exchange.fund("user-1", 1000.0);

    let outcome = h
        .pipeline
        .process_window(&window(&["a", "b", "c", "d"]), "user-1")
        .await
        .unwrap();

    assert_eq!(outcome.decisions.len(), 2);
    assert!(matches!(
        outcome.decisions[0].decision,
        Decision::Rejected(GateReason::SentimentMismatch { .. })
    ));
    assert!(matches!(outcome.decisions[1].decision, Decision::Executed(_)));
    assert_eq!(h.history.tokens_for_user("user-1").await.unwrap(), vec!["XYZ".to_string()]);
}

#[tokio::test]
async fn empty_extraction_ends_the_batch_quietly() {
    let h = harness(vec!["[]".to_string()], rising_series());

    let outcome = h
        .pipeline
        .process_window(&window(&["gm", "gm", "gm", "gm"]), "user-1")
        .await
        .unwrap();

    assert!(outcome.decisions.is_empty());
    let actions = audit_actions(&h.audit_store, "user-1").await;
    assert!(actions.contains(&"Analyse Texts".to_string()));
}

#[tokio::test]
async fn audit_store_failure_never_blocks_a_trade() {
    struct FailingStore;

    #[async_trait::async_trait]
    impl AuditStore for FailingStore {
        async fn append(&self, _entry: AuditEntry) -> anyhow::Result<()> {
            anyhow::bail!("audit volume unavailable")
        }
        async fn entries_for_user(&self, _user_id: &str) -> anyhow::Result<Vec<AuditEntry>> {
            Ok(Vec::new())
        }
    }

    let generator = Arc::new(ScriptedGenerator::new(vec![
        extraction("XYZ", "positive"),
        tweets(),
        sentiment("positive"),
    ]));
    let exchange = Arc::new(SimulatedExchange::new());
    exchange.fund("user-1", 1000.0);
    let audit = AuditLog::new(Arc::new(FailingStore));

    let pipeline = DecisionPipeline::new(
        SignalExtractor::new(generator.clone()),
        ValidationStage::new(generator, audit.clone(), ValidationConfig::default()),
        TrustStage::new(Arc::new(FixedMarketData::new(rising_series())), audit.clone()),
        TransactionStage::new(
            Arc::new(InMemoryTokenHistory::new()),
            exchange.clone(),
            audit.clone(),
            TransactionConfig::default(),
        ),
        exchange.clone(),
        audit,
        PipelineConfig::default(),
    );

    let outcome = pipeline
        .process_window(&window(&["a", "b", "c", "d"]), "user-1")
        .await
        .unwrap();

    assert_eq!(outcome.executed_count(), 1);
    assert_eq!(exchange.base_balance("user-1").await.unwrap(), 400.0);
}

#[tokio::test]
async fn backend_failure_mid_signal_abandons_only_that_signal() {
    // Script runs dry after the first signal's commentary call.
    let two_signals = r#"[
        {"token": "BAD", "texts": [], "sentiment": "positive", "confidence": 0.7},
        {"token": "XYZ", "texts": [], "sentiment": "positive", "confidence": 0.9}
    ]"#
    .to_string();
    let h = harness(
        vec![two_signals, "not json at all".to_string()],
        rising_series(),
    );
    h.exchange.fund("user-1", 1000.0);

    let outcome = h
        .pipeline
        .process_window(&window(&["a", "b", "c", "d"]), "user-1")
        .await
        .unwrap();

    assert_eq!(outcome.decisions.len(), 2);
    assert!(matches!(outcome.decisions[0].decision, Decision::Abandoned { .. }));
    // Second signal also fails (script exhausted) but was still attempted.
    assert!(matches!(outcome.decisions[1].decision, Decision::Abandoned { .. }));
    let actions = audit_actions(&h.audit_store, "user-1").await;
    assert_eq!(actions.iter().filter(|a| *a == "Signal Abandoned").count(), 2);
}
