//! Signal extraction - turns a sealed window into candidate alpha signals
//!
//! The extractor embeds the whole batch (overlap flags verbatim) in a
//! structured-output prompt and parses whatever comes back on a best-effort
//! basis. The backend is the one instructed to down-weight overlap messages;
//! this component only supplies the flags.

use anyhow::Result;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::generator::TextGenerator;
use common::{AlphaSignal, PipelineError, SealedWindow, Sentiment};

pub struct SignalExtractor {
    generator: Arc<dyn TextGenerator>,
}

impl SignalExtractor {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Extract candidate signals from one sealed window.
    ///
    /// Backend call failures propagate (the batch is abandoned upstream);
    /// malformed output degrades to an empty signal set.
    pub async fn extract(&self, window: &SealedWindow) -> Result<Vec<AlphaSignal>> {
        let prompt = build_extraction_prompt(window)?;
        let response = self.generator.generate(&prompt).await?;

        match parse_signals(&response) {
            Ok(signals) => {
                debug!(
                    topic = window.topic_name(),
                    count = signals.len(),
                    "extracted signals"
                );
                Ok(signals)
            }
            Err(e) => {
                warn!(topic = window.topic_name(), error = %e, "unrecoverable extraction output");
                Ok(Vec::new())
            }
        }
    }
}

fn build_extraction_prompt(window: &SealedWindow) -> Result<String> {
    let messages = serde_json::to_string_pretty(&window.messages)?;
    Ok(format!(
        r#"You are an expert cryptocurrency analyst with deep knowledge of tokens, DeFi protocols, and market trends. Analyze the following group chat messages and:

1. Identify any cryptocurrency tokens being discussed, including:
   - Direct token mentions (e.g. BTC, ETH)
   - Indirect references (e.g. "the blue chip", "Vitalik's creation")
   - Related protocol/platform tokens

2. For each identified token:
   - Extract relevant message snippets showing the discussion context
   - Determine overall sentiment (positive/negative) based on:
     * Price discussion
     * Project developments
     * Market outlook
     * User reactions

3. Messages flagged "overlap": true were carried over from the previous batch. Only take them into account if they are relevant to the non-overlap messages.

4. Return results in this JSON format:
[
    {{
        "token": "token_symbol",
        "texts": ["relevant message 1", "relevant message 2"],
        "sentiment": "positive/negative",
        "confidence": 0.8
    }},
    ...
]

Return an empty list if no tokens are detected.

Messages to analyze: {messages}"#
    ))
}

#[derive(Deserialize)]
struct RawSignal {
    token: String,
    #[serde(default)]
    texts: Vec<String>,
    sentiment: Sentiment,
    #[serde(default)]
    confidence: f64,
}

/// Best-effort, total parse of the backend's structured output.
///
/// Tries the reply as-is, then the outermost bracketed slice, then recovers
/// element-wise so one malformed entry does not discard the rest.
pub(crate) fn parse_signals(raw: &str) -> Result<Vec<AlphaSignal>, PipelineError> {
    let trimmed = raw.trim();

    let value = serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .or_else(|| {
            let start = trimmed.find('[')?;
            let end = trimmed.rfind(']')?;
            if end <= start {
                return None;
            }
            serde_json::from_str(&trimmed[start..=end]).ok()
        })
        .ok_or_else(|| PipelineError::ExtractionParse(truncate_for_log(trimmed)))?;

    let serde_json::Value::Array(items) = value else {
        return Err(PipelineError::ExtractionParse(truncate_for_log(trimmed)));
    };

    let signals = items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<RawSignal>(item).ok())
        .filter(|raw| !raw.token.trim().is_empty())
        .map(|raw| AlphaSignal {
            token: raw.token.trim().to_string(),
            texts: raw.texts,
            sentiment: raw.sentiment,
            confidence: raw.confidence.clamp(0.0, 1.0),
        })
        .collect();

    Ok(signals)
}

fn truncate_for_log(raw: &str) -> String {
    const LIMIT: usize = 200;
    if raw.len() <= LIMIT {
        return raw.to_string();
    }
    // Cut on a char boundary; backend replies are not guaranteed ASCII.
    let mut end = LIMIT;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &raw[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::ScriptedGenerator;
    use common::ChatMessage;

    fn window() -> SealedWindow {
        let messages = (0..4)
            .map(|i| ChatMessage {
                topic_key: "alpha-chat".into(),
                group_name: "Degen Lounge".into(),
                topic_name: "alpha-chat".into(),
                sender_name: format!("anon{i}"),
                text: format!("XYZ is going to run, message {i}"),
                user_id: "user-1".into(),
                overlap: i == 0,
            })
            .collect();
        SealedWindow {
            topic_key: "alpha-chat".into(),
            messages,
        }
    }

    #[test]
    fn parses_clean_array() {
        let raw = r#"[{"token": "XYZ", "texts": ["pumping"], "sentiment": "positive", "confidence": 0.8}]"#;
        let signals = parse_signals(raw).unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].token, "XYZ");
        assert_eq!(signals[0].sentiment, Sentiment::Positive);
    }

    #[test]
    fn salvages_array_wrapped_in_prose() {
        let raw = r#"Here is my analysis:
[{"token": "ABC", "sentiment": "negative", "confidence": 1.4}]
Let me know if you need more."#;
        let signals = parse_signals(raw).unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].sentiment, Sentiment::Negative);
        // out-of-range confidence is clamped, not rejected
        assert_eq!(signals[0].confidence, 1.0);
    }

    #[test]
    fn skips_malformed_elements() {
        let raw = r#"[
            {"token": "GOOD", "sentiment": "positive", "confidence": 0.9},
            {"token": "BAD", "sentiment": "sideways"},
            {"sentiment": "positive"},
            {"token": "  ", "sentiment": "negative"}
        ]"#;
        let signals = parse_signals(raw).unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].token, "GOOD");
    }

    #[test]
    fn empty_array_means_no_signals() {
        assert!(parse_signals("[]").unwrap().is_empty());
    }

    #[test]
    fn unrecoverable_output_is_a_parse_error() {
        assert!(parse_signals("the chat was quiet today").is_err());
        assert!(parse_signals("{\"token\": \"not-an-array\"}").is_err());
    }

    #[test]
    fn multibyte_garbage_is_truncated_without_panicking() {
        // 100 Devanagari chars = 300 bytes; the log excerpt must not split
        // a character mid-sequence.
        let garbage = "क".repeat(100);
        let err = parse_signals(&garbage).unwrap_err();
        let excerpt = err.to_string();
        assert!(excerpt.ends_with("..."));

        let truncated = truncate_for_log(&garbage);
        assert!(truncated.len() <= 203);
        assert!(truncated.trim_end_matches("...").chars().all(|c| c == 'क'));
    }

    #[tokio::test]
    async fn extract_degrades_to_empty_on_garbage() {
        let generator = Arc::new(ScriptedGenerator::new(["no json here at all"]));
        let extractor = SignalExtractor::new(generator);
        let signals = extractor.extract(&window()).await.unwrap();
        assert!(signals.is_empty());
    }

    #[tokio::test]
    async fn extract_propagates_backend_failure() {
        // Empty script: the generate call itself fails.
        let generator = Arc::new(ScriptedGenerator::new(Vec::<String>::new()));
        let extractor = SignalExtractor::new(generator);
        assert!(extractor.extract(&window()).await.is_err());
    }

    #[test]
    fn prompt_carries_overlap_flags_verbatim() {
        let prompt = build_extraction_prompt(&window()).unwrap();
        assert!(prompt.contains("\"overlap\": true"));
        assert!(prompt.contains("\"overlap\": false"));
    }
}
