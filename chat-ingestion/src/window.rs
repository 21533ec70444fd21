//! Per-topic window buffer with overlap carry-over
//!
//! Messages accumulate in an open window per topic key. When a window
//! reaches capacity it is sealed and emitted, and the new open window is
//! re-seeded with the trailing `overlap` messages of the sealed one so the
//! next batch keeps conversational context.

use anyhow::{bail, Result};
use dashmap::DashMap;
use std::collections::BTreeMap;
use tracing::debug;

use common::{ChatMessage, SealedWindow};

/// Sizing for the window buffer. Injectable so tests can run small windows.
#[derive(Debug, Clone, Copy)]
pub struct WindowConfig {
    /// Messages per sealed window.
    pub capacity: usize,
    /// Trailing messages carried into the next window, flagged `overlap`.
    pub overlap: usize,
}

impl WindowConfig {
    pub fn new(capacity: usize, overlap: usize) -> Result<Self> {
        if capacity == 0 {
            bail!("window capacity must be at least 1");
        }
        if overlap >= capacity {
            bail!(
                "overlap ({}) must be smaller than capacity ({})",
                overlap,
                capacity
            );
        }
        Ok(Self { capacity, overlap })
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            capacity: 4,
            overlap: 3,
        }
    }
}

/// Topic-keyed window state.
///
/// Each topic's open window is mutated under its own map entry, so ingestion
/// for one topic is single-writer sequential while other topics proceed
/// without blocking.
pub struct WindowBuffer {
    config: WindowConfig,
    windows: DashMap<String, Vec<ChatMessage>>,
}

impl WindowBuffer {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    pub fn config(&self) -> WindowConfig {
        self.config
    }

    /// Append a message to its topic's open window.
    ///
    /// Returns a sealed window exactly when the append fills the window to
    /// capacity. On seal, the open window is replaced with the last
    /// `overlap` messages of the sealed batch, in original order, each
    /// flagged `overlap = true`.
    pub fn ingest(&self, message: ChatMessage) -> Option<SealedWindow> {
        let topic_key = message.topic_key.clone();
        let mut entry = self.windows.entry(topic_key.clone()).or_default();
        entry.push(message);

        if entry.len() < self.config.capacity {
            return None;
        }

        let sealed = std::mem::take(entry.value_mut());
        let carry_from = sealed.len() - self.config.overlap;
        for carried in &sealed[carry_from..] {
            let mut msg = carried.clone();
            msg.overlap = true;
            entry.push(msg);
        }
        drop(entry);

        debug!(
            topic_key = %topic_key,
            sealed = sealed.len(),
            carried = self.config.overlap,
            "window sealed"
        );

        Some(SealedWindow {
            topic_key,
            messages: sealed,
        })
    }

    /// Read-only snapshot of all open (unsealed) windows, keyed by topic
    /// name for inspection endpoints.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<ChatMessage>> {
        self.windows
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| {
                let messages = entry.value().clone();
                let topic_name = messages
                    .first()
                    .map(|m| m.topic_name.clone())
                    .unwrap_or_else(|| entry.key().clone());
                (topic_name, messages)
            })
            .collect()
    }

    /// Number of messages currently buffered for a topic.
    pub fn open_len(&self, topic_key: &str) -> usize {
        self.windows.get(topic_key).map(|w| w.len()).unwrap_or(0)
    }

    /// Drop a topic's window state. Called on explicit unwatch; topics are
    /// never removed implicitly.
    pub fn remove_topic(&self, topic_key: &str) {
        if self.windows.remove(topic_key).is_some() {
            debug!(topic_key = %topic_key, "removed window state");
        }
    }
}

impl Default for WindowBuffer {
    fn default() -> Self {
        Self::new(WindowConfig::default())
    }
}
