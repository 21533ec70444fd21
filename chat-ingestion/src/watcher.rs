//! Watch tasks - one cancellable loop per watched subscription
//!
//! Each watcher drains a transport, feeds the window buffer, and hands
//! sealed windows to a sink. Cancellation is explicit: the token is checked
//! at the suspension point, the transport is released on every exit path,
//! and work already dispatched to the sink keeps running.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::transport::ChatTransport;
use crate::window::WindowBuffer;
use common::SealedWindow;

/// Receives sealed windows from watch tasks.
///
/// Implementations must return promptly (dispatch into a detached task);
/// the watcher does not process the next message until this returns.
#[async_trait]
pub trait WindowSink: Send + Sync {
    async fn window_sealed(&self, window: SealedWindow);
}

struct WatcherHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Registry of active watch tasks, keyed by watch key (topic key).
pub struct WatcherRegistry {
    buffer: Arc<WindowBuffer>,
    watchers: DashMap<String, WatcherHandle>,
}

impl WatcherRegistry {
    pub fn new(buffer: Arc<WindowBuffer>) -> Self {
        Self {
            buffer,
            watchers: DashMap::new(),
        }
    }

    pub fn buffer(&self) -> Arc<WindowBuffer> {
        self.buffer.clone()
    }

    /// Start watching a subscription. An existing watcher under the same key
    /// is cancelled and replaced.
    pub fn watch<T>(&self, key: impl Into<String>, transport: T, sink: Arc<dyn WindowSink>)
    where
        T: ChatTransport + 'static,
    {
        let key = key.into();
        if let Some((_, old)) = self.watchers.remove(&key) {
            warn!(key = %key, "replacing existing watcher");
            old.token.cancel();
        }

        let token = CancellationToken::new();
        let task = tokio::spawn(watch_loop(
            key.clone(),
            transport,
            self.buffer.clone(),
            sink,
            token.clone(),
        ));

        info!(key = %key, "watcher started");
        self.watchers.insert(key, WatcherHandle { token, task });
    }

    /// Stop watching and discard the topic's open window. In-flight batch
    /// processing already handed to the sink is unaffected.
    pub async fn unwatch(&self, key: &str) -> Result<()> {
        let Some((_, handle)) = self.watchers.remove(key) else {
            anyhow::bail!("no active watcher for key {key:?}");
        };

        handle.token.cancel();
        if let Err(e) = handle.task.await {
            error!(key, error = %e, "watcher task join failed");
        }
        self.buffer.remove_topic(key);
        info!(key, "watcher stopped");
        Ok(())
    }

    /// Cancel every watcher. Open windows are kept; only new batches stop.
    pub async fn shutdown(&self) {
        let keys: Vec<String> = self.watchers.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, handle)) = self.watchers.remove(&key) {
                handle.token.cancel();
                if let Err(e) = handle.task.await {
                    error!(key = %key, error = %e, "watcher task join failed");
                }
            }
        }
        info!("all watchers stopped");
    }

    pub fn active_count(&self) -> usize {
        self.watchers.len()
    }
}

async fn watch_loop<T>(
    key: String,
    mut transport: T,
    buffer: Arc<WindowBuffer>,
    sink: Arc<dyn WindowSink>,
    token: CancellationToken,
) where
    T: ChatTransport,
{
    loop {
        let message = tokio::select! {
            _ = token.cancelled() => {
                debug!(key = %key, "watcher cancelled");
                break;
            }
            next = transport.next_message() => match next {
                Ok(Some(message)) => message,
                Ok(None) => {
                    debug!(key = %key, "transport stream ended");
                    break;
                }
                Err(e) => {
                    error!(key = %key, error = %e, "transport error, stopping watcher");
                    break;
                }
            },
        };

        if let Some(sealed) = buffer.ingest(message) {
            sink.window_sealed(sealed).await;
        }
    }

    if let Err(e) = transport.close().await {
        error!(key = %key, error = %e, "failed to close transport");
    }
}
