//! Transport boundary for the external chat listener
//!
//! The real group/topic subscription (Telegram-style) lives outside this
//! repository; the core only needs an ordered stream of [`ChatMessage`]
//! events and a way to release the underlying connection.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use common::ChatMessage;

/// Source of inbound chat events for one watched (group, topic) pair.
#[async_trait]
pub trait ChatTransport: Send {
    /// Next message from the subscription. `Ok(None)` means the stream has
    /// ended and the watcher should wind down.
    async fn next_message(&mut self) -> Result<Option<ChatMessage>>;

    /// Release the underlying connection. Called on every watcher exit path.
    async fn close(&mut self) -> Result<()>;
}

/// Channel-backed transport adapter.
///
/// The external listener pushes events into the sender half; tests and the
/// service wire-up consume them through this receiver.
pub struct ChannelTransport {
    rx: mpsc::Receiver<ChatMessage>,
    closed: bool,
}

impl ChannelTransport {
    pub fn new(rx: mpsc::Receiver<ChatMessage>) -> Self {
        Self { rx, closed: false }
    }

    /// Convenience constructor returning the producer half alongside.
    pub fn pair(buffer: usize) -> (mpsc::Sender<ChatMessage>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self::new(rx))
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl ChatTransport for ChannelTransport {
    async fn next_message(&mut self) -> Result<Option<ChatMessage>> {
        if self.closed {
            return Ok(None);
        }
        Ok(self.rx.recv().await)
    }

    async fn close(&mut self) -> Result<()> {
        self.rx.close();
        self.closed = true;
        debug!("channel transport closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(text: &str) -> ChatMessage {
        ChatMessage {
            topic_key: "alpha-chat".into(),
            group_name: "Degen Lounge".into(),
            topic_name: "alpha-chat".into(),
            sender_name: "anon".into(),
            text: text.into(),
            user_id: "user-1".into(),
            overlap: false,
        }
    }

    #[tokio::test]
    async fn delivers_messages_in_order() {
        let (tx, mut transport) = ChannelTransport::pair(8);
        tx.send(message("first")).await.unwrap();
        tx.send(message("second")).await.unwrap();
        drop(tx);

        assert_eq!(transport.next_message().await.unwrap().unwrap().text, "first");
        assert_eq!(transport.next_message().await.unwrap().unwrap().text, "second");
        assert!(transport.next_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn close_ends_the_stream() {
        let (_tx, mut transport) = ChannelTransport::pair(8);
        transport.close().await.unwrap();
        assert!(transport.is_closed());
        assert!(transport.next_message().await.unwrap().is_none());
    }
}
