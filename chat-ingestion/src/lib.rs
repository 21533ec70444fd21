//! Chat ingestion - message windowing and watcher lifecycle
//!
//! This crate turns the raw stream of chat events into bounded, ordered
//! batches:
//! - Window buffer that accumulates messages per topic and seals fixed-size
//!   windows with overlap carry-over
//! - Transport boundary trait for the external group/topic listener
//! - Watcher registry that runs one cancellable watch task per subscription

pub mod transport;
pub mod watcher;
pub mod window;

pub use transport::{ChannelTransport, ChatTransport};
pub use watcher::{WatcherRegistry, WindowSink};
pub use window::{WindowBuffer, WindowConfig};
