//! Clipboard abstraction layer
//!
//! The rest of the crate only sees [`ClipboardProvider`]: read the current
//! text, write text, and subscribe to a stream of text snapshots. The
//! platform implementation lives in [`system`].

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod system;

pub use system::SystemClipboard;

/// Capacity of the snapshot channel between the sampler and the watcher
pub const WATCH_CHANNEL_CAPACITY: usize = 100;

/// Clipboard provider trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClipboardProvider: Send + Sync {
    /// Current clipboard text; empty when the clipboard holds no text
    async fn get_text(&self) -> Result<String, ClipboardError>;

    /// Replace the clipboard content with `text`
    async fn set_text(&self, text: &str) -> Result<(), ClipboardError>;

    /// Provider name for logs
    fn name(&self) -> &str;

    /// Start watching for clipboard changes
    async fn watch(&self) -> Result<ClipboardWatcher, ClipboardError>;
}

/// Stream of clipboard text snapshots.
///
/// Each [`recv`](ClipboardWatcher::recv) suspends until the producer observes
/// a change. Dropping the watcher stops the producer.
pub struct ClipboardWatcher {
    receiver: mpsc::Receiver<String>,
    stop: Option<Box<dyn FnOnce() + Send>>,
}

impl ClipboardWatcher {
    /// Wrap a receiver; `stop` runs when the watcher is dropped
    pub fn new(receiver: mpsc::Receiver<String>, stop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            receiver,
            stop: Some(Box::new(stop)),
        }
    }

    /// Wrap a receiver whose producer needs no explicit shutdown
    pub fn from_receiver(receiver: mpsc::Receiver<String>) -> Self {
        Self {
            receiver,
            stop: None,
        }
    }

    /// Next snapshot, or `None` once the producer has gone away
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }
}

impl Drop for ClipboardWatcher {
    fn drop(&mut self) {
        self.receiver.close();
        if let Some(stop) = self.stop.take() {
            stop();
        }
    }
}

/// Clipboard errors
#[derive(Debug, Error)]
pub enum ClipboardError {
    /// Platform-specific error
    #[error("Platform error: {0}")]
    Platform(String),

    /// Clipboard could not be reached at all
    #[error("Clipboard unavailable: {0}")]
    Unavailable(String),

    /// Watch error
    #[error("Failed to watch clipboard: {0}")]
    WatchError(String),
}

/// Create the clipboard provider for the current platform
pub fn create_provider(
    poll_interval: std::time::Duration,
) -> Result<Box<dyn ClipboardProvider>, ClipboardError> {
    Ok(Box::new(SystemClipboard::new(poll_interval)?))
}
