//! Clipboard change-detection loop
//!
//! Bridges the snapshot stream from a [`ClipboardProvider`](crate::clipboard::ClipboardProvider)
//! into history inserts. Only the immediately preceding value is remembered;
//! a snapshot equal to it is dropped, anything else non-empty is stored.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::clipboard::ClipboardWatcher;
use crate::history::HistoryDatabase;

/// What happened to one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// Inserted under this id
    Stored(i64),
    /// Empty text, ignored
    Empty,
    /// Same as the previous stored value, ignored
    Duplicate,
    /// Insert failed; the error has been logged
    Failed,
}

/// Counters reported when the loop ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchStats {
    pub stored: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl WatchStats {
    fn record(&mut self, capture: Capture) {
        match capture {
            Capture::Stored(_) => self.stored += 1,
            Capture::Empty | Capture::Duplicate => self.skipped += 1,
            Capture::Failed => self.failed += 1,
        }
    }
}

pub struct Watcher {
    history: Arc<HistoryDatabase>,
    last_content: String,
}

impl Watcher {
    /// Create a watcher seeded with the newest stored entry, so a clipboard
    /// that still holds it is not recorded twice. A failed lookup is logged
    /// and leaves the seed empty.
    pub async fn new(history: Arc<HistoryDatabase>) -> Self {
        let last_content = match history.last_content().await {
            Ok(content) => content.unwrap_or_default(),
            Err(e) => {
                warn!("Could not get last history item: {}", e);
                String::new()
            }
        };

        Self {
            history,
            last_content,
        }
    }

    /// The value new snapshots are compared against
    pub fn last_content(&self) -> &str {
        &self.last_content
    }

    /// Apply the dedup policy to one snapshot and store it if accepted
    pub async fn observe(&mut self, content: String) -> Capture {
        if content.is_empty() {
            return Capture::Empty;
        }
        if content == self.last_content {
            return Capture::Duplicate;
        }

        match self.history.insert(&content, Utc::now()).await {
            Ok(id) => {
                info!("Stored clipboard entry #{} ({} chars)", id, content.chars().count());
                self.last_content = content;
                Capture::Stored(id)
            }
            Err(e) => {
                // last_content stays put so a re-copy of the same text is retried
                error!("Failed to store clipboard entry: {}", e);
                Capture::Failed
            }
        }
    }

    /// Consume snapshots until the stream ends or `shutdown` resolves
    pub async fn run<F>(mut self, mut events: ClipboardWatcher, shutdown: F) -> WatchStats
    where
        F: Future<Output = ()>,
    {
        let mut stats = WatchStats::default();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping watcher");
                    break;
                }
                event = events.recv() => match event {
                    Some(content) => {
                        let capture = self.observe(content).await;
                        debug!("Snapshot handled: {:?}", capture);
                        stats.record(capture);
                    }
                    None => {
                        info!("Clipboard stream closed, stopping watcher");
                        break;
                    }
                },
            }
        }

        stats
    }
}
