//! System clipboard backed by `arboard`

use super::{ClipboardError, ClipboardProvider, ClipboardWatcher, WATCH_CHANNEL_CAPACITY};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

/// Clipboard provider for macOS, X11/Wayland and Windows.
///
/// arboard has no change notifications, so [`watch`](ClipboardProvider::watch)
/// samples the clipboard on a dedicated thread and emits a snapshot whenever
/// the text differs from the previous sample.
pub struct SystemClipboard {
    poll_interval: Duration,
}

impl SystemClipboard {
    /// Create a provider, failing if the clipboard cannot be opened
    pub fn new(poll_interval: Duration) -> Result<Self, ClipboardError> {
        open().map_err(|e| ClipboardError::Unavailable(e.to_string()))?;
        Ok(Self { poll_interval })
    }
}

fn open() -> Result<arboard::Clipboard, arboard::Error> {
    arboard::Clipboard::new()
}

/// Read text, treating "no text on the clipboard" as the empty string
fn read_text(clipboard: &mut arboard::Clipboard) -> Result<String, arboard::Error> {
    match clipboard.get_text() {
        Ok(text) => Ok(text),
        Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
        Err(e) => Err(e),
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, ClipboardError>
where
    F: FnOnce() -> Result<T, arboard::Error> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ClipboardError::Platform(format!("Clipboard task failed: {}", e)))?
        .map_err(|e| ClipboardError::Platform(e.to_string()))
}

#[async_trait]
impl ClipboardProvider for SystemClipboard {
    async fn get_text(&self) -> Result<String, ClipboardError> {
        run_blocking(|| {
            let mut clipboard = open()?;
            read_text(&mut clipboard)
        })
        .await
    }

    async fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
        let text = text.to_string();
        run_blocking(move || {
            let mut clipboard = open()?;
            clipboard.set_text(text)
        })
        .await
    }

    fn name(&self) -> &str {
        "system"
    }

    async fn watch(&self) -> Result<ClipboardWatcher, ClipboardError> {
        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let poll_interval = self.poll_interval;

        let (ready_tx, ready_rx) = oneshot::channel();
        let running = Arc::clone(&stop);

        // The arboard handle is created on the sampler thread and never
        // leaves it.
        thread::Builder::new()
            .name("clipboard-sampler".to_string())
            .spawn(move || {
                let mut clipboard = match open() {
                    Ok(clipboard) => {
                        let _ = ready_tx.send(Ok(()));
                        clipboard
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let mut last_seen: Option<String> = None;

                while !running.load(Ordering::Relaxed) && !tx.is_closed() {
                    match read_text(&mut clipboard) {
                        Ok(text) => {
                            if last_seen.as_deref() != Some(text.as_str()) {
                                trace!("Clipboard changed ({} bytes)", text.len());
                                last_seen = Some(text.clone());
                                if tx.blocking_send(text).is_err() {
                                    break;
                                }
                            }
                        }
                        Err(e) => debug!("Clipboard read failed: {}", e),
                    }

                    thread::sleep(poll_interval);
                }

                debug!("Clipboard sampler stopped");
            })
            .map_err(|e| ClipboardError::WatchError(e.to_string()))?;

        ready_rx
            .await
            .map_err(|_| ClipboardError::WatchError("sampler exited during startup".to_string()))?
            .map_err(ClipboardError::WatchError)?;

        Ok(ClipboardWatcher::new(rx, move || {
            stop.store(true, Ordering::Relaxed)
        }))
    }
}
