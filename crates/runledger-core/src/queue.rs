//! Debounced failure-snippet queue.
//!
//! A burst of near-simultaneous failures becomes one flush instead of one
//! outbound message per event arriving at full speed. Scheduling is
//! idempotent: the first enqueue after a flush arms a single timer, later
//! enqueues inside the window just append. Delivery is best-effort; a
//! transport error drops the batch with a warning and never reaches the run.

use crate::model::FailureSnippet;
use crate::notify::{ChannelClient, MessageHandle};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default debounce window between the first enqueue and the flush.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

pub struct FailureQueue {
    inner: Arc<Inner>,
}

struct Inner {
    client: Arc<dyn ChannelClient>,
    debounce: Duration,
    pending: Mutex<Vec<FailureSnippet>>,
    flush_scheduled: AtomicBool,
    /// Header message the snippets thread under, once known.
    anchor: Mutex<Option<MessageHandle>>,
    flushes: AtomicUsize,
}

impl FailureQueue {
    pub fn new(client: Arc<dyn ChannelClient>, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                debounce,
                pending: Mutex::new(Vec::new()),
                flush_scheduled: AtomicBool::new(false),
                anchor: Mutex::new(None),
                flushes: AtomicUsize::new(0),
            }),
        }
    }

    /// Snippets sent after this call thread under `handle`.
    pub fn set_anchor(&self, handle: MessageHandle) {
        *self.inner.anchor.lock().expect("anchor lock") = Some(handle);
    }

    /// Append a snippet and arm the debounce timer if none is pending.
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, snippet: FailureSnippet) {
        self.inner
            .pending
            .lock()
            .expect("pending lock")
            .push(snippet);
        if !self.inner.flush_scheduled.swap(true, Ordering::SeqCst) {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                tokio::time::sleep(inner.debounce).await;
                Inner::flush(&inner).await;
            });
        }
    }

    /// Flush whatever is pending right now. Safe to call at any time; used at
    /// run end so nothing is lost when the process is about to exit.
    pub async fn drain(&self) {
        Inner::flush(&self.inner).await;
    }

    #[cfg(test)]
    fn flush_count(&self) -> usize {
        self.inner.flushes.load(Ordering::SeqCst)
    }
}

impl Inner {
    async fn flush(inner: &Arc<Inner>) {
        // Clear the schedule flag first so an enqueue racing with this flush
        // arms a fresh timer instead of being silently absorbed.
        inner.flush_scheduled.store(false, Ordering::SeqCst);
        let batch: Vec<FailureSnippet> =
            std::mem::take(&mut *inner.pending.lock().expect("pending lock"));
        if batch.is_empty() {
            return;
        }
        inner.flushes.fetch_add(1, Ordering::SeqCst);
        let anchor = inner.anchor.lock().expect("anchor lock").clone();
        for snippet in batch {
            let text = format!("❌ *{}*\n```{}```", snippet.title, snippet.body);
            let sent = match &anchor {
                Some(handle) => inner.client.reply(handle, &text).await,
                None => inner.client.send_message(&text).await.map(|_| ()),
            };
            if let Err(e) = sent {
                tracing::warn!(title = %snippet.title, error = %e, "dropping failure snippet");
            }
        }
    }
}
