//! Fan-out of new log entries to subscribers
//!
//! Every subscriber owns a bounded queue. Publishing never blocks: a full queue
//! drops the entry for that subscriber only, so one slow reader cannot stall
//! ingestion for anyone else.

use super::LogEntry;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Subscriber registry. Keys are handed out in increasing order, so iterating
/// the map delivers in subscription order.
#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: AtomicU64,
    senders: Mutex<BTreeMap<u64, mpsc::Sender<LogEntry>>>,
}

impl Subscribers {
    pub(crate) fn register(self: &Arc<Self>, capacity: usize) -> (Unsubscribe, mpsc::Receiver<LogEntry>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.senders.lock().insert(id, tx);
        debug!(subscriber_id = id, "Log subscriber registered");

        let handle = Unsubscribe {
            id,
            registry: Arc::downgrade(self),
            done: AtomicBool::new(false),
        };
        (handle, rx)
    }

    /// Offer `entry` to every subscriber; returns how many queues were full
    pub(crate) fn publish(&self, entry: &LogEntry) -> usize {
        let mut dropped = 0;
        let mut senders = self.senders.lock();
        let mut closed = Vec::new();

        for (id, tx) in senders.iter() {
            match tx.try_send(entry.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    warn!(
                        subscriber_id = id,
                        entry_id = entry.id,
                        "Log subscriber queue full, dropping entry"
                    );
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in closed {
            senders.remove(&id);
            debug!(subscriber_id = id, "Pruned closed log subscriber");
        }

        dropped
    }

    fn remove(&self, id: u64) {
        if self.senders.lock().remove(&id).is_some() {
            debug!(subscriber_id = id, "Log subscriber removed");
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.senders.lock().len()
    }
}

/// Cancels one subscription. Idempotent, and also runs on drop.
#[derive(Debug)]
pub struct Unsubscribe {
    id: u64,
    registry: Weak<Subscribers>,
    done: AtomicBool,
}

impl Unsubscribe {
    pub fn unsubscribe(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        !self.done.load(Ordering::SeqCst)
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Stream of every new entry, across all executions
#[derive(Debug)]
pub struct LogSubscription {
    rx: mpsc::Receiver<LogEntry>,
    handle: Unsubscribe,
}

impl LogSubscription {
    pub(crate) fn new(handle: Unsubscribe, rx: mpsc::Receiver<LogEntry>) -> Self {
        Self { rx, handle }
    }

    /// Next entry; `None` once unsubscribed and drained
    pub async fn recv(&mut self) -> Option<LogEntry> {
        self.rx.recv().await
    }

    /// Next entry if one is already queued
    pub fn try_recv(&mut self) -> Option<LogEntry> {
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(&self) {
        self.handle.unsubscribe();
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.len())
            .finish()
    }
}
