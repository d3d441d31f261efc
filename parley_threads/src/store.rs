use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parley_core::ChatMessage;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

/// One registered thread: its history and the gate that serializes turns.
struct ThreadEntry {
    history: Vec<ChatMessage>,
    turn_gate: Arc<Mutex<()>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ThreadEntry {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            history: Vec::new(),
            turn_gate: Arc::new(Mutex::new(())),
            created_at: now,
            updated_at: now,
        }
    }
}

/// In-memory thread registry.
///
/// Threads are created implicitly on first reference and live for the
/// process lifetime. The registry lock guards only map lookups and
/// appends; it is never held across a model invocation. Turns on the
/// same thread serialize on that thread's gate, turns on distinct
/// threads do not contend beyond the map lock itself.
#[derive(Default)]
pub struct ThreadStore {
    entries: RwLock<HashMap<String, ThreadEntry>>,
}

impl ThreadStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `thread_id` if absent.
    pub async fn get_or_create(&self, thread_id: &str) {
        let mut entries = self.entries.write().await;
        if !entries.contains_key(thread_id) {
            debug!("Registering new thread: {thread_id}");
            entries.insert(thread_id.to_string(), ThreadEntry::new());
        }
    }

    /// Register `thread_id` if absent and acquire its turn gate.
    ///
    /// The returned guard must be held for the whole
    /// append-invoke-append sequence of a turn. The registry lock is
    /// released before awaiting the gate, so a long turn on one thread
    /// never blocks registration or turns elsewhere.
    pub async fn begin_turn(&self, thread_id: &str) -> OwnedMutexGuard<()> {
        let gate = {
            let mut entries = self.entries.write().await;
            entries
                .entry(thread_id.to_string())
                .or_insert_with(|| {
                    debug!("Registering new thread: {thread_id}");
                    ThreadEntry::new()
                })
                .turn_gate
                .clone()
        };
        gate.lock_owned().await
    }

    /// Append `message` to an existing thread's history.
    ///
    /// The thread must already be registered; appending to an unknown id
    /// is a caller bug, not a runtime condition.
    pub async fn append(&self, thread_id: &str, message: ChatMessage) {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(thread_id)
            .unwrap_or_else(|| panic!("append to unregistered thread: {thread_id}"));
        entry.history.push(message);
        entry.updated_at = Utc::now();
    }

    /// Clone the current history of `thread_id`, in conversational order.
    ///
    /// Unknown ids read as empty: an unseen thread is indistinguishable
    /// from an empty one.
    pub async fn snapshot(&self, thread_id: &str) -> Vec<ChatMessage> {
        let entries = self.entries.read().await;
        entries
            .get(thread_id)
            .map(|e| e.history.clone())
            .unwrap_or_default()
    }

    /// Creation time of `thread_id`, if registered.
    pub async fn created_at(&self, thread_id: &str) -> Option<DateTime<Utc>> {
        let entries = self.entries.read().await;
        entries.get(thread_id).map(|e| e.created_at)
    }

    /// Last append time of `thread_id`, if registered.
    pub async fn updated_at(&self, thread_id: &str) -> Option<DateTime<Utc>> {
        let entries = self.entries.read().await;
        entries.get(thread_id).map(|e| e.updated_at)
    }

    /// Number of registered threads.
    pub async fn thread_count(&self) -> usize {
        self.entries.read().await.len()
    }
}
