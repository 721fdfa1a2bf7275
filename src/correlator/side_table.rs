use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::platform::MessageId;

/// A relayed question waiting for the administrator's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuestion {
    pub sender_id: u64,
    /// Chat the answer should go to
    pub chat_id: i64,
    /// `@username` or display name, for logs
    pub sender_label: String,
    pub relayed_at: Instant,
}

impl PendingQuestion {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.relayed_at) >= ttl
    }
}

/// Maps the id of a relayed copy in the administrator's chat to the user who asked.
///
/// Entries expire after `ttl` and are removed once an answer has been delivered. The table
/// never holds more than `max_entries`; the oldest entry makes room for a new one.
pub struct SideTable {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<MessageId, PendingQuestion>>,
}

impl SideTable {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<MessageId, PendingQuestion>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, key: MessageId, question: PendingQuestion) {
        let mut entries = self.entries();
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let now = question.relayed_at;
            let ttl = self.ttl;
            entries.retain(|_, q| !q.is_expired(now, ttl));
        }
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, q)| q.relayed_at)
                .map(|(k, _)| *k);
            if let Some(oldest) = oldest {
                debug!("Side table full, evicting question relayed as message {}", oldest);
                entries.remove(&oldest);
            }
        }
        entries.insert(key, question);
    }

    /// Find the question relayed as `key`. Expired entries are dropped and not returned.
    pub fn lookup(&self, key: MessageId, now: Instant) -> Option<PendingQuestion> {
        let mut entries = self.entries();
        let expired = entries.get(&key)?.is_expired(now, self.ttl);
        if expired {
            entries.remove(&key);
            return None;
        }
        entries.get(&key).cloned()
    }

    /// Forget `key` after its answer was delivered.
    pub fn complete(&self, key: MessageId) -> Option<PendingQuestion> {
        self.entries().remove(&key)
    }

    /// Drop every expired entry and return how many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, q| !q.is_expired(now, ttl));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
