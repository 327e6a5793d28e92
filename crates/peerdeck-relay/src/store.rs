//! Bounded in-memory mailbox for offer/answer signals.
//!
//! Each session id maps to at most one offer and one answer string.
//! Records expire a fixed interval after their last write; expired records
//! are purged lazily on the next store access, so an idle store holds
//! stale entries only until someone touches it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

/// Store rejected a new session because it is at capacity.
#[derive(Debug, thiserror::Error)]
#[error("signal store is at capacity")]
pub struct StoreFull;

/// Snapshot of one session's mailbox. Absent sides are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSignals {
    pub offer: Option<String>,
    pub answer: Option<String>,
}

#[derive(Debug)]
struct Slot {
    offer: Option<String>,
    answer: Option<String>,
    updated_at: Instant,
}

pub struct SignalStore {
    slots: RwLock<HashMap<String, Slot>>,
    ttl: Duration,
    capacity: usize,
}

impl SignalStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            ttl,
            capacity,
        }
    }

    /// Current signals for a session. Unknown or expired ids read as an
    /// empty mailbox; reads never extend a record's lifetime.
    pub async fn fetch(&self, session_id: &str) -> SessionSignals {
        let mut slots = self.slots.write().await;
        self.sweep(&mut slots);
        slots
            .get(session_id)
            .map(|slot| SessionSignals {
                offer: slot.offer.clone(),
                answer: slot.answer.clone(),
            })
            .unwrap_or_default()
    }

    /// Merges present fields into the session's record, last write wins
    /// per field, and refreshes its expiry. Creates the record on first
    /// write; a write with neither field still refreshes the expiry.
    pub async fn upsert(
        &self,
        session_id: &str,
        offer: Option<String>,
        answer: Option<String>,
    ) -> Result<(), StoreFull> {
        let mut slots = self.slots.write().await;
        self.sweep(&mut slots);
        let now = Instant::now();
        match slots.get_mut(session_id) {
            Some(slot) => {
                if offer.is_some() {
                    slot.offer = offer;
                }
                if answer.is_some() {
                    slot.answer = answer;
                }
                slot.updated_at = now;
            }
            None => {
                if slots.len() >= self.capacity {
                    return Err(StoreFull);
                }
                slots.insert(
                    session_id.to_string(),
                    Slot {
                        offer,
                        answer,
                        updated_at: now,
                    },
                );
            }
        }
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    fn sweep(&self, slots: &mut HashMap<String, Slot>) {
        let before = slots.len();
        let now = Instant::now();
        slots.retain(|_, slot| now.duration_since(slot.updated_at) < self.ttl);
        let expired = before - slots.len();
        if expired > 0 {
            debug!(expired, "purged expired signal records");
        }
    }
}
