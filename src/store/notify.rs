//! Plumbing shared by the store implementations: fan-out of change batches to subscribers and the
//! server-side clock that stamps new records.

use crate::model::{ExpenseRecord, UserId};
use crate::store::{ChangeBatch, ChangeStream, StoreEvent};
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Buffered batches per user before a slow subscriber starts skipping.
const CHANNEL_CAPACITY: usize = 64;

/// Publishes change batches to each user's subscribers.
///
/// Callers must serialize `publish` and `stream` with their own writes so that a batch always
/// reflects every write with a lower generation.
#[derive(Debug, Default)]
pub(crate) struct Notifier {
    channels: Mutex<HashMap<UserId, broadcast::Sender<StoreEvent>>>,
    generation: AtomicU64,
}

impl Notifier {
    /// Opens a stream whose first event is `records` at the current generation.
    pub(crate) fn stream(&self, user: &UserId, records: Vec<ExpenseRecord>) -> ChangeStream {
        let rx = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        let initial = ChangeBatch {
            generation: self.generation.load(Ordering::SeqCst),
            records,
        };
        ChangeStream::new(user.clone(), initial, rx)
    }

    /// Advances the generation and sends `records` to the user's subscribers, if any.
    pub(crate) fn publish(&self, user: &UserId, records: Vec<ExpenseRecord>) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = channels.get(user) {
            let batch = ChangeBatch {
                generation,
                records,
            };
            // An error only means that nobody is listening right now
            if tx.send(StoreEvent::Changed(batch)).is_err() {
                trace!("No subscribers for '{user}' at generation {generation}");
            }
        }
        generation
    }

    /// Fails every open stream for `user`.
    pub(crate) fn sever(&self, user: &UserId, reason: &str) {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = channels.remove(user) {
            debug!("Severing change streams for '{user}': {reason}");
            let _ = tx.send(StoreEvent::Lost(reason.to_string()));
        }
    }

    /// Fails every open stream for every user.
    pub(crate) fn sever_all(&self, reason: &str) {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        for (user, tx) in channels.drain() {
            debug!("Severing change streams for '{user}': {reason}");
            let _ = tx.send(StoreEvent::Lost(reason.to_string()));
        }
    }
}

/// Hands out creation timestamps that strictly increase, at microsecond precision.
#[derive(Debug)]
pub(crate) struct ServerClock {
    last: Mutex<DateTime<Utc>>,
}

impl Default for ServerClock {
    fn default() -> Self {
        Self {
            last: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }
}

impl ServerClock {
    pub(crate) fn next(&self) -> DateTime<Utc> {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now().trunc_subsecs(6);
        let next = if now > *last {
            now
        } else {
            *last + TimeDelta::microseconds(1)
        };
        *last = next;
        next
    }
}
