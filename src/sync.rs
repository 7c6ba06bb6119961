//! The ledger sync engine keeps one authoritative, push-updated snapshot of a user's ledger.
//!
//! `LedgerSync::subscribe` opens a standing change stream against the store and spawns a task
//! that, for every batch the store emits:
//!
//! 1. discards the batch if its generation is not newer than the one already applied,
//! 2. rebuilds the whole snapshot from the batch (there is no incremental patching),
//! 3. recomputes the rollup totals from that snapshot,
//! 4. publishes the snapshot and calls the listener exactly once.
//!
//! There is at most one standing subscription per user. Subscribing again replaces the previous
//! one. Dropping the returned `Subscription` unsubscribes.

use crate::aggregate::{compute_totals, RollupTotals};
use crate::error::{Error, Result};
use crate::model::{ExpenseRecord, UserId};
use crate::store::{ChangeBatch, ChangeStream, Store, StoreEvent};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// A read-only replica of a user's ledger at one generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSnapshot {
    generation: u64,
    records: Vec<ExpenseRecord>,
    totals: RollupTotals,
}

impl LedgerSnapshot {
    /// Builds the snapshot from a complete document set. Unrecognized expense types are shown as
    /// personal, so `totals.total == totals.personal + totals.business` always holds here.
    pub fn from_batch(batch: ChangeBatch) -> Self {
        let records: Vec<ExpenseRecord> = batch
            .records
            .into_iter()
            .map(ExpenseRecord::with_display_defaults)
            .collect();
        let totals = compute_totals(&records);
        Self {
            generation: batch.generation,
            records,
            totals,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Newest first.
    pub fn records(&self) -> &[ExpenseRecord] {
        &self.records
    }

    pub fn totals(&self) -> RollupTotals {
        self.totals
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The state of a subscription's connection to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SyncHealth {
    /// Subscribed, but the first batch has not arrived.
    Connecting,
    /// At least one batch has been applied and the stream is open.
    Live,
    /// The stream failed. The last snapshot is stale.
    Lost(String),
    /// Unsubscribed.
    Closed,
}

/// Receives every new snapshot generation and the loss of the connection.
///
/// Callbacks run on the subscription's task and must not block. They may read `LedgerSync`
/// (`health`, `snapshot`, `is_subscribed`) but must not unsubscribe the subscription that is
/// calling them.
pub trait SyncListener: Send + Sync + 'static {
    fn on_snapshot_changed(&self, snapshot: Arc<LedgerSnapshot>, totals: RollupTotals);

    fn on_sync_lost(&self, _error: &Error) {}
}

impl<F> SyncListener for F
where
    F: Fn(Arc<LedgerSnapshot>, RollupTotals) + Send + Sync + 'static,
{
    fn on_snapshot_changed(&self, snapshot: Arc<LedgerSnapshot>, totals: RollupTotals) {
        self(snapshot, totals)
    }
}

type Sessions = Mutex<HashMap<UserId, Session>>;

/// Owns the standing subscriptions, one per user.
pub struct LedgerSync {
    store: Arc<dyn Store>,
    sessions: Arc<Sessions>,
    next_id: AtomicU64,
}

struct Session {
    id: u64,
    gate: Arc<Gate>,
    task: JoinHandle<()>,
    snapshot: watch::Receiver<Arc<LedgerSnapshot>>,
    health: watch::Receiver<SyncHealth>,
}

impl Session {
    fn close(self) {
        self.gate.close();
        self.task.abort();
    }
}

impl LedgerSync {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Opens the standing subscription for `user`, replacing any existing one.
    ///
    /// # Errors
    /// - `ErrorType::StoreUnavailable` if the store cannot open a change stream.
    pub async fn subscribe(
        &self,
        user: &UserId,
        listener: Arc<dyn SyncListener>,
    ) -> Result<Subscription> {
        let stream = self
            .store
            .subscribe(user)
            .await
            .map_err(|e| e.context(format!("Unable to subscribe to the ledger of '{user}'")))?;

        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(LedgerSnapshot::default()));
        let (health_tx, health_rx) = watch::channel(SyncHealth::Connecting);
        let gate = Arc::new(Gate::default());
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let worker = Worker {
            gate: gate.clone(),
            listener,
            snapshot: snapshot_tx,
            health: health_tx,
        };
        let task = tokio::spawn(worker.run(stream));
        let session = Session {
            id,
            gate: gate.clone(),
            task,
            snapshot: snapshot_rx.clone(),
            health: health_rx.clone(),
        };
        // The map lock is released before closing, since closing waits for a callback that may
        // itself read the map.
        let previous = lock(&self.sessions).insert(user.clone(), session);
        if let Some(previous) = previous {
            info!("Replacing the standing subscription for '{user}'");
            previous.close();
        }
        debug!("Subscribed to the ledger of '{user}' (session {id})");

        Ok(Subscription {
            user: user.clone(),
            id,
            sessions: self.sessions.clone(),
            gate,
            snapshot: snapshot_rx,
            health: health_rx,
        })
    }

    /// Releases the standing subscription for `user`, if there is one.
    pub fn unsubscribe(&self, user: &UserId) {
        let removed = lock(&self.sessions).remove(user);
        if let Some(session) = removed {
            debug!("Unsubscribed from the ledger of '{user}' (session {})", session.id);
            session.close();
        }
    }

    /// The health of the standing subscription for `user`, or `None` if there is none.
    pub fn health(&self, user: &UserId) -> Option<SyncHealth> {
        lock(&self.sessions)
            .get(user)
            .map(|s| s.health.borrow().clone())
    }

    /// The latest snapshot of the standing subscription for `user`, or `None` if there is none.
    pub fn snapshot(&self, user: &UserId) -> Option<Arc<LedgerSnapshot>> {
        lock(&self.sessions)
            .get(user)
            .map(|s| s.snapshot.borrow().clone())
    }

    pub fn is_subscribed(&self, user: &UserId) -> bool {
        lock(&self.sessions).contains_key(user)
    }
}

impl Drop for LedgerSync {
    fn drop(&mut self) {
        let sessions: Vec<Session> = lock(&self.sessions).drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.close();
        }
    }
}

/// The consumer's handle on a standing subscription. Dropping it unsubscribes.
pub struct Subscription {
    user: UserId,
    id: u64,
    sessions: Arc<Sessions>,
    gate: Arc<Gate>,
    snapshot: watch::Receiver<Arc<LedgerSnapshot>>,
    health: watch::Receiver<SyncHealth>,
}

impl Subscription {
    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// The latest applied snapshot. Empty until the first batch arrives.
    pub fn snapshot(&self) -> Arc<LedgerSnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn totals(&self) -> RollupTotals {
        self.snapshot.borrow().totals()
    }

    pub fn health(&self) -> SyncHealth {
        if self.gate.is_closed() {
            return SyncHealth::Closed;
        }
        self.health.borrow().clone()
    }

    /// Waits for the next snapshot generation.
    ///
    /// # Errors
    /// - `ErrorType::SyncLost` if the connection is lost or the subscription is closed.
    pub async fn changed(&mut self) -> Result<Arc<LedgerSnapshot>> {
        loop {
            match self.health() {
                SyncHealth::Lost(reason) => {
                    return Err(Error::sync_lost(format!(
                        "Lost the ledger subscription for '{}': {reason}",
                        self.user
                    )))
                }
                SyncHealth::Closed => {
                    return Err(Error::sync_lost(format!(
                        "The ledger subscription for '{}' is closed",
                        self.user
                    )))
                }
                SyncHealth::Connecting | SyncHealth::Live => {}
            }
            tokio::select! {
                changed = self.snapshot.changed() => {
                    if changed.is_ok() {
                        return Ok(self.snapshot.borrow_and_update().clone());
                    }
                    // The worker is gone. Mark closed unless the health says why.
                    if !matches!(*self.health.borrow(), SyncHealth::Lost(_)) {
                        self.gate.close();
                    }
                }
                _ = self.health.changed() => {}
            }
        }
    }

    /// Releases the standing subscription. Safe to call more than once, and a no-op if this
    /// subscription has already been replaced by a newer one.
    pub fn unsubscribe(&self) {
        self.gate.close();
        let removed = {
            let mut sessions = lock(&self.sessions);
            if sessions.get(&self.user).is_some_and(|s| s.id == self.id) {
                sessions.remove(&self.user)
            } else {
                None
            }
        };
        if let Some(session) = removed {
            debug!(
                "Unsubscribed from the ledger of '{}' (session {})",
                self.user, self.id
            );
            session.close();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Once closed, no further callbacks run. Closing waits for a callback in progress to finish.
#[derive(Debug)]
struct Gate {
    open: Mutex<bool>,
}

impl Default for Gate {
    fn default() -> Self {
        Self {
            open: Mutex::new(true),
        }
    }
}

impl Gate {
    /// Runs `f` if the gate is open. Returns whether it ran.
    fn deliver(&self, f: impl FnOnce()) -> bool {
        let open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if *open {
            f();
        }
        *open
    }

    fn close(&self) {
        *self.open.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    fn is_closed(&self) -> bool {
        !*self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The per-subscription task state.
struct Worker {
    gate: Arc<Gate>,
    listener: Arc<dyn SyncListener>,
    snapshot: watch::Sender<Arc<LedgerSnapshot>>,
    health: watch::Sender<SyncHealth>,
}

impl Worker {
    async fn run(self, mut stream: ChangeStream) {
        let user = stream.user().clone();
        let mut applied: Option<u64> = None;
        loop {
            let batch = match stream.next().await {
                Some(StoreEvent::Changed(batch)) => batch,
                Some(StoreEvent::Lost(reason)) => {
                    self.lost(&user, reason);
                    return;
                }
                None => {
                    self.lost(&user, "the store closed the change stream".to_string());
                    return;
                }
            };
            if applied.is_some_and(|g| batch.generation <= g) {
                debug!(
                    "Discarding stale generation {} for '{user}', already at {applied:?}",
                    batch.generation
                );
                continue;
            }
            let snapshot = Arc::new(LedgerSnapshot::from_batch(batch));
            applied = Some(snapshot.generation());
            trace!(
                "Applying generation {} for '{user}' with {} records",
                snapshot.generation(),
                snapshot.len()
            );
            let delivered = self.gate.deliver(|| {
                self.health.send_replace(SyncHealth::Live);
                self.listener
                    .on_snapshot_changed(snapshot.clone(), snapshot.totals());
                self.snapshot.send_replace(snapshot.clone());
            });
            if !delivered {
                return;
            }
        }
    }

    fn lost(&self, user: &UserId, reason: String) {
        warn!("Lost the ledger subscription for '{user}': {reason}");
        self.gate.deliver(|| {
            let error = Error::sync_lost(format!(
                "Lost the ledger subscription for '{user}': {reason}"
            ));
            self.health.send_replace(SyncHealth::Lost(reason));
            self.listener.on_sync_lost(&error);
        });
    }
}

fn lock(sessions: &Sessions) -> std::sync::MutexGuard<'_, HashMap<UserId, Session>> {
    sessions.lock().unwrap_or_else(PoisonError::into_inner)
}
