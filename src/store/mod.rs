//! The `Store` trait is the seam between this crate and the document store that persists expenses.
//!
//! The store holds, per user, a collection of expense records and a collection of merchant
//! memory entries. Besides plain reads and writes it offers `subscribe`, which returns a
//! `ChangeStream` that yields the user's complete document set after every committed write.
//!
//! Two implementations exist: `MemoryStore` in this module and the SQLite-backed `Db` in
//! `crate::db`.

mod memory;
mod notify;

pub use memory::MemoryStore;
pub(crate) use notify::{Notifier, ServerClock};

use crate::error::Result;
use crate::model::{
    ExpenseRecord, ExpenseType, MerchantKey, MerchantMemoryEntry, UserId, ValidExpense,
};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

/// Operations against the external document store. Every method is scoped to one user.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Creates a record. The store assigns `id` and `date`.
    async fn add(&self, user: &UserId, expense: ValidExpense) -> Result<ExpenseRecord>;

    /// Replaces the caller-supplied fields of an existing record. `id` and `date` are kept.
    ///
    /// # Errors
    /// - `ErrorType::NotFound` if the record does not exist.
    async fn update(&self, user: &UserId, id: &str, expense: ValidExpense)
        -> Result<ExpenseRecord>;

    /// # Errors
    /// - `ErrorType::NotFound` if the record does not exist.
    async fn delete(&self, user: &UserId, id: &str) -> Result<()>;

    /// All of the user's records, newest first.
    async fn list(&self, user: &UserId) -> Result<Vec<ExpenseRecord>>;

    /// Opens a change stream. The first event is the current document set.
    async fn subscribe(&self, user: &UserId) -> Result<ChangeStream>;

    /// Creates or overwrites the merchant memory entry for `key`.
    async fn save_merchant(
        &self,
        user: &UserId,
        key: &MerchantKey,
        category: &str,
        r#type: &ExpenseType,
    ) -> Result<MerchantMemoryEntry>;

    async fn get_merchant(
        &self,
        user: &UserId,
        key: &MerchantKey,
    ) -> Result<Option<MerchantMemoryEntry>>;
}

/// The complete document set of one user's ledger after a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeBatch {
    /// Strictly increases with every write to the store.
    pub generation: u64,
    /// Newest first.
    pub records: Vec<ExpenseRecord>,
}

/// What a change stream delivers.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    Changed(ChangeBatch),
    /// The connection behind the stream failed. No further events follow.
    Lost(String),
}

/// A standing subscription to one user's ledger.
pub struct ChangeStream {
    user: UserId,
    initial: Option<ChangeBatch>,
    rx: broadcast::Receiver<StoreEvent>,
}

impl ChangeStream {
    pub(crate) fn new(
        user: UserId,
        initial: ChangeBatch,
        rx: broadcast::Receiver<StoreEvent>,
    ) -> Self {
        Self {
            user,
            initial: Some(initial),
            rx,
        }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Waits for the next event. Returns `None` once the store has closed the stream.
    ///
    /// If the receiver falls behind, the skipped batches are dropped: each batch is a complete
    /// document set, so only the newest one matters.
    pub async fn next(&mut self) -> Option<StoreEvent> {
        if let Some(initial) = self.initial.take() {
            return Some(StoreEvent::Changed(initial));
        }
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Change stream for '{}' skipped {skipped} batches", self.user);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
