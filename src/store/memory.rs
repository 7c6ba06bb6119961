//! Implements the `Store` trait using in-memory data.
//!
//! Note: this is compiled even in the "production" version of this app so that the whole engine
//! can run top-to-bottom without a database. It can also be switched offline to exercise the
//! store-unavailable and sync-lost paths.

use crate::aggregate::sort_newest_first;
use crate::error::{Error, Result};
use crate::model::{
    ExpenseRecord, ExpenseType, MerchantKey, MerchantMemoryEntry, UserId, ValidExpense,
};
use crate::store::{ChangeStream, Notifier, ServerClock, Store};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// An implementation of the `Store` trait that keeps everything in process memory.
#[derive(Debug)]
pub struct MemoryStore {
    data: Mutex<MemoryData>,
    notifier: Notifier,
    clock: ServerClock,
    online: AtomicBool,
}

#[derive(Debug, Default)]
struct MemoryData {
    expenses: HashMap<UserId, Vec<ExpenseRecord>>,
    merchants: HashMap<(UserId, MerchantKey), MerchantMemoryEntry>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(MemoryData::default()),
            notifier: Notifier::default(),
            clock: ServerClock::default(),
            online: AtomicBool::new(true),
        }
    }

    /// Inserts a record as-is, bypassing validation, and notifies subscribers. This is how records
    /// written by other clients (for example with an unrecognized `type`) get into the store.
    pub async fn insert_raw(&self, user: &UserId, record: ExpenseRecord) {
        let mut data = self.data.lock().await;
        data.expenses.entry(user.clone()).or_default().push(record);
        let records = snapshot_of(&data, user);
        self.notifier.publish(user, records);
    }

    /// Takes the store offline (every operation fails with `StoreUnavailable` and all change
    /// streams are lost) or brings it back online.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        if online {
            info!("Memory store is online");
        } else {
            info!("Memory store is offline");
            self.notifier.sever_all("the store went offline");
        }
    }

    /// Simulates a connection failure for one user's change streams, e.g. revoked credentials.
    pub fn disconnect(&self, user: &UserId, reason: &str) {
        self.notifier.sever(user, reason);
    }

    fn check_online(&self, operation: &str) -> Result<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::store_unavailable(format!(
                "Unable to {operation}: the store is offline"
            )))
        }
    }
}

fn snapshot_of(data: &MemoryData, user: &UserId) -> Vec<ExpenseRecord> {
    let mut records = data.expenses.get(user).cloned().unwrap_or_default();
    sort_newest_first(&mut records);
    records
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn add(&self, user: &UserId, expense: ValidExpense) -> Result<ExpenseRecord> {
        self.check_online("add expense")?;
        let mut data = self.data.lock().await;
        let record = expense.into_record(Uuid::new_v4().to_string(), self.clock.next());
        data.expenses
            .entry(user.clone())
            .or_default()
            .push(record.clone());
        let generation = self.notifier.publish(user, snapshot_of(&data, user));
        debug!("Added expense '{}' for '{user}' (generation {generation})", record.id);
        Ok(record)
    }

    async fn update(
        &self,
        user: &UserId,
        id: &str,
        expense: ValidExpense,
    ) -> Result<ExpenseRecord> {
        self.check_online("update expense")?;
        let mut data = self.data.lock().await;
        let existing = data
            .expenses
            .get_mut(user)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
            .ok_or_else(|| Error::not_found(format!("Expense '{id}' does not exist")))?;
        let updated = expense.into_record(id, existing.date);
        *existing = updated.clone();
        self.notifier.publish(user, snapshot_of(&data, user));
        Ok(updated)
    }

    async fn delete(&self, user: &UserId, id: &str) -> Result<()> {
        self.check_online("delete expense")?;
        let mut data = self.data.lock().await;
        let records = data.expenses.entry(user.clone()).or_default();
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(Error::not_found(format!("Expense '{id}' does not exist")));
        }
        self.notifier.publish(user, snapshot_of(&data, user));
        Ok(())
    }

    async fn list(&self, user: &UserId) -> Result<Vec<ExpenseRecord>> {
        self.check_online("list expenses")?;
        let data = self.data.lock().await;
        Ok(snapshot_of(&data, user))
    }

    async fn subscribe(&self, user: &UserId) -> Result<ChangeStream> {
        self.check_online("subscribe")?;
        let data = self.data.lock().await;
        Ok(self.notifier.stream(user, snapshot_of(&data, user)))
    }

    async fn save_merchant(
        &self,
        user: &UserId,
        key: &MerchantKey,
        category: &str,
        r#type: &ExpenseType,
    ) -> Result<MerchantMemoryEntry> {
        self.check_online("save merchant")?;
        let mut data = self.data.lock().await;
        let now = self.clock.next();
        let slot = (user.clone(), key.clone());
        let created_at = data.merchants.get(&slot).map_or(now, |e| e.created_at);
        let entry = MerchantMemoryEntry {
            merchant_key: key.clone(),
            category: category.to_string(),
            r#type: r#type.clone(),
            created_at,
            last_used: now,
        };
        data.merchants.insert(slot, entry.clone());
        Ok(entry)
    }

    async fn get_merchant(
        &self,
        user: &UserId,
        key: &MerchantKey,
    ) -> Result<Option<MerchantMemoryEntry>> {
        self.check_online("look up merchant")?;
        let data = self.data.lock().await;
        Ok(data.merchants.get(&(user.clone(), key.clone())).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorType;
    use crate::model::{Amount, NewExpense};
    use crate::store::StoreEvent;
    use rust_decimal_macros::dec;

    fn valid(item: &str) -> ValidExpense {
        NewExpense {
            item: item.to_string(),
            amount: Some(Amount::new(dec!(10))),
            ..Default::default()
        }
        .validate()
        .unwrap()
    }

    #[tokio::test]
    async fn test_add_assigns_id_and_increasing_dates() {
        let store = MemoryStore::new();
        let user = UserId::new("u1").unwrap();
        let a = store.add(&user, valid("a")).await.unwrap();
        let b = store.add(&user, valid("b")).await.unwrap();
        assert_ne!(a.id, b.id);
        assert!(b.date > a.date);

        let listed = store.list(&user).await.unwrap();
        assert_eq!(listed[0].id, b.id);
        assert_eq!(listed[1].id, a.id);
    }

    #[tokio::test]
    async fn test_users_are_partitioned() {
        let store = MemoryStore::new();
        let u1 = UserId::new("u1").unwrap();
        let u2 = UserId::new("u2").unwrap();
        store.add(&u1, valid("a")).await.unwrap();
        assert!(store.list(&u2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_keeps_id_and_date() {
        let store = MemoryStore::new();
        let user = UserId::new("u1").unwrap();
        let original = store.add(&user, valid("a")).await.unwrap();
        let updated = store
            .update(&user, &original.id, valid("renamed"))
            .await
            .unwrap();
        assert_eq!(updated.id, original.id);
        assert_eq!(updated.date, original.date);
        assert_eq!(updated.item, "renamed");
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_is_not_found() {
        let store = MemoryStore::new();
        let user = UserId::new("u1").unwrap();
        let err = store.update(&user, "nope", valid("a")).await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::NotFound);
        let err = store.delete(&user, "nope").await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::NotFound);
    }

    #[tokio::test]
    async fn test_offline_is_store_unavailable() {
        let store = MemoryStore::new();
        let user = UserId::new("u1").unwrap();
        store.set_online(false);
        let err = store.add(&user, valid("a")).await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::StoreUnavailable);
        assert!(err.to_string().contains("add expense"));
        store.set_online(true);
        assert!(store.add(&user, valid("a")).await.is_ok());
    }

    #[tokio::test]
    async fn test_subscribe_receives_full_sets() {
        let store = MemoryStore::new();
        let user = UserId::new("u1").unwrap();
        store.add(&user, valid("a")).await.unwrap();
        let mut stream = store.subscribe(&user).await.unwrap();
        store.add(&user, valid("b")).await.unwrap();

        let Some(StoreEvent::Changed(first)) = stream.next().await else {
            panic!("expected the initial batch");
        };
        assert_eq!(first.records.len(), 1);
        let Some(StoreEvent::Changed(second)) = stream.next().await else {
            panic!("expected a change batch");
        };
        assert_eq!(second.records.len(), 2);
        assert!(second.generation > first.generation);
    }

    #[tokio::test]
    async fn test_merchant_overwrite_keeps_created_at() {
        let store = MemoryStore::new();
        let user = UserId::new("u1").unwrap();
        let key = MerchantKey::new("HDFC Bank").unwrap();
        let first = store
            .save_merchant(&user, &key, "banking", &ExpenseType::Business)
            .await
            .unwrap();
        let second = store
            .save_merchant(&user, &key, "fees", &ExpenseType::Personal)
            .await
            .unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert!(second.last_used > first.last_used);

        let found = store.get_merchant(&user, &key).await.unwrap().unwrap();
        assert_eq!(found.category, "fees");
        assert_eq!(found.r#type, ExpenseType::Personal);
    }
}
