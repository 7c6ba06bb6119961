//! The merchant memory cache: remembered (category, type) pairs keyed by normalized merchant name.
//!
//! Saving a mapping does not touch any expense. Applying a remembered category to a new expense is
//! up to the caller.

use crate::error::Result;
use crate::model::{ExpenseType, MerchantKey, MerchantMemoryEntry, UserId};
use crate::store::Store;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// The outcome of a merchant lookup. Not finding an entry is a normal result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantLookup {
    pub found: bool,
    /// The merchant name as the caller supplied it.
    pub merchant: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub r#type: Option<ExpenseType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<MerchantMemoryEntry>,
}

impl MerchantLookup {
    fn new(merchant: &str, entry: Option<MerchantMemoryEntry>) -> Self {
        Self {
            found: entry.is_some(),
            merchant: merchant.to_string(),
            category: entry.as_ref().map(|e| e.category.clone()),
            r#type: entry.as_ref().map(|e| e.r#type.clone()),
            entry,
        }
    }
}

/// Reads and writes merchant memory through a `Store`.
#[derive(Clone)]
pub struct MerchantMemory {
    store: Arc<dyn Store>,
}

impl MerchantMemory {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Creates or overwrites the mapping for `merchant`. No history is kept.
    ///
    /// An absent or unrecognized `type` is saved as personal.
    ///
    /// # Errors
    /// - `ErrorType::Validation` if `merchant` is blank.
    /// - `ErrorType::StoreUnavailable` if the store cannot be reached.
    pub async fn save(
        &self,
        user: &UserId,
        merchant: &str,
        category: &str,
        r#type: Option<&str>,
    ) -> Result<MerchantMemoryEntry> {
        let key = MerchantKey::new(merchant)?;
        let r#type = ExpenseType::parse_or_default(r#type);
        let entry = self
            .store
            .save_merchant(user, &key, category.trim(), &r#type)
            .await?;
        debug!("Saved merchant '{key}' for '{user}' as {}/{}", entry.category, entry.r#type);
        Ok(entry)
    }

    /// Looks up the mapping for `merchant` without modifying it.
    ///
    /// # Errors
    /// - `ErrorType::Validation` if `merchant` is blank.
    /// - `ErrorType::StoreUnavailable` if the store cannot be reached.
    pub async fn lookup(&self, user: &UserId, merchant: &str) -> Result<MerchantLookup> {
        let key = MerchantKey::new(merchant)?;
        let entry = self.store.get_merchant(user, &key).await?;
        Ok(MerchantLookup::new(merchant, entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorType;
    use crate::store::MemoryStore;

    fn memory() -> (Arc<MemoryStore>, MerchantMemory, UserId) {
        let store = Arc::new(MemoryStore::new());
        let memory = MerchantMemory::new(store.clone());
        (store, memory, UserId::new("u1").unwrap())
    }

    #[tokio::test]
    async fn test_lookup_never_saved_is_not_found() {
        let (_store, memory, user) = memory();
        let lookup = memory.lookup(&user, "Nowhere Cafe").await.unwrap();
        assert!(!lookup.found);
        assert_eq!(lookup.merchant, "Nowhere Cafe");
        assert!(lookup.category.is_none());

        let json = serde_json::to_value(&lookup).unwrap();
        assert_eq!(json, serde_json::json!({"found": false, "merchant": "Nowhere Cafe"}));
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive_and_overwrites() {
        let (_store, memory, user) = memory();
        memory
            .save(&user, "HDFC Bank", "banking", Some("business"))
            .await
            .unwrap();
        memory
            .save(&user, " hdfc bank ", "fees", Some("personal"))
            .await
            .unwrap();

        let lookup = memory.lookup(&user, "Hdfc Bank").await.unwrap();
        assert!(lookup.found);
        assert_eq!(lookup.category.as_deref(), Some("fees"));
        assert_eq!(lookup.r#type, Some(ExpenseType::Personal));
    }

    #[tokio::test]
    async fn test_lookup_does_not_touch_last_used() {
        let (_store, memory, user) = memory();
        let saved = memory.save(&user, "Swiggy", "food", None).await.unwrap();
        let first = memory.lookup(&user, "swiggy").await.unwrap();
        let second = memory.lookup(&user, "swiggy").await.unwrap();
        assert_eq!(first.entry.as_ref().unwrap().last_used, saved.last_used);
        assert_eq!(second.entry.unwrap().last_used, saved.last_used);
    }

    #[tokio::test]
    async fn test_merchants_are_per_user() {
        let (_store, memory, user) = memory();
        let other = UserId::new("u2").unwrap();
        memory.save(&user, "Swiggy", "food", None).await.unwrap();
        assert!(!memory.lookup(&other, "Swiggy").await.unwrap().found);
    }

    #[tokio::test]
    async fn test_blank_merchant_is_validation() {
        let (_store, memory, user) = memory();
        let err = memory.save(&user, "  ", "food", None).await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
    }

    #[tokio::test]
    async fn test_offline_store() {
        let (store, memory, user) = memory();
        store.set_online(false);
        let err = memory.lookup(&user, "Swiggy").await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::StoreUnavailable);
    }
}
