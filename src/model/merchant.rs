use crate::error::{Error, Result};
use crate::model::ExpenseType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A merchant name normalized for lookup: trimmed and lowercased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MerchantKey(String);

impl MerchantKey {
    /// Normalizes `merchant`. An empty name is a validation error.
    pub fn new(merchant: &str) -> Result<Self> {
        let key = merchant.trim().to_lowercase();
        if key.is_empty() {
            return Err(Error::validation("merchant is required"));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MerchantKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A remembered categorization for a merchant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantMemoryEntry {
    pub merchant_key: MerchantKey,
    pub category: String,
    #[serde(rename = "type")]
    pub r#type: ExpenseType,
    pub created_at: DateTime<Utc>,
    /// Set when the entry is saved. Lookups do not touch it.
    pub last_used: DateTime<Utc>,
}
