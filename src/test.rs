//! Shared test utilities for creating test environments.
//!
//! This module is only compiled when running tests (`#[cfg(test)]`).

use crate::model::{Amount, ExpenseRecord, ExpenseSource, ExpenseType};
use crate::Config;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tempfile::TempDir;

/// Test environment that sets up a money-monitor home directory with Config and database.
/// Holds TempDir to keep the directory alive for the duration of the test.
pub struct TestEnv {
    _temp_dir: TempDir,
    config: Config,
}

impl TestEnv {
    /// Creates a test environment with Config and an initialized database.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("money-monitor");
        let config = Config::create(&root, None).await.unwrap();
        Self {
            _temp_dir: temp_dir,
            config,
        }
    }

    /// Returns a clone of the Config.
    pub fn config(&self) -> Config {
        self.config.clone()
    }
}

/// Builds a manually entered record with a fixed id and date.
pub(crate) fn record(
    id: &str,
    item: &str,
    amount: Decimal,
    r#type: ExpenseType,
    category: &str,
    note: &str,
    date: DateTime<Utc>,
) -> ExpenseRecord {
    ExpenseRecord {
        id: id.to_string(),
        item: item.to_string(),
        amount: Amount::new(amount),
        r#type,
        category: category.to_string(),
        note: note.to_string(),
        source: ExpenseSource::Manual,
        date,
    }
}
