//! The SQLite-backed `Store`.
//!
//! Amounts are stored as decimal text so that no precision is lost. Timestamps are stored as
//! RFC 3339 text with microseconds and a `Z` suffix, which sorts chronologically as a string.
//!
//! Change notification is in-process: every write publishes the user's full document set to
//! subscribers of this `Db` (and of its clones) after it commits.

mod migrations;

use crate::error::{Error, ErrorType, IntoResult, Res, Result};
use crate::model::{
    Amount, ExpenseRecord, ExpenseSource, ExpenseType, MerchantKey, MerchantMemoryEntry, UserId,
    ValidExpense,
};
use crate::store::{ChangeStream, Notifier, ServerClock, Store};
use anyhow::{bail, Context};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

const SELECT_EXPENSES: &str =
    "SELECT id, item, amount, type, category, note, source, date FROM expenses";

/// A handle to the expense database. Clones share the pool and the subscribers.
#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
    shared: Arc<Shared>,
}

#[derive(Debug, Default)]
struct Shared {
    notifier: Notifier,
    clock: ServerClock,
    /// Serializes each write with the snapshot that is published for it.
    write: Mutex<()>,
}

impl Db {
    /// - Validates that there is a SQLite file at `path`
    /// - Opens a connection pool
    /// - Migrates the schema if it is out-of-date
    pub(crate) async fn load(path: impl AsRef<Path>) -> Res<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            bail!("The database file is missing '{}'", path.display());
        }
        let pool = connect(path, false).await?;
        migrations::upgrade(&pool).await?;
        debug!("Loaded the expense database at '{}'", path.display());
        Ok(Self::from_pool(pool))
    }

    /// - Validates that no file currently exists at `path`
    /// - Creates a new SQLite file at `path`
    /// - Initializes the schema
    pub(crate) async fn init(path: impl AsRef<Path>) -> Res<Self> {
        let path = path.as_ref();
        if path.exists() {
            bail!("A database file already exists at '{}'", path.display());
        }
        let pool = connect(path, true).await?;
        migrations::bootstrap(&pool).await?;
        migrations::upgrade(&pool).await?;
        info!("Created the expense database at '{}'", path.display());
        Ok(Self::from_pool(pool))
    }

    fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Closes the pool. Every open change stream is lost and later calls fail with
    /// `StoreUnavailable`.
    pub async fn close(&self) {
        let _guard = self.shared.write.lock().await;
        self.pool.close().await;
        self.shared
            .notifier
            .sever_all("the expense database was closed");
    }

    /// The number of expense rows across all users.
    #[cfg(test)]
    async fn count_expenses(&self) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM expenses")
            .fetch_one(&self.pool)
            .await
            .context("Unable to count expenses")
            .pub_result(ErrorType::StoreUnavailable)?;
        Ok(u64::try_from(row.0).unwrap_or_default())
    }

    async fn fetch_all(&self, user: &UserId) -> Result<Vec<ExpenseRecord>> {
        let rows = sqlx::query(&format!(
            "{SELECT_EXPENSES} WHERE user_id = ? ORDER BY date DESC, id DESC"
        ))
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Unable to read the expenses of '{user}'"))
        .pub_result(ErrorType::StoreUnavailable)?;
        rows.iter()
            .map(expense_from_row)
            .collect::<Res<Vec<_>>>()
            .pub_result(ErrorType::Internal)
    }

    /// Publishes the user's full document set. Call while holding the write lock, after the write
    /// has committed.
    ///
    /// If the ledger cannot be read back, the user's change streams are severed so that
    /// subscribers see the loss instead of a ledger that silently stops updating. The write itself
    /// still stands.
    async fn publish(&self, user: &UserId) {
        match self.fetch_all(user).await {
            Ok(records) => {
                let generation = self.shared.notifier.publish(user, records);
                debug!("Published the ledger of '{user}' at generation {generation}");
            }
            Err(e) => {
                warn!("Unable to publish the ledger of '{user}' after a write: {e:#}");
                self.shared
                    .notifier
                    .sever(user, &format!("unable to read the ledger back: {e}"));
            }
        }
    }

    /// The creation date of expense `id`, or `None` if `user` has no such expense.
    async fn fetch_date(&self, user: &UserId, id: &str) -> Result<Option<DateTime<Utc>>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT date FROM expenses WHERE user_id = ? AND id = ?")
                .bind(user.as_str())
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .with_context(|| format!("Unable to read expense '{id}'"))
                .pub_result(ErrorType::StoreUnavailable)?;
        row.map(|(date,)| parse_timestamp(&date))
            .transpose()
            .pub_result(ErrorType::Internal)
    }
}

#[async_trait::async_trait]
impl Store for Db {
    async fn add(&self, user: &UserId, expense: ValidExpense) -> Result<ExpenseRecord> {
        let _guard = self.shared.write.lock().await;
        let record = expense.into_record(Uuid::new_v4().to_string(), self.shared.clock.next());
        sqlx::query(
            "INSERT INTO expenses (id, user_id, item, amount, type, category, note, source, date) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(user.as_str())
        .bind(&record.item)
        .bind(record.amount.value().to_string())
        .bind(record.r#type.as_str())
        .bind(&record.category)
        .bind(&record.note)
        .bind(record.source.to_string())
        .bind(timestamp(&record.date))
        .execute(&self.pool)
        .await
        .context("Unable to add expense")
        .pub_result(ErrorType::StoreUnavailable)?;
        debug!("Added expense '{}' for '{user}'", record.id);
        self.publish(user).await;
        Ok(record)
    }

    async fn update(
        &self,
        user: &UserId,
        id: &str,
        expense: ValidExpense,
    ) -> Result<ExpenseRecord> {
        let _guard = self.shared.write.lock().await;
        let date = self
            .fetch_date(user, id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Expense '{id}' does not exist")))?;
        let record = expense.into_record(id, date);
        let result = sqlx::query(
            "UPDATE expenses SET item = ?, amount = ?, type = ?, category = ?, note = ?, \
             source = ? WHERE user_id = ? AND id = ?",
        )
        .bind(&record.item)
        .bind(record.amount.value().to_string())
        .bind(record.r#type.as_str())
        .bind(&record.category)
        .bind(&record.note)
        .bind(record.source.to_string())
        .bind(user.as_str())
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Unable to update expense '{id}'"))
        .pub_result(ErrorType::StoreUnavailable)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("Expense '{id}' does not exist")));
        }
        debug!("Updated expense '{id}' for '{user}'");
        self.publish(user).await;
        Ok(record)
    }

    async fn delete(&self, user: &UserId, id: &str) -> Result<()> {
        let _guard = self.shared.write.lock().await;
        let result = sqlx::query("DELETE FROM expenses WHERE user_id = ? AND id = ?")
            .bind(user.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Unable to delete expense '{id}'"))
            .pub_result(ErrorType::StoreUnavailable)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("Expense '{id}' does not exist")));
        }
        debug!("Deleted expense '{id}' for '{user}'");
        self.publish(user).await;
        Ok(())
    }

    async fn list(&self, user: &UserId) -> Result<Vec<ExpenseRecord>> {
        self.fetch_all(user).await
    }

    async fn subscribe(&self, user: &UserId) -> Result<ChangeStream> {
        let _guard = self.shared.write.lock().await;
        let records = self.fetch_all(user).await?;
        Ok(self.shared.notifier.stream(user, records))
    }

    async fn save_merchant(
        &self,
        user: &UserId,
        key: &MerchantKey,
        category: &str,
        r#type: &ExpenseType,
    ) -> Result<MerchantMemoryEntry> {
        let _guard = self.shared.write.lock().await;
        let now = timestamp(&self.shared.clock.next());
        sqlx::query(
            "INSERT INTO merchants (user_id, merchant_key, category, type, created_at, last_used) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT (user_id, merchant_key) DO UPDATE SET \
             category = excluded.category, type = excluded.type, last_used = excluded.last_used",
        )
        .bind(user.as_str())
        .bind(key.as_str())
        .bind(category)
        .bind(r#type.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Unable to save merchant '{key}'"))
        .pub_result(ErrorType::StoreUnavailable)?;
        self.get_merchant(user, key).await?.ok_or_else(|| {
            Error::new(
                ErrorType::Internal,
                anyhow::anyhow!("Merchant '{key}' was not found after saving it"),
            )
        })
    }

    async fn get_merchant(
        &self,
        user: &UserId,
        key: &MerchantKey,
    ) -> Result<Option<MerchantMemoryEntry>> {
        let row = sqlx::query(
            "SELECT merchant_key, category, type, created_at, last_used FROM merchants \
             WHERE user_id = ? AND merchant_key = ?",
        )
        .bind(user.as_str())
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Unable to look up merchant '{key}'"))
        .pub_result(ErrorType::StoreUnavailable)?;
        row.as_ref()
            .map(merchant_from_row)
            .transpose()
            .pub_result(ErrorType::Internal)
    }
}

async fn connect(path: &Path, create: bool) -> Res<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create);
    SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .with_context(|| format!("Unable to open SQLite database '{}'", path.display()))
}

fn timestamp(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Res<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid timestamp '{value}' in the database"))?
        .with_timezone(&Utc))
}

fn expense_from_row(row: &SqliteRow) -> Res<ExpenseRecord> {
    let amount: String = row.try_get("amount")?;
    let r#type: String = row.try_get("type")?;
    let source: String = row.try_get("source")?;
    let date: String = row.try_get("date")?;
    Ok(ExpenseRecord {
        id: row.try_get("id")?,
        item: row.try_get("item")?,
        amount: Amount::from_str(&amount)
            .with_context(|| format!("Invalid amount '{amount}' in the database"))?,
        r#type: ExpenseType::from(r#type),
        category: row.try_get("category")?,
        note: row.try_get("note")?,
        source: ExpenseSource::from_str(&source)
            .with_context(|| format!("Invalid source '{source}' in the database"))?,
        date: parse_timestamp(&date)?,
    })
}

fn merchant_from_row(row: &SqliteRow) -> Res<MerchantMemoryEntry> {
    let key: String = row.try_get("merchant_key")?;
    let r#type: String = row.try_get("type")?;
    let created_at: String = row.try_get("created_at")?;
    let last_used: String = row.try_get("last_used")?;
    Ok(MerchantMemoryEntry {
        merchant_key: MerchantKey::new(&key)?,
        category: row.try_get("category")?,
        r#type: ExpenseType::from(r#type),
        created_at: parse_timestamp(&created_at)?,
        last_used: parse_timestamp(&last_used)?,
    })
}
