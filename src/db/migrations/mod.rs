//! The expense database schema and how it is brought up to date.
//!
//! `migration_NN_up.sql` takes the schema from version `NN-1` to `NN`. The version is recorded in
//! the single-row `schema_version` table. Migrations only go forward: a database written by a
//! newer build is refused rather than downgraded.

use crate::error::Res;
use anyhow::{bail, Context};
use sqlx::{Executor, SqlitePool};
use tracing::{debug, info};

/// Upgrade scripts in order. The script at index `i` produces schema version `i + 1`.
const MIGRATIONS: &[&str] = &[include_str!("migration_01_up.sql")];

/// The schema version this build reads and writes.
pub(crate) const CURRENT_VERSION: i32 = MIGRATIONS.len() as i32;

/// Creates the `schema_version` table in a brand-new database, at version 0.
pub(crate) async fn bootstrap(pool: &SqlitePool) -> Res<()> {
    let mut tx = pool.begin().await.context("Failed to begin bootstrap")?;
    tx.execute("CREATE TABLE schema_version (version INTEGER NOT NULL)")
        .await
        .context("Failed to create schema_version table")?;
    tx.execute("INSERT INTO schema_version (version) VALUES (0)")
        .await
        .context("Failed to insert initial schema version")?;
    tx.commit().await.context("Failed to commit bootstrap")?;
    Ok(())
}

pub(crate) async fn version(pool: &SqlitePool) -> Res<i32> {
    let row: (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await
        .context("Failed to query schema version")?;
    row.0.context("The schema_version table is empty")
}

/// Applies every pending upgrade script, each in its own transaction together with the new
/// version number. Returns the resulting version.
pub(crate) async fn upgrade(pool: &SqlitePool) -> Res<i32> {
    let mut current = version(pool).await?;
    if current > CURRENT_VERSION {
        bail!(
            "The database schema is at version {current} which is newer than this app supports \
             ({CURRENT_VERSION})"
        );
    }
    if current == CURRENT_VERSION {
        debug!("The expense database schema is current at version {current}");
        return Ok(current);
    }
    while current < CURRENT_VERSION {
        let next = current + 1;
        let sql = usize::try_from(current)
            .ok()
            .and_then(|i| MIGRATIONS.get(i))
            .with_context(|| format!("No upgrade script for schema version {next}"))?;
        apply(pool, sql, next)
            .await
            .with_context(|| format!("Unable to upgrade the schema to version {next}"))?;
        debug!("Upgraded the expense database schema to version {next:02}");
        current = next;
    }
    info!("The expense database schema is now at version {current}");
    Ok(current)
}

async fn apply(pool: &SqlitePool, sql: &str, version: i32) -> Res<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    tx.execute(sql).await.context("Failed to execute upgrade script")?;
    sqlx::query("UPDATE schema_version SET version = ?")
        .bind(version)
        .execute(&mut *tx)
        .await
        .context("Failed to record schema version")?;
    tx.commit().await.context("Failed to commit upgrade")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use tempfile::TempDir;

    async fn fresh() -> (TempDir, SqlitePool) {
        let dir = TempDir::new().unwrap();
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("schema.sqlite"))
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        bootstrap(&pool).await.unwrap();
        (dir, pool)
    }

    async fn columns(pool: &SqlitePool, table: &str) -> Vec<String> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM pragma_table_info(?)")
            .bind(table)
            .fetch_all(pool)
            .await
            .unwrap();
        rows.into_iter().map(|(name,)| name).collect()
    }

    #[tokio::test]
    async fn test_upgrade_creates_expense_schema() {
        let (_dir, pool) = fresh().await;
        assert_eq!(version(&pool).await.unwrap(), 0);
        assert_eq!(upgrade(&pool).await.unwrap(), CURRENT_VERSION);
        assert_eq!(version(&pool).await.unwrap(), CURRENT_VERSION);

        assert_eq!(
            columns(&pool, "expenses").await,
            vec!["id", "user_id", "item", "amount", "type", "category", "note", "source", "date"]
        );
        assert_eq!(
            columns(&pool, "merchants").await,
            vec!["user_id", "merchant_key", "category", "type", "created_at", "last_used"]
        );
        let index: (String,) = sqlx::query_as(
            "SELECT tbl_name FROM sqlite_master WHERE type = 'index' AND name = ?",
        )
        .bind("idx_expenses_user_date")
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(index.0, "expenses");
    }

    #[tokio::test]
    async fn test_merchant_key_is_unique_per_user() {
        let (_dir, pool) = fresh().await;
        upgrade(&pool).await.unwrap();
        let insert = "INSERT INTO merchants \
            (user_id, merchant_key, category, type, created_at, last_used) \
            VALUES (?, 'swiggy', 'food', 'personal', 't', 't')";
        sqlx::query(insert).bind("u1").execute(&pool).await.unwrap();
        sqlx::query(insert).bind("u2").execute(&pool).await.unwrap();
        assert!(sqlx::query(insert).bind("u1").execute(&pool).await.is_err());
    }

    #[tokio::test]
    async fn test_upgrade_is_idempotent() {
        let (_dir, pool) = fresh().await;
        upgrade(&pool).await.unwrap();
        assert_eq!(upgrade(&pool).await.unwrap(), CURRENT_VERSION);
        let rows: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM schema_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows.0, 1);
    }

    #[tokio::test]
    async fn test_newer_schema_is_refused() {
        let (_dir, pool) = fresh().await;
        sqlx::query("UPDATE schema_version SET version = ?")
            .bind(CURRENT_VERSION + 1)
            .execute(&pool)
            .await
            .unwrap();
        let err = upgrade(&pool).await.unwrap_err();
        assert!(err.to_string().contains("newer than this app supports"));
        assert!(columns(&pool, "expenses").await.is_empty());
    }
}
