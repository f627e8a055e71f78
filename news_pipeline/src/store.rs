use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::error::StoreError;

/// Opens (creating if missing) the SQLite file backing both the keyed
/// record store and the blob namespace.
pub async fn open(path: &Path) -> Result<SqlitePool, StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// In-memory store for tests. A single connection keeps the database alive
/// for the lifetime of the pool.
pub async fn open_in_memory() -> Result<SqlitePool, StoreError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_schema(&pool).await?;
    Ok(pool)
}

async fn init_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query("CREATE TABLE IF NOT EXISTS kv (k TEXT PRIMARY KEY, v TEXT NOT NULL)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS blobs (k TEXT PRIMARY KEY, data BLOB NOT NULL, content_type TEXT)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn kv_get(pool: &SqlitePool, key: &str) -> Result<Option<String>, StoreError> {
    let row = sqlx::query("SELECT v FROM kv WHERE k = ?1")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| row.get("v")))
}

pub(crate) async fn kv_put(pool: &SqlitePool, key: &str, value: &str) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO kv (k, v) VALUES (?1, ?2) ON CONFLICT(k) DO UPDATE SET v = excluded.v")
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;
    Ok(())
}

pub(crate) async fn kv_delete(pool: &SqlitePool, key: &str) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM kv WHERE k = ?1")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(())
}
