use std::env;
use std::path::PathBuf;

use news_pipeline::error::StoreError;
use news_pipeline::store;
use sqlx::SqlitePool;

pub async fn init_db() -> Result<SqlitePool, StoreError> {
    let path = env::var("DATABASE_PATH").unwrap_or_else(|_| "data/news.db".to_string());
    store::open(&PathBuf::from(path)).await
}
