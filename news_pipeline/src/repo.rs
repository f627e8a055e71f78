use chrono::{DateTime, NaiveDate};
use sqlx::SqlitePool;

use crate::error::StoreError;
use crate::store;
use crate::{Article, ArticleSummary};

const ARTICLE_PREFIX: &str = "article:";
const INDEX_KEY: &str = "index";

/// CRUD over the keyed article records plus the denormalized summary index
/// used for pagination. The record write and the index write are two
/// separate operations; the read path tolerates index entries whose record
/// is missing.
#[derive(Clone)]
pub struct ArticleRepository {
    pool: SqlitePool,
}

impl ArticleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, slug: &str) -> Result<Option<Article>, StoreError> {
        match store::kv_get(&self.pool, &format!("{ARTICLE_PREFIX}{slug}")).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn put(&self, article: &Article) -> Result<(), StoreError> {
        let raw = serde_json::to_string(article)?;
        store::kv_put(&self.pool, &format!("{ARTICLE_PREFIX}{}", article.slug), &raw).await?;
        self.upsert_index_entry(article).await
    }

    pub async fn delete(&self, slug: &str) -> Result<(), StoreError> {
        store::kv_delete(&self.pool, &format!("{ARTICLE_PREFIX}{slug}")).await?;
        let mut index = self.load_index().await?;
        index.retain(|entry| entry.slug != slug);
        self.store_index(&index).await
    }

    /// 1-based pages in the index's current sort order. Callers are expected
    /// to hand in already-clamped values; no clamping happens here.
    pub async fn paginate(
        &self,
        page: usize,
        limit: usize,
    ) -> Result<(Vec<Article>, usize), StoreError> {
        let index = self.load_index().await?;
        let total = index.len();
        let start = page.saturating_sub(1) * limit;
        let mut data = Vec::new();
        for entry in index.iter().skip(start).take(limit) {
            match self.get(&entry.slug).await? {
                Some(article) => data.push(article),
                None => {
                    tracing::warn!(slug = %entry.slug, "index entry has no record, skipping")
                }
            }
        }
        Ok((data, total))
    }

    async fn load_index(&self) -> Result<Vec<ArticleSummary>, StoreError> {
        match store::kv_get(&self.pool, INDEX_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw).unwrap_or_default()),
            None => Ok(Vec::new()),
        }
    }

    async fn store_index(&self, index: &[ArticleSummary]) -> Result<(), StoreError> {
        store::kv_put(&self.pool, INDEX_KEY, &serde_json::to_string(index)?).await
    }

    async fn upsert_index_entry(&self, article: &Article) -> Result<(), StoreError> {
        let mut index = self.load_index().await?;
        let entry = article.summary();
        match index.iter_mut().find(|item| item.slug == entry.slug) {
            Some(existing) => *existing = entry,
            None => index.push(entry),
        }
        index.sort_by_key(|entry| std::cmp::Reverse(sort_timestamp(entry)));
        self.store_index(&index).await
    }
}

fn sort_timestamp(entry: &ArticleSummary) -> i64 {
    parse_timestamp(&entry.published_at)
        .or_else(|| parse_timestamp(&entry.updated_at))
        .unwrap_or(0)
}

fn parse_timestamp(value: &str) -> Option<i64> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.timestamp());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}
