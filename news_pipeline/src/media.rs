use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::StoreError;
use crate::rewrite::RemoteFetcher;

const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/avif", "avif"),
    ("image/svg+xml", "svg"),
];

/// Stored blobs are addressed by fresh UUIDs, so a key's content never
/// changes after first write and clients may cache it forever.
pub const MEDIA_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

/// Blob store adapter: binary assets under hierarchical keys, plus the
/// public URL scheme for serving them.
#[derive(Clone)]
pub struct MediaStore {
    pool: SqlitePool,
    media_base_url: Option<String>,
}

impl MediaStore {
    pub fn new(pool: SqlitePool, media_base_url: Option<String>) -> Self {
        let media_base_url = media_base_url
            .map(|base| base.trim().trim_end_matches('/').to_string())
            .filter(|base| !base.is_empty());
        Self {
            pool,
            media_base_url,
        }
    }

    pub fn media_base_url(&self) -> Option<&str> {
        self.media_base_url.as_deref()
    }

    pub fn public_url(&self, key: &str) -> String {
        match &self.media_base_url {
            Some(base) => format!("{}/{}", base, key),
            None => format!("/media/{}", key),
        }
    }

    pub async fn put(
        &self,
        key: &str,
        data: &[u8],
        content_type: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO blobs (k, data, content_type) VALUES (?1, ?2, ?3) \
             ON CONFLICT(k) DO UPDATE SET data = excluded.data, content_type = excluded.content_type",
        )
        .bind(key)
        .bind(data)
        .bind(content_type)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        let row = sqlx::query("SELECT data, content_type FROM blobs WHERE k = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| StoredObject {
            data: row.get("data"),
            content_type: row.get("content_type"),
        }))
    }

    /// Stores an uploaded file under `<prefix>/<uuid>.<ext>` and returns the
    /// storage key together with its public URL.
    pub async fn save_upload(
        &self,
        file_name: Option<&str>,
        content_type: Option<&str>,
        data: &[u8],
        prefix: &str,
    ) -> Result<(String, String), StoreError> {
        let extension = resolve_extension(content_type, file_name);
        let key = format!("{}/{}.{}", prefix, Uuid::new_v4(), extension);
        self.put(&key, data, content_type).await?;
        let url = self.public_url(&key);
        Ok((key, url))
    }

    /// Fetches a remote image and persists it under the article's namespace.
    /// Fetch failures are logged and return `Ok(None)` so a dead remote host
    /// never fails the surrounding write; storage failures propagate.
    pub async fn save_remote_image(
        &self,
        fetcher: &dyn RemoteFetcher,
        slug: &str,
        url: &str,
    ) -> Result<Option<String>, StoreError> {
        let fetched = match fetcher.fetch(url).await {
            Ok(fetched) => fetched,
            Err(err) => {
                tracing::warn!(%url, %err, "unable to fetch remote image");
                return Ok(None);
            }
        };
        let extension = resolve_extension(fetched.content_type.as_deref(), Some(url));
        let key = format!("articles/{}/{}.{}", slug, Uuid::new_v4(), extension);
        self.put(&key, &fetched.data, fetched.content_type.as_deref())
            .await?;
        Ok(Some(self.public_url(&key)))
    }
}

/// Picks a file extension from a MIME type, falling back to the trailing
/// extension of `fallback_name` and finally to `jpg`.
pub fn resolve_extension(content_type: Option<&str>, fallback_name: Option<&str>) -> String {
    if let Some(ct) = content_type {
        let ct = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        if let Some((_, ext)) = MIME_EXTENSIONS.iter().find(|(mime, _)| *mime == ct.as_str()) {
            return (*ext).to_string();
        }
    }
    if let Some(name) = fallback_name {
        if let Some((_, ext)) = name.rsplit_once('.') {
            if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
                return ext.to_ascii_lowercase();
            }
        }
    }
    "jpg".to_string()
}
