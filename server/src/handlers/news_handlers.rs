use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;

use news_pipeline::error::StoreError;
use news_pipeline::excerpt::{extract_excerpt, DEFAULT_EXCERPT_LENGTH};
use news_pipeline::rewrite::rewrite_content_images;
use news_pipeline::slug::normalize_slug;
use news_pipeline::Article;

use crate::handlers::{bad_request, not_found, server_error, ApiError};
use crate::middleware::admin_auth::require_admin;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ArticlePayload {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub published_at: Option<String>,
    pub preview_image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

fn parse_pagination(query: &ListQuery) -> (usize, usize) {
    let page = query.page.unwrap_or(1).max(1) as usize;
    let limit = query.limit.unwrap_or(10).clamp(1, 50) as usize;
    (page, limit)
}

/// Runs after the admin check: bad JSON with a bad token is 401, not 400.
fn parse_payload(body: &str) -> Result<ArticlePayload, ApiError> {
    serde_json::from_str(body).map_err(|_| bad_request("Invalid JSON body"))
}

fn validate(payload: &ArticlePayload) -> Result<(String, String), ApiError> {
    let title = payload.title.as_deref().unwrap_or("");
    let content = payload.content.as_deref().unwrap_or("");
    if title.is_empty() || content.is_empty() {
        return Err(bad_request("Missing required fields"));
    }
    Ok((title.to_string(), content.to_string()))
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Preview-image precedence: an explicit local or already-hosted value is
/// kept as-is, an explicit remote URL is fetched and persisted like content
/// images, and anything else falls back to the supplied default.
async fn resolve_preview_image(
    state: &AppState,
    slug: &str,
    requested: Option<&str>,
    fallback: Option<String>,
) -> Result<Option<String>, StoreError> {
    let Some(preview) = requested.map(str::trim).filter(|p| !p.is_empty()) else {
        return Ok(fallback);
    };

    if preview.starts_with("/media/") {
        return Ok(Some(preview.to_string()));
    }
    if let Some(base) = state.media.media_base_url() {
        if preview.starts_with(base) {
            return Ok(Some(preview.to_string()));
        }
    }
    let lower = preview.to_ascii_lowercase();
    if !lower.starts_with("http://") && !lower.starts_with("https://") {
        return Ok(Some(preview.to_string()));
    }

    let stored = state
        .media
        .save_remote_image(state.fetcher.as_ref(), slug, preview)
        .await?;
    Ok(stored.or(fallback))
}

pub async fn list_articles(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, limit) = parse_pagination(&query);
    let (data, total) = state.repo.paginate(page, limit).await.map_err(server_error)?;
    Ok(Json(json!({
        "data": data,
        "total": total,
        "page": page,
        "limit": limit,
    })))
}

pub async fn get_article(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let slug = normalize_slug(&slug);
    match state.repo.get(&slug).await.map_err(server_error)? {
        Some(article) => Ok(Json(article)),
        None => Err(not_found()),
    }
}

pub async fn create_article(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&state, &headers)?;
    let payload = parse_payload(&body)?;
    let (title, content) = validate(&payload)?;

    let slug = normalize_slug(
        payload
            .slug
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&title),
    );
    let now = now_rfc3339();

    let outcome = rewrite_content_images(state.fetcher.as_ref(), &state.media, &content, &slug)
        .await
        .map_err(server_error)?;
    let preview_image = resolve_preview_image(
        &state,
        &slug,
        payload.preview_image.as_deref(),
        outcome.first_image.clone(),
    )
    .await
    .map_err(server_error)?;
    let excerpt = extract_excerpt(&outcome.html, DEFAULT_EXCERPT_LENGTH);

    let existing = state.repo.get(&slug).await.map_err(server_error)?;
    let published_at = payload
        .published_at
        .clone()
        .filter(|p| !p.is_empty())
        .or_else(|| existing.as_ref().map(|e| e.published_at.clone()))
        .unwrap_or_else(today);

    let article = Article {
        slug: slug.clone(),
        title,
        content: outcome.html,
        excerpt,
        preview_image,
        created_at: existing
            .as_ref()
            .map(|e| e.created_at.clone())
            .unwrap_or_else(|| now.clone()),
        updated_at: now,
        published_at,
    };

    state.repo.put(&article).await.map_err(server_error)?;
    let status = if existing.is_some() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(article)))
}

pub async fn update_article(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    body: String,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&state, &headers)?;
    let payload = parse_payload(&body)?;
    let (title, content) = validate(&payload)?;

    let slug = normalize_slug(&slug);
    let Some(existing) = state.repo.get(&slug).await.map_err(server_error)? else {
        return Err(not_found());
    };

    let now = now_rfc3339();
    let outcome = rewrite_content_images(state.fetcher.as_ref(), &state.media, &content, &slug)
        .await
        .map_err(server_error)?;
    let fallback = outcome
        .first_image
        .clone()
        .or_else(|| existing.preview_image.clone());
    let preview_image =
        resolve_preview_image(&state, &slug, payload.preview_image.as_deref(), fallback)
            .await
            .map_err(server_error)?;
    let excerpt = extract_excerpt(&outcome.html, DEFAULT_EXCERPT_LENGTH);
    let published_at = payload
        .published_at
        .clone()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| existing.published_at.clone());

    let article = Article {
        slug: slug.clone(),
        title,
        content: outcome.html,
        excerpt,
        preview_image,
        created_at: existing.created_at.clone(),
        updated_at: now,
        published_at,
    };

    state.repo.put(&article).await.map_err(server_error)?;
    Ok(Json(article))
}

pub async fn delete_article(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&state, &headers)?;
    let slug = normalize_slug(&slug);
    state.repo.delete(&slug).await.map_err(server_error)?;
    Ok(StatusCode::NO_CONTENT)
}
