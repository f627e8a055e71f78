use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use news_pipeline::media::MEDIA_CACHE_CONTROL;

use crate::handlers::{bad_request, not_found, server_error, ApiError};
use crate::middleware::admin_auth::require_admin;
use crate::state::AppState;

const UPLOAD_PREFIX: &str = "uploads/news";

pub async fn upload_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&state, &headers)?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| bad_request("Unable to parse form data"))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(|name| name.to_string());
        let content_type = field.content_type().map(|ct| ct.to_string());
        let data = field
            .bytes()
            .await
            .map_err(|_| bad_request("Unable to parse form data"))?;

        let (_key, url) = state
            .media
            .save_upload(
                file_name.as_deref(),
                content_type.as_deref(),
                &data,
                UPLOAD_PREFIX,
            )
            .await
            .map_err(server_error)?;
        return Ok((StatusCode::CREATED, Json(json!({ "url": url }))));
    }

    Err(bad_request("Missing file"))
}

pub async fn serve_media(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.media.get(&key).await.map_err(server_error)? {
        Some(object) => {
            let mut headers = HeaderMap::new();
            if let Some(value) = object
                .content_type
                .as_deref()
                .and_then(|ct| HeaderValue::from_str(ct).ok())
            {
                headers.insert(header::CONTENT_TYPE, value);
            }
            headers.insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static(MEDIA_CACHE_CONTROL),
            );
            Ok((headers, object.data))
        }
        None => Err(not_found()),
    }
}
