pub mod db;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::http::{header, HeaderName, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use handlers::upload_handlers::serve_media;
use routes::{news::news_routes, uploads::upload_routes};
use state::AppState;

pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-admin-token"),
        ]);

    // CORS covers the /api surface only; /health and /media stay plain.
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/api", news_routes().merge(upload_routes()).layer(cors))
        .route("/media/{*key}", get(serve_media))
        .with_state(state)
}
