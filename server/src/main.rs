use std::env;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use news_pipeline::media::MediaStore;
use news_pipeline::repo::ArticleRepository;
use news_pipeline::rewrite::HttpFetcher;

use server::state::AppState;
use server::{build_app, db};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let pool = db::init_db().await.expect("failed to open database");

    let media_base_url = env::var("MEDIA_BASE_URL").ok();
    let admin_token = env::var("ADMIN_TOKEN")
        .ok()
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());
    if admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN is not set, admin routes will refuse all requests");
    }

    let state = AppState {
        repo: ArticleRepository::new(pool.clone()),
        media: MediaStore::new(pool, media_base_url),
        fetcher: Arc::new(HttpFetcher::new().expect("failed to build http client")),
        admin_token,
    };

    let app = build_app(state);

    let addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let listener = TcpListener::bind(&addr).await.expect("failed to bind");
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await.unwrap();
}
