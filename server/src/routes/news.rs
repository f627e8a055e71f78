use axum::routing::get;
use axum::Router;

use crate::handlers::news_handlers::{
    create_article, delete_article, get_article, list_articles, update_article,
};
use crate::state::AppState;

pub fn news_routes() -> Router<AppState> {
    Router::new()
        .route("/news", get(list_articles).post(create_article))
        .route(
            "/news/{slug}",
            get(get_article).put(update_article).delete(delete_article),
        )
}
