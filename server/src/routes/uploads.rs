use axum::routing::post;
use axum::Router;

use crate::handlers::upload_handlers::upload_file;
use crate::state::AppState;

pub fn upload_routes() -> Router<AppState> {
    Router::new().route("/uploads", post(upload_file))
}
