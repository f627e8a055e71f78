use std::sync::Arc;

use news_pipeline::media::MediaStore;
use news_pipeline::repo::ArticleRepository;
use news_pipeline::rewrite::RemoteFetcher;

#[derive(Clone)]
pub struct AppState {
    pub repo: ArticleRepository,
    pub media: MediaStore,
    pub fetcher: Arc<dyn RemoteFetcher>,
    /// Shared admin secret. `None` means unconfigured: admin routes fail
    /// closed rather than fall back to a built-in credential.
    pub admin_token: Option<String>,
}
