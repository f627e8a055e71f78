pub mod error;
pub mod excerpt;
pub mod media;
pub mod repo;
pub mod rewrite;
pub mod slug;
pub mod store;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Article {
    pub slug: String,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_image: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub published_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ArticleSummary {
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_image: Option<String>,
    pub published_at: String,
    pub updated_at: String,
}

impl Article {
    pub fn summary(&self) -> ArticleSummary {
        ArticleSummary {
            slug: self.slug.clone(),
            title: self.title.clone(),
            excerpt: self.excerpt.clone(),
            preview_image: self.preview_image.clone(),
            published_at: self.published_at.clone(),
            updated_at: self.updated_at.clone(),
        }
    }
}
