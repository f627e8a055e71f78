use std::collections::HashMap;
use std::ops::Range;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use scraper::{Html, Selector};

use crate::error::{FetchError, StoreError};
use crate::media::MediaStore;

const MAX_CONCURRENT_FETCHES: usize = 8;

pub struct FetchedImage {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

/// Seam for outbound image fetches, so the rewrite pipeline can be tested
/// without network access.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let data = response.bytes().await?.to_vec();
        Ok(FetchedImage { data, content_type })
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum SrcKind {
    Local,
    Inline,
    Relative,
    Remote,
}

fn classify_src(src: &str, media_base: Option<&str>) -> SrcKind {
    if src.starts_with("/media/") {
        return SrcKind::Local;
    }
    if let Some(base) = media_base {
        if src.starts_with(base) {
            return SrcKind::Local;
        }
    }
    let lower = src.to_ascii_lowercase();
    if lower.starts_with("data:") {
        return SrcKind::Inline;
    }
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return SrcKind::Remote;
    }
    SrcKind::Relative
}

pub struct RewriteOutcome {
    pub html: String,
    /// First source in document order that is already resolved or was
    /// persisted by this call; used as the preview-image fallback.
    pub first_image: Option<String>,
}

/// Rewrites remote `<img>` sources in an HTML fragment to locally hosted
/// copies. Local, inline and relative sources pass through untouched, as
/// does any remote source whose fetch fails. Only the matched `src`
/// attributes change; the rest of the fragment stays byte-identical.
pub async fn rewrite_content_images(
    fetcher: &dyn RemoteFetcher,
    media: &MediaStore,
    html: &str,
    slug: &str,
) -> Result<RewriteOutcome, StoreError> {
    let sources = collect_image_sources(html);

    let mut remote: Vec<String> = Vec::new();
    for src in &sources {
        if classify_src(src, media.media_base_url()) == SrcKind::Remote && !remote.contains(src) {
            remote.push(src.clone());
        }
    }

    let results: Vec<(String, Result<Option<String>, StoreError>)> = stream::iter(remote)
        .map(|url| async move {
            let saved = media.save_remote_image(fetcher, slug, &url).await;
            (url, saved)
        })
        .buffer_unordered(MAX_CONCURRENT_FETCHES)
        .collect()
        .await;

    let mut rewritten: HashMap<String, String> = HashMap::new();
    for (url, saved) in results {
        if let Some(new_url) = saved? {
            rewritten.insert(url, new_url);
        }
    }

    let output = rewrite_img_sources(html, &rewritten);

    let first_image = sources.iter().find_map(|src| {
        match classify_src(src, media.media_base_url()) {
            SrcKind::Remote => rewritten.get(src).cloned(),
            _ => Some(src.clone()),
        }
    });

    Ok(RewriteOutcome {
        html: output,
        first_image,
    })
}

/// Splices persisted URLs into the `src` attributes of `<img>` tags in the
/// raw input, leaving every other byte untouched. Attribute values are
/// located by scanning the tag itself (double-quoted, single-quoted or
/// unquoted) and entity-decoded before lookup, so matching never depends on
/// how the document encodes the URL, and a URL that merely appears in text
/// content is never touched.
fn rewrite_img_sources(html: &str, rewritten: &HashMap<String, String>) -> String {
    if rewritten.is_empty() {
        return html.to_string();
    }

    let bytes = html.as_bytes();
    let mut replacements: Vec<(Range<usize>, &str)> = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        if html[i..].starts_with("<!--") {
            i = html[i..]
                .find("-->")
                .map(|pos| i + pos + 3)
                .unwrap_or(bytes.len());
            continue;
        }
        let rest = &html[i + 1..];
        if rest.len() < 3 || !rest[..3].eq_ignore_ascii_case("img") {
            i += 1;
            continue;
        }
        match rest.as_bytes().get(3) {
            Some(c) if c.is_ascii_whitespace() || *c == b'/' || *c == b'>' => {}
            _ => {
                i += 1;
                continue;
            }
        }

        let (tag_end, src_span) = scan_img_tag(html, i + 4);
        if let Some(span) = src_span {
            let decoded = decode_entities(&html[span.clone()]);
            if let Some(new_url) = rewritten.get(&decoded) {
                replacements.push((span, new_url.as_str()));
            }
        }
        i = tag_end;
    }

    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    for (span, new_url) in replacements {
        out.push_str(&html[last..span.start]);
        out.push_str(new_url);
        last = span.end;
    }
    out.push_str(&html[last..]);
    out
}

/// Walks the attributes of one `<img>` tag starting just past the tag name.
/// Returns the index after the closing `>` and the byte span of the first
/// `src` attribute value, quotes excluded.
fn scan_img_tag(html: &str, mut i: usize) -> (usize, Option<Range<usize>>) {
    let bytes = html.as_bytes();
    let mut src_span = None;
    while i < bytes.len() {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        if bytes[i] == b'>' {
            return (i + 1, src_span);
        }

        let name_start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && bytes[i] != b'='
            && bytes[i] != b'>'
            && bytes[i] != b'/'
        {
            i += 1;
        }
        let name = &html[name_start..i];
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i < bytes.len() && bytes[i] == b'=' {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i >= bytes.len() {
                break;
            }
            let value_span = if bytes[i] == b'"' || bytes[i] == b'\'' {
                let quote = bytes[i];
                let start = i + 1;
                i = start;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                let span = start..i;
                if i < bytes.len() {
                    i += 1;
                }
                span
            } else {
                let start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                    i += 1;
                }
                start..i
            };
            if name.eq_ignore_ascii_case("src") && src_span.is_none() {
                src_span = Some(value_span);
            }
        }
    }
    (i, src_span)
}

/// Decodes the entities that show up in attribute values: the five named
/// basics plus numeric references. Anything unrecognized stays literal.
fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match rest.find(';') {
            Some(end) if end > 1 && end <= 32 => {
                if let Some(decoded) = decode_entity(&rest[1..end]) {
                    out.push(decoded);
                    rest = &rest[end + 1..];
                } else {
                    out.push('&');
                    rest = &rest[1..];
                }
            }
            _ => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => return Some('&'),
        "lt" => return Some('<'),
        "gt" => return Some('>'),
        "quot" => return Some('"'),
        "apos" => return Some('\''),
        _ => {}
    }
    let digits = entity.strip_prefix('#')?;
    let code = if let Some(hex) = digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<u32>().ok()?
    };
    char::from_u32(code)
}

fn collect_image_sources(html: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(html);
    let selector = Selector::parse("img").unwrap();
    fragment
        .select(&selector)
        .filter_map(|element| element.value().attr("src"))
        .map(|src| src.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::store;

    struct OkFetcher;

    #[async_trait]
    impl RemoteFetcher for OkFetcher {
        async fn fetch(&self, _url: &str) -> Result<FetchedImage, FetchError> {
            Ok(FetchedImage {
                data: vec![0x89, b'P', b'N', b'G'],
                content_type: Some("image/png".to_string()),
            })
        }
    }

    struct FailFetcher;

    #[async_trait]
    impl RemoteFetcher for FailFetcher {
        async fn fetch(&self, _url: &str) -> Result<FetchedImage, FetchError> {
            Err(FetchError::Status(502))
        }
    }

    async fn media() -> MediaStore {
        let pool = store::open_in_memory().await.unwrap();
        MediaStore::new(pool, None)
    }

    #[tokio::test]
    async fn persists_remote_image_and_rewrites_src() {
        let media = media().await;
        let html = r#"<p>Intro</p><img src="https://example.com/a.png"><p>Outro</p>"#;
        let outcome = rewrite_content_images(&OkFetcher, &media, html, "my-post")
            .await
            .unwrap();

        assert!(!outcome.html.contains("https://example.com"));
        let first = outcome.first_image.expect("first image");
        assert!(first.starts_with("/media/articles/my-post/"));
        assert!(first.ends_with(".png"));
        assert!(outcome.html.contains(&format!("src=\"{}\"", first)));
        assert!(outcome.html.starts_with("<p>Intro</p>"));
        assert!(outcome.html.ends_with("<p>Outro</p>"));

        let key = first.trim_start_matches("/media/");
        let stored = media.get(key).await.unwrap().expect("stored object");
        assert_eq!(stored.content_type.as_deref(), Some("image/png"));
        assert_eq!(stored.data, vec![0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn failed_fetch_leaves_html_untouched() {
        let media = media().await;
        let html = r#"<p>Hi</p><img src="https://dead.example.com/a.png">"#;
        let outcome = rewrite_content_images(&FailFetcher, &media, html, "my-post")
            .await
            .unwrap();
        assert_eq!(outcome.html, html);
        assert!(outcome.first_image.is_none());
    }

    #[tokio::test]
    async fn local_inline_and_relative_sources_pass_through() {
        let media = media().await;
        let html = concat!(
            r#"<img src="/media/uploads/news/a.png">"#,
            r#"<img src="data:image/gif;base64,R0lGOD">"#,
            r#"<img src="images/local.jpg">"#,
        );
        let outcome = rewrite_content_images(&FailFetcher, &media, html, "post")
            .await
            .unwrap();
        assert_eq!(outcome.html, html);
        assert_eq!(
            outcome.first_image.as_deref(),
            Some("/media/uploads/news/a.png")
        );
    }

    #[tokio::test]
    async fn first_image_skips_failed_remote_fetches() {
        let media = media().await;
        let html = concat!(
            r#"<img src="https://dead.example.com/a.png">"#,
            r#"<img src="/media/uploads/news/b.png">"#,
        );
        let outcome = rewrite_content_images(&FailFetcher, &media, html, "post")
            .await
            .unwrap();
        assert_eq!(
            outcome.first_image.as_deref(),
            Some("/media/uploads/news/b.png")
        );
    }

    #[tokio::test]
    async fn entity_encoded_src_is_rewritten() {
        let media = media().await;
        let html = r#"<p>Hi</p><img src="https://example.com/a.png?a=1&amp;b=2">"#;
        let outcome = rewrite_content_images(&OkFetcher, &media, html, "post")
            .await
            .unwrap();

        assert!(!outcome.html.contains("example.com"));
        let first = outcome.first_image.expect("first image");
        assert!(first.starts_with("/media/articles/post/"));
        assert_eq!(
            outcome.html,
            format!(r#"<p>Hi</p><img src="{}">"#, first)
        );
    }

    #[tokio::test]
    async fn unquoted_src_is_rewritten() {
        let media = media().await;
        let html = "<p>Hi</p><img src=https://example.com/b.png>";
        let outcome = rewrite_content_images(&OkFetcher, &media, html, "post")
            .await
            .unwrap();

        assert!(!outcome.html.contains("example.com"));
        let first = outcome.first_image.expect("first image");
        assert_eq!(outcome.html, format!("<p>Hi</p><img src={}>", first));
    }

    #[tokio::test]
    async fn url_in_text_content_is_not_touched() {
        let media = media().await;
        let html = concat!(
            r#"<code>src="https://example.com/a.png"</code>"#,
            r#"<img src="https://example.com/a.png">"#,
        );
        let outcome = rewrite_content_images(&OkFetcher, &media, html, "post")
            .await
            .unwrap();

        assert!(outcome
            .html
            .starts_with(r#"<code>src="https://example.com/a.png"</code>"#));
        let first = outcome.first_image.expect("first image");
        assert!(outcome
            .html
            .ends_with(&format!(r#"<img src="{}">"#, first)));
    }

    #[tokio::test]
    async fn duplicate_remote_urls_are_fetched_once() {
        struct CountingFetcher {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl RemoteFetcher for CountingFetcher {
            async fn fetch(&self, _url: &str) -> Result<FetchedImage, FetchError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(FetchedImage {
                    data: vec![1],
                    content_type: Some("image/png".to_string()),
                })
            }
        }

        let media = media().await;
        let fetcher = CountingFetcher {
            calls: AtomicUsize::new(0),
        };
        let html = concat!(
            r#"<img src="https://example.com/a.png">"#,
            r#"<p>Twice</p>"#,
            r#"<img src="https://example.com/a.png">"#,
        );
        let outcome = rewrite_content_images(&fetcher, &media, html, "post")
            .await
            .unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(!outcome.html.contains("example.com"));
        let first = outcome.first_image.expect("first image");
        // both occurrences point at the same stored copy
        assert_eq!(outcome.html.matches(first.as_str()).count(), 2);
    }

    #[tokio::test]
    async fn configured_media_base_counts_as_local() {
        let pool = store::open_in_memory().await.unwrap();
        let media = MediaStore::new(pool, Some("https://cdn.example.test".to_string()));
        let html = r#"<img src="https://cdn.example.test/articles/p/a.png">"#;
        let outcome = rewrite_content_images(&FailFetcher, &media, html, "post")
            .await
            .unwrap();
        assert_eq!(outcome.html, html);
        assert_eq!(
            outcome.first_image.as_deref(),
            Some("https://cdn.example.test/articles/p/a.png")
        );
    }
}
