use scraper::Html;

pub const DEFAULT_EXCERPT_LENGTH: usize = 220;

/// Plain-text excerpt of an HTML fragment. Tags are stripped, whitespace
/// runs collapse to single spaces and over-long text is cut at the last
/// word boundary before `max_length` characters, with an ellipsis appended.
/// The parser tolerates malformed markup, so this never panics.
pub fn extract_excerpt(html: &str, max_length: usize) -> String {
    let fragment = Html::parse_fragment(html);
    let raw: String = fragment.root_element().text().collect();
    let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.chars().count() <= max_length {
        return text;
    }

    let cut: String = text.chars().take(max_length).collect();
    let kept = match cut.rfind(|c: char| c.is_whitespace()) {
        Some(pos) => cut[..pos].trim_end(),
        None => cut.trim_end(),
    };
    format!("{}…", kept.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_collapses_whitespace() {
        assert_eq!(extract_excerpt("<p>Hello <b>World</b></p>", 220), "Hello World");
        assert_eq!(extract_excerpt("<p>a\n\n  b</p>\n<p>c</p>", 220), "a b c");
    }

    #[test]
    fn short_text_is_returned_as_is() {
        assert_eq!(extract_excerpt("plain text, no markup", 220), "plain text, no markup");
        assert_eq!(extract_excerpt("", 220), "");
    }

    #[test]
    fn truncates_at_word_boundary_with_ellipsis() {
        let text = "word ".repeat(100);
        let excerpt = extract_excerpt(&text, 10);
        assert!(excerpt.chars().count() <= 11);
        assert!(excerpt.ends_with('…'));
        assert_eq!(excerpt, "word word…");
    }

    #[test]
    fn long_unbroken_word_is_cut_hard() {
        let text = "x".repeat(500);
        let excerpt = extract_excerpt(&text, 10);
        assert_eq!(excerpt.chars().count(), 11);
        assert!(excerpt.ends_with('…'));
    }

    #[test]
    fn tolerates_malformed_markup() {
        assert_eq!(extract_excerpt("<p>unclosed <b>bold", 220), "unclosed bold");
        assert!(extract_excerpt("<<not>> really <html", 220).contains("really"));
    }
}
