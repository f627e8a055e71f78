use chrono::Utc;

/// Lowercases, collapses runs of non-alphanumeric characters to a single
/// hyphen and strips hyphens at both ends. Empty input falls back to a
/// timestamped `article-<millis>` slug so the result is never empty.
pub fn normalize_slug(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_hyphen = false;
    for ch in input.trim().chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(ch);
        } else {
            pending_hyphen = true;
        }
    }
    if out.is_empty() {
        return format!("article-{}", Utc::now().timestamp_millis());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_hyphenates() {
        assert_eq!(normalize_slug("Hello, World!"), "hello-world");
        assert_eq!(normalize_slug("  Breaking   News: 2024 "), "breaking-news-2024");
        assert_eq!(normalize_slug("--already--slugged--"), "already-slugged");
    }

    #[test]
    fn is_idempotent() {
        for input in ["Hello, World!", "ünïcode tïtle", "a b c", "X"] {
            let once = normalize_slug(input);
            assert_eq!(normalize_slug(&once), once);
        }
    }

    #[test]
    fn empty_inputs_fall_back_to_timestamped_slug() {
        for input in ["", "   ", "!!!"] {
            let slug = normalize_slug(input);
            let digits = slug.strip_prefix("article-").expect("fallback prefix");
            assert!(!digits.is_empty());
            assert!(digits.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
