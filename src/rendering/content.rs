use std::sync::LazyLock;

use pulldown_cmark::{html, Options, Parser};
use regex::Regex;

static SLUG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("slug pattern compiles"));

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern compiles"));

/// Sanitise editor HTML before it is stored.
pub fn sanitize_html(raw: &str) -> String {
    ammonia::clean(raw)
}

/// Render post content (Markdown, HTML or a mix of both) to sanitised HTML.
///
/// Supports GitHub Flavored Markdown (GFM) features: tables,
/// footnotes, strikethrough, task lists, and smart punctuation.
pub fn render_content(raw: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_SMART_PUNCTUATION;

    let parser = Parser::new_ext(raw, options);
    let mut html_output = String::new();
    html::push_html(&mut html_output, parser);
    ammonia::clean(&html_output)
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

/// Plain text of `raw`, whitespace-collapsed and cut to `max_chars` characters.
pub fn plain_text_excerpt(raw: &str, max_chars: usize) -> String {
    let html = render_content(raw);
    let stripped = TAG_PATTERN.replace_all(&html, " ");
    let text = decode_entities(&stripped);

    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(max_chars)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Derive a URL slug: lowercase ASCII alphanumerics separated by single dashes.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

pub fn is_valid_slug(slug: &str) -> bool {
    SLUG_PATTERN.is_match(slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_paragraph() {
        let result = render_content("Hello, world!");
        assert_eq!(result.trim(), "<p>Hello, world!</p>");
    }

    #[test]
    fn test_heading() {
        let result = render_content("# Title");
        assert_eq!(result.trim(), "<h1>Title</h1>");
    }

    #[test]
    fn test_bold_and_italic() {
        let result = render_content("**bold** and *italic*");
        assert!(result.contains("<strong>bold</strong>"));
        assert!(result.contains("<em>italic</em>"));
    }

    #[test]
    fn test_table() {
        let input = "| A | B |\n|---|---|\n| 1 | 2 |";
        let result = render_content(input);
        assert!(result.contains("<table>"));
        assert!(result.contains("<td>1</td>"));
    }

    #[test]
    fn test_editor_html_passes_through() {
        let result = render_content("<p>Rich <strong>text</strong></p>");
        assert!(result.contains("<strong>text</strong>"));
    }

    #[test]
    fn test_scripts_are_removed() {
        let result = render_content("<p>hi</p>\n\n<script>alert(1)</script>");
        assert!(result.contains("hi"));
        assert!(!result.contains("script"));
        assert!(!result.contains("alert"));
    }

    #[test]
    fn test_event_handlers_are_removed() {
        let result = sanitize_html(r#"<img src="a.png" onerror="alert(1)">"#);
        assert!(!result.contains("onerror"));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(render_content(""), "");
        assert_eq!(plain_text_excerpt("", 200), "");
    }

    #[test]
    fn test_excerpt_strips_markup() {
        let excerpt = plain_text_excerpt("<p>Tom &amp; Jerry</p><p>are   back</p>", 200);
        assert_eq!(excerpt, "Tom & Jerry are back");

        let excerpt = plain_text_excerpt("# Title\n\nSome **bold** words", 200);
        assert_eq!(excerpt, "Title Some bold words");
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let excerpt = plain_text_excerpt("héllo wörld", 4);
        assert_eq!(excerpt, "héll");

        let long = "a".repeat(500);
        assert_eq!(plain_text_excerpt(&long, 200).chars().count(), 200);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Rust  2024 -- notes "), "rust-2024-notes");
        assert_eq!(slugify("---"), "");
        assert_eq!(slugify("Café au lait"), "caf-au-lait");
    }

    #[test]
    fn test_is_valid_slug() {
        assert!(is_valid_slug("hello-world"));
        assert!(is_valid_slug("a1"));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("Hello"));
        assert!(!is_valid_slug("-lead"));
        assert!(!is_valid_slug("trail-"));
        assert!(!is_valid_slug("double--dash"));
        assert!(!is_valid_slug("under_score"));
    }

    #[test]
    fn test_slugify_output_is_valid() {
        for title in ["Hello World", "A/B testing", "10 tips & tricks"] {
            assert!(is_valid_slug(&slugify(title)), "{title}");
        }
    }
}
