//! Link candidate extraction from converted email bodies.

use std::sync::LazyLock;

use regex::{CaptureMatches, Captures, Regex};
use serde::Serialize;
use tracing::trace;
use url::Url;

use super::error::{MAX_URL_LENGTH, ParseError};
use crate::utils::compile_static_regex;

/// Alternation order matters: at a shared start position the first branch wins,
/// so linked images are tried before plain Markdown links.
static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(concat!(
        // [![alt](src)](href)
        r#"\[!\[[^\]]*\]\([^)]*\)\]\(\s*(?P<linked_image>[^()\s]+)(?:\s+"[^"]*")?\s*\)"#,
        // ![alt](src)
        r#"|(?P<image>!\[[^\]]*\]\([^)]*\))"#,
        // [text](url "title"), one level of balanced parens in url
        r#"|\[(?P<md_text>[^\[\]]*)\]\(\s*<?(?P<md_url>[^()\s<>]*(?:\([^()\s]*\)[^()\s<>]*)*)>?(?:\s+"[^"]*")?\s*\)"#,
        // <a href="url">text</a>
        r#"|(?is:<a\s[^>]*?href\s*=\s*["'](?P<a_url>[^"']*)["'][^>]*>(?P<a_text>.*?)</a\s*>)"#,
        // bare URL
        r#"|(?P<bare>https?://[^\s<>"'\[\]]+)"#,
    ))
});

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"<[^>]*>"));

/// A hyperlink candidate as found in an email body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawLink {
    /// Visible link text; empty for bare URLs and linked images.
    pub text: String,
    /// Link target exactly as written (trimmed).
    pub url: String,
}

impl RawLink {
    /// Creates a new raw link.
    #[must_use]
    pub fn new(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: url.into(),
        }
    }
}

/// Lazy iterator over the link candidates of one body, in document order.
///
/// Each item is either a validated [`RawLink`] or the [`ParseError`] explaining
/// why the target is not a usable web URL.
#[derive(Debug)]
pub struct LinkCandidates<'a> {
    captures: CaptureMatches<'static, 'a>,
}

impl Iterator for LinkCandidates<'_> {
    type Item = Result<RawLink, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        for caps in self.captures.by_ref() {
            if let Some(image) = caps.name("image") {
                trace!(image = image.as_str(), "skipping image reference");
                continue;
            }
            let Some((text, target)) = candidate_parts(&caps) else {
                continue;
            };
            trace!(text = %text, url = %target, "found link candidate");
            return Some(validate_link(text, target));
        }
        None
    }
}

/// Scans an email body for Markdown links, HTML anchors and bare URLs.
///
/// The result is lazy and finite. Candidates are not deduplicated. Malformed
/// link syntax (such as unmatched brackets) is skipped silently.
///
/// # Examples
///
/// ```
/// use gmailmd_core::parser::extract_links;
///
/// let body = "[Read more](https://example.com/post) or see https://other.org/x.";
/// let links: Vec<_> = extract_links(body).filter_map(Result::ok).collect();
/// assert_eq!(links.len(), 2);
/// assert_eq!(links[0].text, "Read more");
/// assert_eq!(links[1].url, "https://other.org/x");
/// ```
#[must_use]
pub fn extract_links(body: &str) -> LinkCandidates<'_> {
    LinkCandidates {
        captures: LINK_PATTERN.captures_iter(body),
    }
}

fn candidate_parts(caps: &Captures<'_>) -> Option<(String, String)> {
    if let Some(href) = caps.name("linked_image") {
        return Some((String::new(), href.as_str().to_string()));
    }
    if let Some(url) = caps.name("md_url") {
        let text = caps.name("md_text").map_or("", |m| m.as_str());
        return Some((collapse_whitespace(text), url.as_str().to_string()));
    }
    if let Some(url) = caps.name("a_url") {
        let inner = caps.name("a_text").map_or("", |m| m.as_str());
        let text = decode_entities(&HTML_TAG.replace_all(inner, " "));
        return Some((collapse_whitespace(&text), decode_entities(url.as_str())));
    }
    caps.name("bare")
        .map(|m| (String::new(), clean_url_trailing(m.as_str()).to_string()))
}

fn validate_link(text: String, target: String) -> Result<RawLink, ParseError> {
    let target = target.trim();

    if target.len() > MAX_URL_LENGTH {
        return Err(ParseError::too_long(target, &text));
    }

    let parsed = match Url::parse(target) {
        Ok(parsed) => parsed,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            return Err(ParseError::missing_scheme(target, &text));
        }
        Err(e) => return Err(ParseError::malformed(target, &text, &e.to_string())),
    };

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(ParseError::unsupported_scheme(target, &text, scheme)),
    }

    if parsed.host_str().is_none_or(|host| host.trim().is_empty()) {
        return Err(ParseError::no_host(target, &text));
    }

    Ok(RawLink::new(text, target))
}

/// Cleans trailing punctuation that often gets captured with bare URLs.
fn clean_url_trailing(url: &str) -> &str {
    let mut result = url;

    while let Some(last) = result.chars().last() {
        match last {
            '.' | ',' | ';' | ':' | '!' | '?' | '*' | '_' => {
                result = &result[..result.len() - 1];
            }
            // Closing parens at end are usually not part of URL,
            // unless there's a matching opener (like Wikipedia URLs)
            ')' => {
                let open_count = result.chars().filter(|&c| c == '(').count();
                let close_count = result.chars().filter(|&c| c == ')').count();
                if close_count > open_count {
                    result = &result[..result.len() - 1];
                } else {
                    break;
                }
            }
            _ => break,
        }
    }

    result
}

pub(crate) fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn decode_entities(value: &str) -> String {
    value
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ok_links(body: &str) -> Vec<RawLink> {
        extract_links(body).filter_map(Result::ok).collect()
    }

    #[test]
    fn test_extract_markdown_link() {
        let links = ok_links("Intro [Read more](http://bit.ly/xyz) outro");
        assert_eq!(links, vec![RawLink::new("Read more", "http://bit.ly/xyz")]);
    }

    #[test]
    fn test_extract_preserves_document_order_across_syntaxes() {
        let body = concat!(
            "See https://first.com/a then [second](https://second.com/b)\n",
            "<p><a href=\"https://third.com/c\">third</a></p>",
        );
        let urls: Vec<_> = ok_links(body).into_iter().map(|l| l.url).collect();
        assert_eq!(
            urls,
            vec![
                "https://first.com/a",
                "https://second.com/b",
                "https://third.com/c"
            ]
        );
    }

    #[test]
    fn test_extract_does_not_deduplicate() {
        let body = "[a](https://x.com/) and [b](https://x.com/)";
        assert_eq!(ok_links(body).len(), 2);
    }

    #[test]
    fn test_extract_skips_images() {
        let body = "![logo](https://cdn.example.com/logo.png) [post](https://example.com/p)";
        let links = ok_links(body);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://example.com/p");
    }

    #[test]
    fn test_extract_linked_image_yields_outer_href() {
        let body = "[![banner](https://cdn.example.com/b.png)](https://example.com/promo)";
        let links = ok_links(body);
        assert_eq!(links, vec![RawLink::new("", "https://example.com/promo")]);
    }

    #[test]
    fn test_extract_markdown_link_with_title_and_angle_brackets() {
        let links = ok_links(r#"[Docs](<https://example.com/docs> "The docs")"#);
        assert_eq!(links, vec![RawLink::new("Docs", "https://example.com/docs")]);
    }

    #[test]
    fn test_extract_markdown_link_with_balanced_parens() {
        let links = ok_links("[wiki](https://en.wikipedia.org/wiki/URL_(disambiguation))");
        assert_eq!(
            links[0].url,
            "https://en.wikipedia.org/wiki/URL_(disambiguation)"
        );
    }

    #[test]
    fn test_extract_html_anchor_strips_inner_tags_and_entities() {
        let body = r#"<A HREF="https://example.com/?a=1&amp;b=2"><b>Tom &amp; Jerry</b></A>"#;
        let links = ok_links(body);
        assert_eq!(
            links,
            vec![RawLink::new("Tom & Jerry", "https://example.com/?a=1&b=2")]
        );
    }

    #[test]
    fn test_extract_missing_scheme_is_error() {
        let results: Vec<_> = extract_links("[home](example.com/page)").collect();
        assert_eq!(results.len(), 1);
        let err = results[0].as_ref().unwrap_err();
        assert_eq!(err.url(), "example.com/page");
        assert_eq!(err.text(), "home");
    }

    #[test]
    fn test_extract_mailto_is_error() {
        let results: Vec<_> = extract_links("[Email](mailto:editor@example.com)").collect();
        assert!(matches!(results[0], Err(ParseError::InvalidUrl { .. })));
    }

    #[test]
    fn test_extract_unmatched_bracket_is_skipped() {
        let results: Vec<_> = extract_links("[broken link(no close and some text").collect();
        assert!(results.is_empty());
    }

    #[test]
    fn test_extract_bare_url_trims_sentence_punctuation() {
        let links = ok_links("Visit https://example.com/page. Or (https://example.com/x)!");
        let urls: Vec<_> = links.into_iter().map(|l| l.url).collect();
        assert_eq!(urls, vec!["https://example.com/page", "https://example.com/x"]);
    }

    #[test]
    fn test_extract_too_long_url_is_error() {
        let body = format!("[x](https://example.com/{})", "a".repeat(2500));
        let results: Vec<_> = extract_links(&body).collect();
        assert!(matches!(results[0], Err(ParseError::UrlTooLong { .. })));
    }

    #[test]
    fn test_extract_empty_body() {
        assert_eq!(extract_links("").count(), 0);
    }

    #[test]
    fn test_clean_url_trailing_preserves_balanced_parens() {
        assert_eq!(
            clean_url_trailing("https://en.wikipedia.org/wiki/A_(b)"),
            "https://en.wikipedia.org/wiki/A_(b)"
        );
        assert_eq!(clean_url_trailing("https://a.com/x),"), "https://a.com/x");
    }
}
