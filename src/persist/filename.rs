//! Title derivation and filesystem-safe naming for link stubs.

use std::path::{Path, PathBuf};

use url::Url;

use crate::resolver::TransformedLink;

/// Maximum characters kept from a sanitized title.
pub const MAX_TITLE_CHARS: usize = 120;

/// Maximum UTF-8 bytes kept from a sanitized title.
///
/// File names are limited to 255 bytes; this leaves room for `_NNN.md`.
pub const MAX_TITLE_BYTES: usize = 200;

/// Maximum characters of the URL-derived fallback title.
const MAX_URL_TITLE_CHARS: usize = 80;

/// Title used when nothing usable remains after sanitizing.
const FALLBACK_TITLE: &str = "link";

/// Largest numeric suffix tried before giving up on a title.
pub(crate) const MAX_NAME_SUFFIX: usize = 999;

/// Chooses the display title for a link.
///
/// Link text wins; then the page `<title>` if one was already fetched; then
/// the URL's host and path, truncated.
#[must_use]
pub fn derive_title(link: &TransformedLink) -> String {
    let text = link.resolved.original.text.trim();
    if !text.is_empty() {
        return text.to_string();
    }
    if let Some(title) = link
        .resolved
        .page_title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return title.to_string();
    }
    title_from_url(&link.final_url)
}

fn title_from_url(url: &str) -> String {
    let compact = match Url::parse(url) {
        Ok(parsed) => format!(
            "{}{}",
            parsed.host_str().unwrap_or_default(),
            parsed.path().trim_end_matches('/')
        ),
        Err(_) => url.to_string(),
    };
    truncate_chars(&compact, MAX_URL_TITLE_CHARS).to_string()
}

/// Makes a title safe to use as a file stem.
///
/// Invalid path characters and control characters become `_`, whitespace is
/// collapsed, leading/trailing dots and spaces are trimmed, and the result is
/// capped at [`MAX_TITLE_CHARS`] characters and [`MAX_TITLE_BYTES`] bytes
/// on a char boundary. Falls back to `link`.
///
/// # Examples
///
/// ```
/// use gmailmd_core::persist::sanitize_title;
///
/// assert_eq!(sanitize_title("AI: What's next?"), "AI_ What's next_");
/// assert_eq!(sanitize_title(" ... "), "link");
/// ```
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() && !c.is_whitespace() => '_',
            c => c,
        })
        .collect();

    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = trim_dots_and_spaces(&collapsed);
    let capped = trim_dots_and_spaces(truncate_bytes(
        truncate_chars(trimmed, MAX_TITLE_CHARS),
        MAX_TITLE_BYTES,
    ));

    if capped.is_empty() || capped.chars().all(|c| c == '_') {
        FALLBACK_TITLE.to_string()
    } else {
        capped.to_string()
    }
}

/// Candidate stub path for `stem`; `suffix` 0 is the bare name, then `_1`, `_2`, ...
pub(crate) fn candidate_path(dir: &Path, stem: &str, suffix: usize) -> PathBuf {
    if suffix == 0 {
        dir.join(format!("{stem}.md"))
    } else {
        dir.join(format!("{stem}_{suffix}.md"))
    }
}

fn trim_dots_and_spaces(value: &str) -> &str {
    value.trim_matches(|c: char| c == '.' || c.is_whitespace())
}

fn truncate_chars(value: &str, max: usize) -> &str {
    match value.char_indices().nth(max) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

fn truncate_bytes(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
