//! arXiv abstract-page rewriting and content-kind tagging.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;
use url::Url;

use super::redirect::ResolvedLink;
use crate::utils::{canonical_host, compile_static_regex};

const ARXIV_BASE_URL: &str = "https://arxiv.org";
const ARXIV_HOST: &str = "arxiv.org";
const PDF_MEDIA_TYPE: &str = "application/pdf";

static ARXIV_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"(?i)^(?:\d{4}\.\d{4,5}|[a-z\-]+(?:\.[a-z]{2})?/\d{7})(?:v\d+)?$")
});

/// What the final URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// An HTML page (the default).
    Webpage,
    /// A directly downloadable PDF.
    Pdf,
}

impl ContentKind {
    /// Stable label written into stub files.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Webpage => "webpage",
            Self::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved link after the arXiv rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformedLink {
    /// The resolution this came from.
    pub resolved: ResolvedLink,
    /// URL to persist; differs from `resolved.final_url` only for rewritten arXiv links.
    pub final_url: String,
    /// Webpage or PDF.
    pub content_kind: ContentKind,
    /// arXiv identifier, for arXiv links.
    pub arxiv_id: Option<String>,
}

/// Rewrites arXiv abstract pages to their PDF download URL.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArxivTransformer;

impl ArxivTransformer {
    /// Creates a new transformer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Transforms one resolved link. Pure and infallible.
    ///
    /// `arxiv.org/abs/<id>` becomes `https://arxiv.org/pdf/<id>` tagged `pdf`.
    /// arXiv `/pdf/<id>` URLs, any URL whose path ends in `.pdf` and any
    /// response served as `application/pdf` are tagged `pdf` unchanged;
    /// everything else is an unchanged `webpage`.
    ///
    /// # Examples
    ///
    /// ```
    /// use gmailmd_core::parser::RawLink;
    /// use gmailmd_core::resolver::{ArxivTransformer, ContentKind, ResolveStatus, ResolvedLink};
    ///
    /// let resolved = ResolvedLink {
    ///     original: RawLink::new("Paper", "https://arxiv.org/abs/2301.01234"),
    ///     final_url: "https://arxiv.org/abs/2301.01234".to_string(),
    ///     status: ResolveStatus::Resolved,
    ///     redirect_count: 0,
    ///     page_title: None,
    ///     content_type: None,
    /// };
    /// let link = ArxivTransformer::new().transform(resolved);
    /// assert_eq!(link.final_url, "https://arxiv.org/pdf/2301.01234");
    /// assert_eq!(link.content_kind, ContentKind::Pdf);
    /// ```
    #[must_use]
    pub fn transform(&self, resolved: ResolvedLink) -> TransformedLink {
        let url = resolved.final_url.clone();
        let served_as_pdf = resolved.content_type.as_deref() == Some(PDF_MEDIA_TYPE);
        let Ok(parsed) = Url::parse(&url) else {
            let kind = if served_as_pdf {
                ContentKind::Pdf
            } else {
                ContentKind::Webpage
            };
            return untouched(resolved, url, kind);
        };

        let is_arxiv = parsed
            .host_str()
            .is_some_and(|host| canonical_host(host) == ARXIV_HOST);
        let path = parsed.path();

        if is_arxiv {
            if let Some(id) = path.strip_prefix("/abs/").and_then(normalize_arxiv_id) {
                let pdf_url = format!("{ARXIV_BASE_URL}/pdf/{id}");
                debug!(from = %url, to = %pdf_url, arxiv_id = %id, "rewrote arXiv abstract link");
                return TransformedLink {
                    resolved,
                    final_url: pdf_url,
                    content_kind: ContentKind::Pdf,
                    arxiv_id: Some(id),
                };
            }
            if let Some(id) = path
                .strip_prefix("/pdf/")
                .and_then(|id| normalize_arxiv_id(strip_pdf_suffix(id)))
            {
                return TransformedLink {
                    resolved,
                    final_url: url,
                    content_kind: ContentKind::Pdf,
                    arxiv_id: Some(id),
                };
            }
        }

        let kind = if served_as_pdf || path.to_ascii_lowercase().ends_with(".pdf") {
            ContentKind::Pdf
        } else {
            ContentKind::Webpage
        };
        untouched(resolved, url, kind)
    }
}

fn untouched(resolved: ResolvedLink, final_url: String, content_kind: ContentKind) -> TransformedLink {
    TransformedLink {
        resolved,
        final_url,
        content_kind,
        arxiv_id: None,
    }
}

fn strip_pdf_suffix(value: &str) -> &str {
    value.strip_suffix(".pdf").unwrap_or(value)
}

fn normalize_arxiv_id(candidate: &str) -> Option<String> {
    let trimmed = candidate.trim().trim_matches('/');
    ARXIV_ID_RE.is_match(trimmed).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::RawLink;
    use crate::resolver::ResolveStatus;

    fn resolved(url: &str, content_type: Option<&str>) -> ResolvedLink {
        ResolvedLink {
            original: RawLink::new("", url),
            final_url: url.to_string(),
            status: ResolveStatus::Resolved,
            redirect_count: 0,
            page_title: None,
            content_type: content_type.map(ToString::to_string),
        }
    }

    fn transform(url: &str) -> TransformedLink {
        ArxivTransformer::new().transform(resolved(url, None))
    }

    #[test]
    fn test_abs_rewritten_to_pdf() {
        let link = transform("https://arxiv.org/abs/2301.01234");
        assert!(link.final_url.ends_with("/pdf/2301.01234"));
        assert_eq!(link.content_kind, ContentKind::Pdf);
        assert_eq!(link.arxiv_id.as_deref(), Some("2301.01234"));
        assert_eq!(link.resolved.final_url, "https://arxiv.org/abs/2301.01234");
    }

    #[test]
    fn test_www_host_and_version_suffix() {
        let link = transform("https://www.arxiv.org/abs/2301.01234v3");
        assert_eq!(link.final_url, "https://arxiv.org/pdf/2301.01234v3");
    }

    #[test]
    fn test_old_style_identifier() {
        let link = transform("http://arxiv.org/abs/hep-th/9901001");
        assert_eq!(link.final_url, "https://arxiv.org/pdf/hep-th/9901001");
        assert_eq!(link.arxiv_id.as_deref(), Some("hep-th/9901001"));
    }

    #[test]
    fn test_non_arxiv_host_unchanged() {
        let link = transform("https://example.com/abs/2301.01234");
        assert_eq!(link.final_url, "https://example.com/abs/2301.01234");
        assert_eq!(link.content_kind, ContentKind::Webpage);
        assert_eq!(link.arxiv_id, None);
    }

    #[test]
    fn test_invalid_arxiv_id_unchanged() {
        let link = transform("https://arxiv.org/abs/not-an-id");
        assert_eq!(link.final_url, "https://arxiv.org/abs/not-an-id");
        assert_eq!(link.content_kind, ContentKind::Webpage);
    }

    #[test]
    fn test_arxiv_pdf_tagged_without_rewrite() {
        let link = transform("https://arxiv.org/pdf/2301.01234v2.pdf");
        assert_eq!(link.final_url, "https://arxiv.org/pdf/2301.01234v2.pdf");
        assert_eq!(link.content_kind, ContentKind::Pdf);
        assert_eq!(link.arxiv_id.as_deref(), Some("2301.01234v2"));
    }

    #[test]
    fn test_pdf_content_type_detected() {
        let transformer = ArxivTransformer::new();
        let link = transformer.transform(resolved(
            "https://files.example/download?id=7",
            Some("application/pdf"),
        ));
        assert_eq!(link.content_kind, ContentKind::Pdf);
        assert_eq!(link.final_url, "https://files.example/download?id=7");
        assert_eq!(link.arxiv_id, None);

        let html = transformer.transform(resolved("https://files.example/view", Some("text/html")));
        assert_eq!(html.content_kind, ContentKind::Webpage);
    }

    #[test]
    fn test_pdf_extension_detected() {
        assert_eq!(
            transform("https://example.com/papers/Report.PDF?dl=1").content_kind,
            ContentKind::Pdf
        );
        assert_eq!(
            transform("https://example.com/pdf-guide").content_kind,
            ContentKind::Webpage
        );
    }
}
