use std::fmt;
use thiserror::Error;
use url::Url;

/// Locator of a viewable document. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    url: Url,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferenceParseError {
    #[error("Document reference is empty. Hint: pass the document viewer URL.")]
    Empty,
    #[error("Invalid URL '{value}': {message}. Hint: include http(s):// and ensure the URL is well-formed.")]
    InvalidUrl { value: String, message: String },
    #[error("Unsupported scheme '{scheme}' in '{value}'. Only http and https document URLs can be harvested.")]
    UnsupportedScheme { value: String, scheme: String },
}

impl DocumentRef {
    pub fn parse(value: &str) -> Result<Self, ReferenceParseError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ReferenceParseError::Empty);
        }

        let url = Url::parse(trimmed).map_err(|e| ReferenceParseError::InvalidUrl {
            value: trimmed.to_string(),
            message: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => Ok(Self { url }),
            other => Err(ReferenceParseError::UnsupportedScheme {
                value: trimmed.to_string(),
                scheme: other.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Host of the document viewer, used in log lines.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or("")
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

impl std::str::FromStr for DocumentRef {
    type Err = ReferenceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentRef::parse(s)
    }
}

/// Whether an `<img src>` value is a usable absolute page-image URL.
pub fn is_fetchable_image_url(src: &str) -> bool {
    let src = src.trim();
    if !(src.starts_with("http://") || src.starts_with("https://")) {
        return false;
    }
    Url::parse(src).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_https_document_url() {
        let doc = DocumentRef::parse("  https://www.example.com/document/434649239/Meditations ")
            .expect("valid url");
        assert_eq!(doc.host(), "www.example.com");
        assert!(doc.as_str().ends_with("/Meditations"));
    }

    #[test]
    fn rejects_empty_reference() {
        assert_eq!(DocumentRef::parse("   "), Err(ReferenceParseError::Empty));
    }

    #[test]
    fn rejects_relative_paths() {
        assert!(matches!(
            DocumentRef::parse("document/123"),
            Err(ReferenceParseError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn rejects_non_http_schemes() {
        let err = DocumentRef::parse("file:///tmp/doc.html").unwrap_err();
        assert!(matches!(err, ReferenceParseError::UnsupportedScheme { ref scheme, .. } if scheme == "file"));
    }

    #[test]
    fn image_url_filter_accepts_only_absolute_http() {
        assert!(is_fetchable_image_url("https://html.example.net/pages/1-abc.jpg"));
        assert!(is_fetchable_image_url("http://cdn.example.net/p2.jpg"));
        assert!(!is_fetchable_image_url("data:image/jpeg;base64,AAAA"));
        assert!(!is_fetchable_image_url("/pages/3.jpg"));
        assert!(!is_fetchable_image_url(""));
        assert!(!is_fetchable_image_url("https://"));
    }
}
