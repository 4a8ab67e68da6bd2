use crate::ocr::OcrError;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::ParseError;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status} fetching {url}")]
    Http { url: String, status: StatusCode },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] ParseError),

    #[error("Browser session error: {0}")]
    Session(String),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("In-page script failed: {0}")]
    Script(String),

    #[error("Page capture failed: {0}")]
    Capture(String),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("PDF encoding error: {0}")]
    Pdf(String),

    #[error("Assembly error: {0}")]
    Assembly(String),

    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    #[error("Unrecognized document layout: {0}")]
    UnrecognizedLayout(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl HarvestError {
    pub fn session(message: impl Into<String>) -> Self {
        HarvestError::Session(message.into())
    }

    pub fn closed(operation: &str) -> Self {
        HarvestError::InvalidState(format!("{operation} called after the session was closed"))
    }

    pub fn assembly(message: impl Into<String>) -> Self {
        HarvestError::Assembly(message.into())
    }

    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            HarvestError::Io(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Check output directory paths/permissions.",
            ),
            HarvestError::Network(e) => ErrorPayload::new(
                ErrorCategory::Network,
                e.to_string(),
                "Check connectivity/proxy/VPN and retry.",
            ),
            HarvestError::Http { url, status } => ErrorPayload::new(
                ErrorCategory::Network,
                format!("HTTP {} fetching {}", status.as_u16(), url),
                "The document host refused the request; retry later or open the document in a browser first.",
            ),
            HarvestError::InvalidUrl(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Pass the full document URL including http(s)://.",
            ),
            HarvestError::Session(msg) => {
                let lower = msg.to_ascii_lowercase();
                if lower.contains("timed out") || lower.contains("timeout") {
                    ErrorPayload::new(
                        ErrorCategory::Session,
                        msg.to_string(),
                        "Try increasing --nav-timeout or check that the document page loads in a normal browser.",
                    )
                } else if lower.contains("not compiled") {
                    ErrorPayload::new(
                        ErrorCategory::Session,
                        msg.to_string(),
                        "Rebuild with the `browser` feature or use --fixture for offline runs.",
                    )
                } else {
                    ErrorPayload::new(
                        ErrorCategory::Session,
                        msg.to_string(),
                        "Install Chrome, Chromium or Edge, pass --browser PATH, or point --remote-browser at a running DevTools endpoint.",
                    )
                }
            }
            HarvestError::InvalidState(msg) => ErrorPayload::new(
                ErrorCategory::Session,
                msg.to_string(),
                "Re-run with --verbose; file an issue if persistent.",
            ),
            HarvestError::Script(msg) => ErrorPayload::new(
                ErrorCategory::Session,
                msg.to_string(),
                "The viewer markup may have changed; re-run with --verbose and --headed to inspect the page.",
            ),
            HarvestError::Capture(msg) => ErrorPayload::new(
                ErrorCategory::Capture,
                msg.to_string(),
                "Try a larger --window or --headed to inspect the page layout.",
            ),
            HarvestError::Image(e) => ErrorPayload::new(
                ErrorCategory::Assembly,
                e.to_string(),
                "Verify the page images are readable (png, jpg, gif, webp).",
            ),
            HarvestError::Pdf(msg) => ErrorPayload::new(
                ErrorCategory::Assembly,
                msg.to_string(),
                "Re-run with --verbose; file an issue if persistent.",
            ),
            HarvestError::Assembly(msg) => ErrorPayload::new(
                ErrorCategory::Assembly,
                msg.to_string(),
                "No usable page images were produced; re-run with --keep-pages --verbose to inspect them.",
            ),
            HarvestError::Ocr(e) => ErrorPayload::new(
                ErrorCategory::Ocr,
                e.to_string(),
                "Install Tesseract (e.g., `apt install tesseract-ocr`) or pass --ocr never.",
            ),
            HarvestError::UnrecognizedLayout(msg) => ErrorPayload::new(
                ErrorCategory::Layout,
                msg.to_string(),
                "Check that the URL opens a document viewer page and that the document is publicly viewable.",
            ),
            HarvestError::Serialization(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Check JSON inputs (fixtures, scripts); run with --verbose for details.",
            ),
            HarvestError::Config(msg) => ErrorPayload::new(
                ErrorCategory::Config,
                msg.to_string(),
                "Check flags/paths (e.g., --window WIDTHxHEIGHT) and the config file.",
            ),
            HarvestError::Unknown(msg) => ErrorPayload::new(
                ErrorCategory::Unknown,
                msg.to_string(),
                "Re-run with --verbose; file an issue if persistent.",
            ),
        }
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Config,
    Session,
    Network,
    Capture,
    Layout,
    Assembly,
    Ocr,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ErrorPayload {
    pub fn new(category: ErrorCategory, message: String, remediation: impl Into<String>) -> Self {
        Self {
            category,
            message,
            remediation: Some(remediation.into()),
        }
    }
}
