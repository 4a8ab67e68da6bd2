//! OCR (Optical Character Recognition) of page images.
//!
//! Engines return positioned words in the pixel space of the image they were
//! given. Two engines are provided:
//!
//! - [`TesseractCli`] runs the `tesseract` binary and parses its hOCR output
//! - `LeptessEngine` links libtesseract in-process (requires the `ocr` feature)
//!
//! # Feature Flag
//!
//! The in-process engine requires the `ocr` feature flag:
//!
//! ```toml
//! [dependencies]
//! docharvest = { version = "0.1", features = ["ocr"] }
//! ```
//!
//! # System Requirements
//!
//! - Tesseract OCR must be installed on the system
//! - The `tessdata` directory must be accessible (typically at `/usr/share/tesseract-ocr/tessdata`
//!   or set via `TESSDATA_PREFIX` environment variable)

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Failed to initialize OCR engine: {0}")]
    InitError(String),
    #[error("Failed to load image for OCR: {0}")]
    ImageLoadError(String),
    #[error("OCR processing failed: {0}")]
    ProcessingError(String),
    #[error("Tesseract not available - install Tesseract OCR or enable the 'ocr' feature")]
    NotAvailable,
}

/// Options for OCR text extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrOptions {
    /// Language code for Tesseract (default: "eng")
    pub language: String,
    /// Page images are enlarged by this factor before recognition
    pub upscale: u32,
    /// Words below this confidence (0.0 - 1.0) are dropped
    pub min_confidence: f32,
    /// Path or name of the tesseract binary
    pub tesseract_binary: String,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            upscale: 2,
            min_confidence: 0.0,
            tesseract_binary: "tesseract".to_string(),
        }
    }
}

/// A recognized word, in pixels of the recognized image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrWord {
    pub text: String,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    /// 0.0 - 1.0 when the engine reports it
    pub confidence: Option<f32>,
}

/// Image to positioned words.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_available(&self) -> bool;

    fn recognize(&self, image_path: &Path) -> Result<Vec<OcrWord>, OcrError>;
}

/// Parses Tesseract hOCR into words, skipping blank and malformed entries.
pub fn parse_hocr(hocr: &str) -> Result<Vec<OcrWord>, OcrError> {
    let selector = Selector::parse("span.ocrx_word")
        .map_err(|e| OcrError::ProcessingError(format!("hOCR selector: {e:?}")))?;
    let document = Html::parse_document(hocr);

    let mut words = Vec::new();
    for node in document.select(&selector) {
        let text: String = node.text().collect::<String>().trim().to_string();
        if text.is_empty() {
            continue;
        }
        let Some(title) = node.value().attr("title") else {
            continue;
        };
        let Some((x0, y0, x1, y1)) = title_bbox(title) else {
            debug!(title, "hOCR word without a usable bbox");
            continue;
        };
        words.push(OcrWord {
            text,
            left: x0,
            top: y0,
            width: x1.saturating_sub(x0),
            height: y1.saturating_sub(y0),
            confidence: title_confidence(title),
        });
    }
    Ok(words)
}

/// `bbox x0 y0 x1 y1` from an hOCR title attribute.
fn title_bbox(title: &str) -> Option<(u32, u32, u32, u32)> {
    let bbox = title
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("bbox "))?;
    let coords: Vec<u32> = bbox
        .split_whitespace()
        .map(|v| v.parse().ok())
        .collect::<Option<Vec<_>>>()?;
    match coords.as_slice() {
        [x0, y0, x1, y1] if x1 > x0 && y1 > y0 => Some((*x0, *y0, *x1, *y1)),
        _ => None,
    }
}

fn title_confidence(title: &str) -> Option<f32> {
    title
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("x_wconf "))
        .and_then(|v| v.trim().parse::<f32>().ok())
        .map(|v| (v / 100.0).clamp(0.0, 1.0))
}

fn keep_confident(words: Vec<OcrWord>, min_confidence: f32) -> Vec<OcrWord> {
    if min_confidence <= 0.0 {
        return words;
    }
    words
        .into_iter()
        .filter(|w| w.confidence.map_or(true, |c| c >= min_confidence))
        .collect()
}

fn check_binary(name: &str) -> bool {
    Command::new(name)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Tesseract via its command-line interface.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    options: OcrOptions,
}

impl TesseractCli {
    pub fn new(options: OcrOptions) -> Self {
        Self { options }
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new(OcrOptions::default())
    }
}

impl OcrEngine for TesseractCli {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        check_binary(&self.options.tesseract_binary)
    }

    fn recognize(&self, image_path: &Path) -> Result<Vec<OcrWord>, OcrError> {
        if !image_path.is_file() {
            return Err(OcrError::ImageLoadError(format!(
                "{} does not exist",
                image_path.display()
            )));
        }

        let output = Command::new(&self.options.tesseract_binary)
            .arg(image_path)
            .arg("stdout")
            .args(["-l", &self.options.language])
            .arg("hocr")
            .output();

        match output {
            Ok(output) if output.status.success() => {
                let hocr = String::from_utf8_lossy(&output.stdout);
                Ok(keep_confident(parse_hocr(&hocr)?, self.options.min_confidence))
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(OcrError::ProcessingError(format!(
                    "tesseract failed: {}",
                    stderr.trim()
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(OcrError::NotAvailable),
            Err(e) => Err(OcrError::InitError(e.to_string())),
        }
    }
}

/// Tesseract linked in-process through `leptess`.
#[cfg(feature = "ocr")]
#[derive(Debug, Clone)]
pub struct LeptessEngine {
    options: OcrOptions,
}

#[cfg(feature = "ocr")]
impl LeptessEngine {
    pub fn new(options: OcrOptions) -> Self {
        Self { options }
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for LeptessEngine {
    fn name(&self) -> &'static str {
        "leptess"
    }

    fn is_available(&self) -> bool {
        leptess::LepTess::new(None, &self.options.language).is_ok()
    }

    fn recognize(&self, image_path: &Path) -> Result<Vec<OcrWord>, OcrError> {
        use leptess::LepTess;

        let mut lt = LepTess::new(None, &self.options.language)
            .map_err(|e| OcrError::InitError(format!("{:?}", e)))?;

        lt.set_image(image_path)
            .map_err(|e| OcrError::ImageLoadError(format!("{:?}", e)))?;

        let hocr = lt
            .get_hocr_text(0)
            .map_err(|e| OcrError::ProcessingError(e.to_string()))?;

        Ok(keep_confident(parse_hocr(&hocr)?, self.options.min_confidence))
    }
}

/// First available engine: in-process when compiled in, else the CLI.
pub fn default_engine(options: &OcrOptions) -> Option<Box<dyn OcrEngine>> {
    #[cfg(feature = "ocr")]
    {
        let engine = LeptessEngine::new(options.clone());
        if engine.is_available() {
            return Some(Box::new(engine));
        }
    }

    let cli = TesseractCli::new(options.clone());
    if cli.is_available() {
        return Some(Box::new(cli));
    }
    None
}
