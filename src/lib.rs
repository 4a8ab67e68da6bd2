//! Document Harvester Library
//!
//! Captures the pages of a document shown in a web document viewer and
//! assembles them into a PDF. Viewers serve pages either as raster images
//! or as rendered text layers; the library detects which, harvests the
//! pages the matching way and writes an image PDF, optionally with an
//! invisible OCR text layer so rendered-text documents stay searchable.
//!
//! # Module Overview
//!
//! - [`browser`] - Browser sessions (Chromium over CDP, static DOM fixtures)
//! - [`classify`] - Document-type detection from viewer markup
//! - [`harvest`] - Scrolling, page-image collection and page capture
//! - [`download`] - Writing harvested pages as ordinal-named files
//! - [`assemble`] - PDF assembly, with or without a text layer
//! - [`ocr`] - OCR engines producing positioned words
//! - [`pipeline`] - One-document extraction from reference to PDF
//! - [`config`] - Configuration file support
//! - [`output`] - JSON output schemas
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use docharvest_lib::{BrowserOptions, ChromiumLauncher, DocumentRef, Downloader};
//! use docharvest_lib::{ExtractRequest, Extractor, DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_USER_AGENT};
//!
//! # async fn example() -> docharvest_lib::Result<()> {
//! let launcher = Arc::new(ChromiumLauncher::new(BrowserOptions::default()));
//! let downloader = Downloader::new(DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_USER_AGENT)?;
//! let reference = DocumentRef::parse("https://www.example.com/document/1/title").unwrap();
//!
//! let outcome = Extractor::new(launcher, downloader)
//!     .extract(&ExtractRequest::new(reference))
//!     .await?;
//! println!(
//!     "{} of {} pages in {}",
//!     outcome.assembled_pages,
//!     outcome.total_pages,
//!     outcome.document_path.display()
//! );
//! # Ok(())
//! # }
//! ```

pub mod assemble;
pub mod browser;
pub mod classify;
pub mod config;
pub mod download;
pub mod error;
pub mod harvest;
pub mod ocr;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod reference;
pub mod types;
pub mod window;

pub use assemble::{
    assemble_images, assemble_with_text_layer, pages_for_assembly, AssemblySummary,
    MissingPagePolicy, SkippedPage,
};
pub use browser::{
    BrowserOptions, BrowserProvider, BrowserSession, ChromiumLauncher, DomFixture,
    FixtureLauncher, SessionLauncher, DEFAULT_NAVIGATION_TIMEOUT, DEFAULT_USER_AGENT,
};
pub use classify::classify;
pub use config::Config;
pub use download::{page_file_name, Downloader, DEFAULT_DOWNLOAD_TIMEOUT};
pub use error::{ErrorCategory, ErrorPayload, HarvestError, Result};
pub use harvest::{harvest, HarvestOptions, ScrollPolicy};
pub use ocr::{default_engine, OcrEngine, OcrError, OcrOptions, OcrWord, TesseractCli};
pub use output::{
    AssembleOutput, ClassifyOutput, DocharvestOutput, ErrorOutput, ExtractOutput, OUTPUT_VERSION,
};
pub use pipeline::{ExtractOutcome, ExtractRequest, Extractor, OcrMode};
pub use progress::{Progress, ProgressEvent, ProgressSink, Stage};
pub use reference::{DocumentRef, ReferenceParseError};
pub use types::{
    Bounds, Classification, FetchReport, FetchedFile, HarvestMode, MarkerCounts, PageArtifact,
    PageFailure, WindowSize,
};
