//! One-document extraction: classify, harvest, download, assemble.

use crate::assemble::{
    assemble_images, assemble_with_text_layer, pages_for_assembly, AssemblySummary,
    MissingPagePolicy,
};
use crate::browser::SessionLauncher;
use crate::classify::classify;
use crate::download::Downloader;
use crate::harvest::{harvest, HarvestOptions};
use crate::ocr::{default_engine, OcrEngine, OcrError, OcrOptions};
use crate::progress::{Progress, Stage};
use crate::reference::DocumentRef;
use crate::types::{Classification, FetchReport, HarvestMode, PageFailure};
use crate::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// When the assembled document gets an OCR text layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrMode {
    /// Rendered-text documents, when an engine is available
    #[default]
    Auto,
    /// Every document; fails before harvesting if no engine is available
    Always,
    Never,
}

impl std::str::FromStr for OcrMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(OcrMode::Auto),
            "always" => Ok(OcrMode::Always),
            "never" | "off" => Ok(OcrMode::Never),
            other => Err(format!(
                "unknown OCR mode '{other}' (expected auto, always or never)"
            )),
        }
    }
}

/// What to extract and where to put it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractRequest {
    pub reference: DocumentRef,
    pub output_dir: PathBuf,
    /// File stem of the assembled document
    pub base_name: String,
    /// Keep the page images after assembly
    pub keep_intermediate: bool,
    pub ocr_mode: OcrMode,
    pub missing_pages: MissingPagePolicy,
}

impl ExtractRequest {
    pub fn new(reference: DocumentRef) -> Self {
        Self {
            reference,
            output_dir: PathBuf::from("output"),
            base_name: "document".to_string(),
            keep_intermediate: false,
            ocr_mode: OcrMode::default(),
            missing_pages: MissingPagePolicy::default(),
        }
    }

    pub fn document_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.pdf", self.base_name))
    }

    /// Directory the page images are written to.
    pub fn pages_dir(&self) -> PathBuf {
        self.output_dir.join(format!("{}_pages", self.base_name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractOutcome {
    pub document_path: PathBuf,
    pub classification: Classification,
    /// Positions produced by the harvest, including gaps
    pub total_pages: usize,
    /// Pages in the written document
    pub assembled_pages: usize,
    /// 1-based positions that never reached disk
    pub missing_ordinals: Vec<usize>,
    pub failures: Vec<PageFailure>,
    pub text_layer_pages: usize,
    /// Where the page images were left, when kept
    pub pages_dir: Option<PathBuf>,
    pub assembly: AssemblySummary,
}

/// Runs [`ExtractRequest`]s against one browser backend.
pub struct Extractor {
    launcher: Arc<dyn SessionLauncher>,
    downloader: Downloader,
    harvest_options: HarvestOptions,
    ocr_options: OcrOptions,
    ocr_engine: Option<Arc<dyn OcrEngine>>,
    progress: Progress,
}

impl Extractor {
    pub fn new(launcher: Arc<dyn SessionLauncher>, downloader: Downloader) -> Self {
        Self {
            launcher,
            downloader,
            harvest_options: HarvestOptions::default(),
            ocr_options: OcrOptions::default(),
            ocr_engine: None,
            progress: Progress::silent(),
        }
    }

    pub fn with_harvest_options(mut self, options: HarvestOptions) -> Self {
        self.harvest_options = options;
        self
    }

    pub fn with_ocr_options(mut self, options: OcrOptions) -> Self {
        self.ocr_options = options;
        self
    }

    /// Uses `engine` instead of probing the machine for one.
    pub fn with_ocr_engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.ocr_engine = Some(engine);
        self
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.downloader = self.downloader.with_progress(progress.clone());
        self.progress = progress;
        self
    }

    fn resolve_engine(&self) -> Option<Arc<dyn OcrEngine>> {
        if let Some(engine) = &self.ocr_engine {
            return Some(Arc::clone(engine));
        }
        default_engine(&self.ocr_options).map(Arc::from)
    }

    /// Full pipeline for one document.
    ///
    /// Fails with [`HarvestError::UnrecognizedLayout`] without opening a
    /// harvest session when the document cannot be classified.
    pub async fn extract(&self, request: &ExtractRequest) -> Result<ExtractOutcome> {
        let reference = &request.reference;
        info!(url = %reference, "extracting document");

        let classification = classify(
            self.launcher.as_ref(),
            reference,
            &self.harvest_options,
            &self.progress,
        )
        .await;
        let Some(mode) = classification.mode() else {
            return Err(HarvestError::UnrecognizedLayout(format!(
                "no text layers or page images found at {reference}"
            )));
        };

        let engine = self.text_layer_engine(request.ocr_mode, mode)?;

        let artifacts = harvest(
            self.launcher.as_ref(),
            reference,
            mode,
            &self.harvest_options,
            &self.progress,
        )
        .await?;

        let pages_dir = request.pages_dir();
        let downloader = self.downloader.clone().with_referer(reference.as_str());
        let report = downloader.materialize(&artifacts, &pages_dir).await?;

        let assembled = self.assemble(request, &report, &pages_dir, engine.as_deref());

        let keep = request.keep_intermediate;
        if keep {
            info!(dir = %pages_dir.display(), "page images kept");
        } else {
            self.cleanup(&pages_dir);
        }

        let assembly = assembled?;
        Ok(ExtractOutcome {
            document_path: assembly.output.clone(),
            classification,
            total_pages: report.total,
            assembled_pages: assembly.pages,
            missing_ordinals: report.missing_ordinals(),
            failures: report.failures,
            text_layer_pages: assembly.text_layer_pages,
            pages_dir: keep.then_some(pages_dir),
            assembly,
        })
    }

    /// Engine for the text layer, or `None` for an image-only document.
    fn text_layer_engine(
        &self,
        ocr_mode: OcrMode,
        mode: HarvestMode,
    ) -> Result<Option<Arc<dyn OcrEngine>>> {
        match ocr_mode {
            OcrMode::Never => Ok(None),
            OcrMode::Always => self
                .resolve_engine()
                .map(Some)
                .ok_or(HarvestError::Ocr(OcrError::NotAvailable)),
            OcrMode::Auto if mode == HarvestMode::RenderedText => {
                let engine = self.resolve_engine();
                if engine.is_none() {
                    warn!("no OCR engine available; rendered text pages will not be searchable");
                }
                Ok(engine)
            }
            OcrMode::Auto => Ok(None),
        }
    }

    fn assemble(
        &self,
        request: &ExtractRequest,
        report: &FetchReport,
        pages_dir: &Path,
        engine: Option<&dyn OcrEngine>,
    ) -> Result<AssemblySummary> {
        let output = request.document_path();
        self.progress.started(
            Stage::Assemble,
            format!("Writing {}", output.display()),
        );

        let result = pages_for_assembly(report, request.missing_pages, pages_dir).and_then(
            |paths| match engine {
                Some(engine) => {
                    assemble_with_text_layer(&paths, &output, engine, self.ocr_options.upscale)
                }
                None => assemble_images(&paths, &output),
            },
        );

        match &result {
            Ok(summary) => self.progress.completed(
                Stage::Assemble,
                format!("{} pages written to {}", summary.pages, output.display()),
            ),
            Err(err) => self.progress.failed(Stage::Assemble, err.to_string()),
        }
        result
    }

    fn cleanup(&self, pages_dir: &Path) {
        match fs::remove_dir_all(pages_dir) {
            Ok(()) => {
                debug!(dir = %pages_dir.display(), "page images removed");
                self.progress.completed(Stage::Cleanup, "Intermediate pages removed");
            }
            Err(err) => {
                warn!(dir = %pages_dir.display(), error = %err, "could not remove page images");
                self.progress.failed(Stage::Cleanup, err.to_string());
            }
        }
    }
}
