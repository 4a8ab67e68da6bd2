use crate::assemble::{AssemblySummary, SkippedPage};
use crate::error::ErrorPayload;
use crate::pipeline::ExtractOutcome;
use crate::types::{Classification, HarvestMode, PageFailure};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Schema version for output payloads.
pub const OUTPUT_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum DocharvestOutput {
    Extract(ExtractOutput),
    Classify(ClassifyOutput),
    Assemble(AssembleOutput),
    Error(ErrorOutput),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractOutput {
    pub version: String,
    pub url: String,
    pub classification: Classification,
    pub document_path: PathBuf,
    pub total_pages: usize,
    pub assembled_pages: usize,
    pub missing_ordinals: Vec<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<PageFailure>,
    pub text_layer_pages: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ocr_failures: Vec<SkippedPage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages_dir: Option<PathBuf>,
}

impl ExtractOutput {
    pub fn from_outcome(url: &str, outcome: ExtractOutcome) -> Self {
        Self {
            version: OUTPUT_VERSION.to_string(),
            url: url.to_string(),
            classification: outcome.classification,
            document_path: outcome.document_path,
            total_pages: outcome.total_pages,
            assembled_pages: outcome.assembled_pages,
            missing_ordinals: outcome.missing_ordinals,
            failures: outcome.failures,
            text_layer_pages: outcome.text_layer_pages,
            ocr_failures: outcome.assembly.ocr_failures,
            pages_dir: outcome.pages_dir,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyOutput {
    pub version: String,
    pub url: String,
    pub classification: Classification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub harvest_mode: Option<HarvestMode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssembleOutput {
    pub version: String,
    pub document_path: PathBuf,
    pub inputs: usize,
    pub pages: usize,
    pub text_layer_pages: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedPage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ocr_failures: Vec<SkippedPage>,
}

impl AssembleOutput {
    pub fn from_summary(inputs: usize, summary: AssemblySummary) -> Self {
        Self {
            version: OUTPUT_VERSION.to_string(),
            document_path: summary.output,
            inputs,
            pages: summary.pages,
            text_layer_pages: summary.text_layer_pages,
            skipped: summary.skipped,
            ocr_failures: summary.ocr_failures,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOutput {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub error: ErrorPayload,
}
