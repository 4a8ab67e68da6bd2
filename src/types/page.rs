//! Page-level artifacts flowing from the harvester to the assembler.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One harvested page. Identity is the position in the harvest sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageArtifact {
    /// A page image still to be fetched from the document host
    Remote { url: String },
    /// A page already captured in the browser (PNG screenshot or JPEG canvas)
    Captured { bytes: Vec<u8> },
    /// Gap marker for a page that could not be harvested
    Missing { reason: String },
}

impl PageArtifact {
    pub fn missing(reason: impl Into<String>) -> Self {
        PageArtifact::Missing {
            reason: reason.into(),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, PageArtifact::Missing { .. })
    }
}

/// A page materialized on local storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedFile {
    /// 1-based position in the harvest sequence
    pub ordinal: usize,
    pub path: PathBuf,
}

/// A page that did not make it to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageFailure {
    pub ordinal: usize,
    pub reason: String,
}

/// Outcome of materializing a harvest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchReport {
    /// Pages written to disk, in page order
    pub files: Vec<FetchedFile>,
    /// Pages that failed, in page order
    pub failures: Vec<PageFailure>,
    /// Total number of positions in the harvest
    pub total: usize,
}

impl FetchReport {
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    pub fn missing_ordinals(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.ordinal).collect()
    }
}
