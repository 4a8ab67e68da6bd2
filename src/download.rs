//! Materializing harvested pages as ordinal-named files.

use crate::error::HarvestError;
use crate::progress::{Progress, Stage};
use crate::types::{FetchReport, FetchedFile, PageArtifact, PageFailure};
use crate::Result;
use image::ImageFormat;
use reqwest::header::REFERER;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(15);

/// Extension for page bytes, sniffed from their content.
pub fn sniff_extension(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "png",
        Ok(ImageFormat::Gif) => "gif",
        Ok(ImageFormat::WebP) => "webp",
        _ => "jpg",
    }
}

/// `page_001.jpg` style name; the number widens past three digits when the
/// page count needs it so names sort in page order.
pub fn page_file_name(ordinal: usize, total: usize, extension: &str) -> String {
    let width = total.max(1).to_string().len().max(3);
    format!("page_{ordinal:0width$}.{extension}")
}

/// Fetches remote pages and writes every page to disk, one at a time.
#[derive(Debug, Clone)]
pub struct Downloader {
    http: Client,
    referer: Option<String>,
    progress: Progress,
}

impl Downloader {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(HarvestError::Network)?;
        Ok(Self {
            http,
            referer: None,
            progress: Progress::silent(),
        })
    }

    /// Sends the document URL as `Referer`; some hosts refuse page images
    /// without it.
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Downloads each URL to `page_NNN.<ext>`. Failed URLs are recorded in
    /// the report, never raised.
    pub async fn fetch_all(&self, urls: &[String], output_dir: &Path) -> Result<FetchReport> {
        let artifacts: Vec<PageArtifact> = urls
            .iter()
            .map(|url| PageArtifact::Remote { url: url.clone() })
            .collect();
        self.materialize(&artifacts, output_dir).await
    }

    /// Writes every artifact to `output_dir` under its 1-based ordinal.
    ///
    /// Only failing to create the directory is an error; per-page failures
    /// land in [`FetchReport::failures`].
    pub async fn materialize(
        &self,
        artifacts: &[PageArtifact],
        output_dir: &Path,
    ) -> Result<FetchReport> {
        tokio::fs::create_dir_all(output_dir).await?;

        let total = artifacts.len();
        let mut report = FetchReport {
            total,
            ..FetchReport::default()
        };
        self.progress
            .started(Stage::Download, format!("Saving {total} pages"));

        for (index, artifact) in artifacts.iter().enumerate() {
            let ordinal = index + 1;
            match self.write_page(artifact, ordinal, total, output_dir).await {
                Ok(file) => {
                    self.progress.step(
                        Stage::Download,
                        ordinal,
                        total,
                        file.path.display().to_string(),
                    );
                    report.files.push(file);
                }
                Err(err) => {
                    warn!(page = ordinal, error = %err, "page not saved");
                    self.progress
                        .step(Stage::Download, ordinal, total, format!("failed: {err}"));
                    report.failures.push(PageFailure {
                        ordinal,
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            saved = report.files.len(),
            failed = report.failures.len(),
            "pages materialized"
        );
        self.progress.completed(
            Stage::Download,
            format!("{} of {total} pages saved", report.files.len()),
        );
        Ok(report)
    }

    async fn write_page(
        &self,
        artifact: &PageArtifact,
        ordinal: usize,
        total: usize,
        output_dir: &Path,
    ) -> Result<FetchedFile> {
        let (bytes, extension) = match artifact {
            PageArtifact::Remote { url } => {
                let bytes = self.fetch_bytes(url).await?;
                let extension = sniff_extension(&bytes);
                (bytes, extension)
            }
            PageArtifact::Captured { bytes } => (bytes.clone(), sniff_extension(bytes)),
            PageArtifact::Missing { reason } => {
                return Err(HarvestError::Capture(reason.clone()));
            }
        };

        let path = output_dir.join(page_file_name(ordinal, total, extension));
        tokio::fs::write(&path, &bytes).await?;
        Ok(FetchedFile { ordinal, path })
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let mut request = self.http.get(url);
        if let Some(referer) = &self.referer {
            request = request.header(REFERER, referer);
        }
        let response = request.send().await.map_err(HarvestError::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::Http {
                url: url.to_string(),
                status,
            });
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(HarvestError::Network)
    }
}
