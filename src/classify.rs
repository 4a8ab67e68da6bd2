//! Document-type classification from viewer markup.

use crate::browser::{close_quietly, run_script_as, scripts, BrowserSession, SessionLauncher};
use crate::harvest::{prepare_document, HarvestOptions};
use crate::progress::{Progress, Stage};
use crate::reference::DocumentRef;
use crate::types::{Classification, MarkerCounts};
use crate::Result;
use tokio::time::sleep;
use tracing::{info, warn};

/// Opens a session, counts layout markers and closes the session.
///
/// Never fails: an unreachable page, a failing script or a page without
/// markers all classify as [`Classification::Unknown`].
pub async fn classify(
    launcher: &dyn SessionLauncher,
    reference: &DocumentRef,
    options: &HarvestOptions,
    progress: &Progress,
) -> Classification {
    progress.started(Stage::Classify, format!("Inspecting {reference}"));

    let mut session = match launcher.open(reference).await {
        Ok(session) => session,
        Err(err) => {
            warn!(error = %err, "could not open document for classification");
            progress.failed(Stage::Classify, err.to_string());
            return Classification::Unknown;
        }
    };

    let counts = count_markers(session.as_mut(), options).await;
    close_quietly(session.as_mut()).await;

    match counts {
        Ok(counts) => {
            let classification = Classification::from_counts(counts);
            info!(
                text_layers = counts.text_layers,
                image_pages = counts.image_pages,
                %classification,
                "document classified"
            );
            progress.completed(Stage::Classify, format!("Document type: {classification}"));
            classification
        }
        Err(err) => {
            warn!(error = %err, "marker count failed");
            progress.failed(Stage::Classify, format!("marker count failed: {err}"));
            Classification::Unknown
        }
    }
}

/// Prepares the document and counts text-layer and page-image markers.
pub async fn count_markers(
    session: &mut dyn BrowserSession,
    options: &HarvestOptions,
) -> Result<MarkerCounts> {
    prepare_document(session, options).await?;
    if !options.scroll.settle.is_zero() {
        sleep(options.scroll.settle).await;
    }
    run_script_as(session, scripts::COUNT_MARKERS).await
}
