//! Page harvesting.
//!
//! Drives a [`BrowserSession`] through the viewer choreography (suppress
//! overlays, scroll to materialize lazy pages, reveal every page container)
//! and turns each container into a [`PageArtifact`], in DOM order.

use crate::browser::{
    close_quietly, run_script_as, scripts, BrowserSession, ElementHandle, SessionLauncher,
};
use crate::progress::{Progress, Stage};
use crate::reference::{is_fetchable_image_url, DocumentRef};
use crate::types::{HarvestMode, PageArtifact};
use crate::{HarvestError, Result};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Incremental scroll parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollPolicy {
    /// Pixels advanced per step.
    pub step: u64,
    /// Pause after each step.
    #[serde(with = "humantime_serde")]
    pub pause: Duration,
    /// Hard cap on steps for pages whose height never stabilizes.
    pub max_steps: usize,
    /// Pause after the final scroll to the bottom.
    #[serde(with = "humantime_serde")]
    pub settle: Duration,
}

impl Default for ScrollPolicy {
    fn default() -> Self {
        Self {
            step: 500,
            pause: Duration::from_millis(200),
            max_steps: 1000,
            settle: Duration::from_secs(1),
        }
    }
}

/// How a scroll pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollOutcome {
    pub steps: usize,
    /// Last measured scroll height.
    pub height: u64,
    /// True when the step cap stopped the loop.
    pub capped: bool,
}

/// Timing of the harvest choreography.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarvestOptions {
    pub scroll: ScrollPolicy,
    /// Pause after removing overlays and page chrome.
    pub overlay_pause: Duration,
    /// Pause after scrolling every page container into view.
    pub reveal_pause: Duration,
    /// Pause between aligning a page and capturing it.
    pub capture_pause: Duration,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            scroll: ScrollPolicy::default(),
            overlay_pause: Duration::from_millis(500),
            reveal_pause: Duration::from_secs(1),
            capture_pause: Duration::from_millis(100),
        }
    }
}

impl HarvestOptions {
    /// Same choreography with every pause removed.
    pub fn without_pauses() -> Self {
        Self {
            scroll: ScrollPolicy {
                pause: Duration::ZERO,
                settle: Duration::ZERO,
                ..ScrollPolicy::default()
            },
            overlay_pause: Duration::ZERO,
            reveal_pause: Duration::ZERO,
            capture_pause: Duration::ZERO,
        }
    }
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        sleep(duration).await;
    }
}

async fn read_scroll_height(session: &mut dyn BrowserSession) -> Result<u64> {
    let value = session.run_script(scripts::SCROLL_HEIGHT).await?;
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|h| h.is_finite() && *h >= 0.0).map(|h| h as u64))
        .ok_or_else(|| HarvestError::Script(format!("scroll height is not a number: {value}")))
}

/// Scrolls from the top in fixed steps until the position reaches the
/// re-measured document height, or the step cap is hit.
pub async fn scroll_to_bottom(
    session: &mut dyn BrowserSession,
    policy: &ScrollPolicy,
) -> Result<ScrollOutcome> {
    let step = policy.step.max(1);
    let mut height = read_scroll_height(session).await?;
    let mut position = 0u64;
    let mut steps = 0usize;
    let mut capped = false;

    while position < height {
        if steps >= policy.max_steps {
            warn!(
                steps,
                height,
                "scroll step cap reached before the page stabilized"
            );
            capped = true;
            break;
        }
        session.run_script(&scripts::scroll_to(position)).await?;
        position = position.saturating_add(step);
        steps += 1;
        pause(policy.pause).await;
        height = read_scroll_height(session).await?;
    }

    session.run_script(scripts::SCROLL_TO_BOTTOM).await?;
    pause(policy.settle).await;
    debug!(steps, height, capped, "scroll pass finished");
    Ok(ScrollOutcome {
        steps,
        height,
        capped,
    })
}

/// Stops pending loads, removes overlays, then scrolls the whole document.
pub(crate) async fn prepare_document(
    session: &mut dyn BrowserSession,
    options: &HarvestOptions,
) -> Result<ScrollOutcome> {
    session.run_script(scripts::SUPPRESS_OVERLAYS).await?;
    pause(options.overlay_pause).await;
    scroll_to_bottom(session, &options.scroll).await
}

/// Opens a session, harvests every page, and closes the session on every
/// exit path.
pub async fn harvest(
    launcher: &dyn SessionLauncher,
    reference: &DocumentRef,
    mode: HarvestMode,
    options: &HarvestOptions,
    progress: &Progress,
) -> Result<Vec<PageArtifact>> {
    progress.started(Stage::Harvest, format!("Opening {reference}"));
    let mut session = match launcher.open(reference).await {
        Ok(session) => session,
        Err(err) => {
            progress.failed(Stage::Harvest, err.to_string());
            return Err(err);
        }
    };

    let result = harvest_in_session(session.as_mut(), mode, options, progress).await;
    close_quietly(session.as_mut()).await;

    match &result {
        Ok(pages) => {
            let missing = pages.iter().filter(|p| p.is_missing()).count();
            progress.completed(
                Stage::Harvest,
                format!("{} pages harvested, {missing} missing", pages.len()),
            );
        }
        Err(err) => progress.failed(Stage::Harvest, err.to_string()),
    }
    result
}

/// Harvest choreography on an already open session. The caller owns closing.
pub async fn harvest_in_session(
    session: &mut dyn BrowserSession,
    mode: HarvestMode,
    options: &HarvestOptions,
    progress: &Progress,
) -> Result<Vec<PageArtifact>> {
    prepare_document(session, options).await?;

    if mode == HarvestMode::RenderedText {
        match run_script_as::<u64>(session, scripts::STRIP_PAGE_CHROME).await {
            Ok(removed) => debug!(removed, "page chrome stripped"),
            Err(err @ HarvestError::InvalidState(_)) => return Err(err),
            Err(err) => warn!(error = %err, "could not strip page chrome"),
        }
        pause(options.overlay_pause).await;
    }

    session.run_script(scripts::REVEAL_PAGES).await?;
    pause(options.reveal_pause).await;

    let pages = session.query(scripts::PAGE_CONTAINER_SELECTOR).await?;
    info!(pages = pages.len(), mode = ?mode, "page containers found");

    match mode {
        HarvestMode::ImageScan => collect_image_urls(session, &pages, progress).await,
        HarvestMode::RenderedText => capture_pages(session, &pages, options, progress).await,
    }
}

async fn collect_image_urls(
    session: &mut dyn BrowserSession,
    pages: &[ElementHandle],
    progress: &Progress,
) -> Result<Vec<PageArtifact>> {
    let total = pages.len();
    let mut artifacts = Vec::with_capacity(total);

    for (index, page) in pages.iter().enumerate() {
        let ordinal = index + 1;
        match page_image_urls(session, *page).await {
            Ok(urls) if !urls.is_empty() => {
                artifacts.extend(urls.into_iter().map(|url| PageArtifact::Remote { url }));
                progress.step(Stage::Harvest, ordinal, total, "page image located");
            }
            Ok(_) => match canvas_image(session, *page).await {
                Ok(Some(bytes)) => {
                    debug!(page = ordinal, "page exported from its canvas");
                    artifacts.push(PageArtifact::Captured { bytes });
                    progress.step(Stage::Harvest, ordinal, total, "page canvas exported");
                }
                Ok(None) => {
                    warn!(
                        page = ordinal,
                        "page container has no fetchable image or canvas"
                    );
                    artifacts.push(PageArtifact::missing("no fetchable page image or canvas"));
                    progress.step(Stage::Harvest, ordinal, total, "no fetchable page image");
                }
                Err(err) => {
                    warn!(page = ordinal, error = %err, "canvas export failed");
                    artifacts.push(PageArtifact::missing(err.to_string()));
                    progress.step(Stage::Harvest, ordinal, total, "canvas export failed");
                }
            },
            Err(err) => {
                warn!(page = ordinal, error = %err, "could not read page images");
                artifacts.push(PageArtifact::missing(err.to_string()));
                progress.step(Stage::Harvest, ordinal, total, "page images unreadable");
            }
        }
    }
    Ok(artifacts)
}

async fn page_image_urls(
    session: &mut dyn BrowserSession,
    page: ElementHandle,
) -> Result<Vec<String>> {
    let images = session.query_within(page, scripts::PAGE_IMAGE_SELECTOR).await?;
    let mut urls = Vec::new();
    for image in images {
        match session.attribute(image, "src").await? {
            Some(src) if is_fetchable_image_url(&src) => urls.push(src.trim().to_string()),
            Some(src) => debug!(src = %src, "skipping non-http page image"),
            None => {}
        }
    }
    Ok(urls)
}

/// JPEG bytes of the page's `canvas`, or `None` when it has none.
async fn canvas_image(
    session: &mut dyn BrowserSession,
    page: ElementHandle,
) -> Result<Option<Vec<u8>>> {
    match session.call_function(page, scripts::CANVAS_DATA_URL).await? {
        Value::Null => Ok(None),
        Value::String(url) => decode_image_data_url(&url).map(Some),
        other => Err(HarvestError::Script(format!("canvas export returned {other}"))),
    }
}

/// Payload of a base64 `data:image/...` URL.
fn decode_image_data_url(url: &str) -> Result<Vec<u8>> {
    let (header, payload) = url
        .split_once(',')
        .ok_or_else(|| HarvestError::Capture("canvas data URL has no payload".into()))?;
    if !header.starts_with("data:image/") || !header.ends_with(";base64") {
        return Err(HarvestError::Capture(format!("unsupported canvas data URL header {header}")));
    }
    let bytes = BASE64_STANDARD
        .decode(payload.trim())
        .map_err(|e| HarvestError::Capture(format!("canvas data URL: {e}")))?;
    if bytes.is_empty() {
        return Err(HarvestError::Capture("canvas data URL is empty".into()));
    }
    Ok(bytes)
}

async fn capture_pages(
    session: &mut dyn BrowserSession,
    pages: &[ElementHandle],
    options: &HarvestOptions,
    progress: &Progress,
) -> Result<Vec<PageArtifact>> {
    let total = pages.len();
    let mut artifacts = Vec::with_capacity(total);

    for (index, page) in pages.iter().enumerate() {
        let ordinal = index + 1;
        let artifact = match capture_page(session, *page, options).await {
            Ok(bytes) => PageArtifact::Captured { bytes },
            Err(err) => {
                warn!(page = ordinal, error = %err, "page capture failed");
                PageArtifact::missing(err.to_string())
            }
        };
        let detail = if artifact.is_missing() {
            "capture failed"
        } else {
            "page captured"
        };
        progress.step(Stage::Harvest, ordinal, total, detail);
        artifacts.push(artifact);
    }
    Ok(artifacts)
}

/// Region capture of the page's bounding box, falling back to an element
/// capture.
async fn capture_page(
    session: &mut dyn BrowserSession,
    page: ElementHandle,
    options: &HarvestOptions,
) -> Result<Vec<u8>> {
    let region_error = match capture_page_region(session, page, options).await {
        Ok(png) => return Ok(png),
        Err(err) => err,
    };
    if matches!(region_error, HarvestError::InvalidState(_)) {
        return Err(region_error);
    }
    debug!(error = %region_error, "region capture failed, falling back to element capture");

    session.capture_element(page).await.map_err(|element_error| {
        HarvestError::Capture(format!(
            "region capture failed ({region_error}); element capture failed ({element_error})"
        ))
    })
}

async fn capture_page_region(
    session: &mut dyn BrowserSession,
    page: ElementHandle,
    options: &HarvestOptions,
) -> Result<Vec<u8>> {
    session.scroll_into_view(page).await?;
    pause(options.capture_pause).await;
    let bounds = session.bounding_box(page).await?;
    if !bounds.is_well_formed() {
        return Err(HarvestError::Capture(format!(
            "malformed bounding box {bounds:?}"
        )));
    }
    session.capture_region(bounds).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{DomFixture, FixtureLauncher, FixturePage};
    use crate::types::Bounds;

    fn reference() -> DocumentRef {
        DocumentRef::parse("https://viewer.example.com/document/42/report").unwrap()
    }

    fn page_at(y: f64) -> FixturePage {
        FixturePage {
            bounds: Some(Bounds {
                x: 0.0,
                y,
                width: 40.0,
                height: 60.0,
            }),
            ..FixturePage::default()
        }
    }

    #[tokio::test]
    async fn scroll_stops_once_height_converges() {
        let launcher = FixtureLauncher::new(DomFixture {
            scroll_heights: vec![1000, 1500, 2000, 2000],
            ..DomFixture::default()
        });
        let mut session = launcher.open(&reference()).await.unwrap();
        let outcome = scroll_to_bottom(session.as_mut(), &HarvestOptions::without_pauses().scroll)
            .await
            .unwrap();

        assert_eq!(outcome.steps, 4);
        assert_eq!(outcome.height, 2000);
        assert!(!outcome.capped);
        assert_eq!(launcher.journal().scroll_positions, vec![0, 500, 1000, 1500]);
        assert!(launcher.journal().ran(scripts::SCROLL_TO_BOTTOM));
    }

    #[tokio::test]
    async fn scroll_respects_step_cap_when_height_keeps_growing() {
        let heights: Vec<u64> = (1..=50).map(|i| i * 1000).collect();
        let launcher = FixtureLauncher::new(DomFixture {
            scroll_heights: heights,
            ..DomFixture::default()
        });
        let policy = ScrollPolicy {
            max_steps: 7,
            ..HarvestOptions::without_pauses().scroll
        };
        let mut session = launcher.open(&reference()).await.unwrap();
        let outcome = scroll_to_bottom(session.as_mut(), &policy).await.unwrap();

        assert_eq!(outcome.steps, 7);
        assert!(outcome.capped);
        assert_eq!(launcher.journal().scroll_positions.len(), 7);
    }

    #[tokio::test]
    async fn empty_document_needs_no_steps() {
        let launcher = FixtureLauncher::new(DomFixture::default());
        let mut session = launcher.open(&reference()).await.unwrap();
        let outcome = scroll_to_bottom(session.as_mut(), &HarvestOptions::without_pauses().scroll)
            .await
            .unwrap();
        assert_eq!(outcome.steps, 0);
        assert!(launcher.journal().scroll_positions.is_empty());
    }

    #[tokio::test]
    async fn image_scan_keeps_dom_order_and_marks_gaps() {
        let launcher = FixtureLauncher::new(DomFixture {
            scroll_heights: vec![900],
            pages: vec![
                FixturePage {
                    images: vec!["https://img.example.com/p1.jpg".into()],
                    ..FixturePage::default()
                },
                FixturePage {
                    images: vec!["data:image/png;base64,AAAA".into()],
                    ..FixturePage::default()
                },
                FixturePage {
                    images: vec![
                        "https://img.example.com/p3a.jpg".into(),
                        "https://img.example.com/p3b.jpg".into(),
                    ],
                    ..FixturePage::default()
                },
            ],
            ..DomFixture::default()
        });

        let pages = harvest(
            &launcher,
            &reference(),
            HarvestMode::ImageScan,
            &HarvestOptions::without_pauses(),
            &Progress::silent(),
        )
        .await
        .unwrap();

        assert_eq!(pages.len(), 4);
        assert_eq!(
            pages[0],
            PageArtifact::Remote {
                url: "https://img.example.com/p1.jpg".into()
            }
        );
        assert!(pages[1].is_missing());
        assert_eq!(
            pages[3],
            PageArtifact::Remote {
                url: "https://img.example.com/p3b.jpg".into()
            }
        );

        let journal = launcher.journal();
        assert_eq!((journal.opened, journal.closed), (1, 1));
        assert!(journal.ran(scripts::SUPPRESS_OVERLAYS));
        assert!(journal.ran(scripts::REVEAL_PAGES));
        assert!(!journal.ran(scripts::STRIP_PAGE_CHROME));
    }

    #[tokio::test]
    async fn rendered_text_captures_each_page_region() {
        let launcher = FixtureLauncher::new(DomFixture {
            scroll_heights: vec![400],
            text_layers: 2,
            pages: vec![page_at(0.0), page_at(70.0)],
            ..DomFixture::default()
        });

        let pages = harvest(
            &launcher,
            &reference(),
            HarvestMode::RenderedText,
            &HarvestOptions::without_pauses(),
            &Progress::silent(),
        )
        .await
        .unwrap();

        assert_eq!(pages.len(), 2);
        for page in &pages {
            let PageArtifact::Captured { bytes } = page else {
                panic!("expected captured page, got {page:?}");
            };
            let decoded = image::load_from_memory(bytes).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (40, 60));
        }
        let journal = launcher.journal();
        assert!(journal.ran(scripts::STRIP_PAGE_CHROME));
        assert_eq!(journal.region_captures, 2);
        assert_eq!(journal.element_captures, 0);
    }

    #[tokio::test]
    async fn failed_region_capture_falls_back_to_element_capture() {
        let mut flaky = page_at(0.0);
        flaky.fail_region_capture = true;
        let mut malformed = page_at(70.0);
        malformed.bounds = Some(Bounds {
            x: 0.0,
            y: 70.0,
            width: 0.0,
            height: 60.0,
        });
        let mut broken = page_at(140.0);
        broken.fail_region_capture = true;
        broken.fail_element_capture = true;

        let launcher = FixtureLauncher::new(DomFixture {
            scroll_heights: vec![300],
            text_layers: 3,
            pages: vec![flaky, malformed, broken],
            ..DomFixture::default()
        });

        let pages = harvest(
            &launcher,
            &reference(),
            HarvestMode::RenderedText,
            &HarvestOptions::without_pauses(),
            &Progress::silent(),
        )
        .await
        .unwrap();

        assert!(matches!(pages[0], PageArtifact::Captured { .. }));
        assert!(matches!(pages[1], PageArtifact::Captured { .. }));
        match &pages[2] {
            PageArtifact::Missing { reason } => {
                assert!(reason.contains("region capture failed"), "reason: {reason}");
                assert!(reason.contains("element capture failed"), "reason: {reason}");
            }
            other => panic!("expected missing page, got {other:?}"),
        }
        let journal = launcher.journal();
        assert_eq!(journal.element_captures, 3);
        assert_eq!(journal.closed, 1);
    }

    fn jpeg_data_url() -> String {
        let mut jpeg = Vec::new();
        image::RgbImage::from_pixel(8, 12, image::Rgb([200, 10, 10]))
            .write_to(
                &mut std::io::Cursor::new(&mut jpeg),
                image::ImageOutputFormat::Jpeg(90),
            )
            .unwrap();
        format!("data:image/jpeg;base64,{}", BASE64_STANDARD.encode(&jpeg))
    }

    #[tokio::test]
    async fn image_scan_exports_canvas_pages_without_images() {
        let launcher = FixtureLauncher::new(DomFixture {
            scroll_heights: vec![600],
            pages: vec![
                FixturePage {
                    images: vec!["https://img.example.com/p1.jpg".into()],
                    ..FixturePage::default()
                },
                FixturePage {
                    canvas: Some(jpeg_data_url()),
                    ..FixturePage::default()
                },
                FixturePage::default(),
                FixturePage {
                    canvas: Some("data:image/jpeg;base64,%%%".into()),
                    ..FixturePage::default()
                },
            ],
            ..DomFixture::default()
        });

        let pages = harvest(
            &launcher,
            &reference(),
            HarvestMode::ImageScan,
            &HarvestOptions::without_pauses(),
            &Progress::silent(),
        )
        .await
        .unwrap();

        assert_eq!(pages.len(), 4);
        assert!(matches!(pages[0], PageArtifact::Remote { .. }));
        let PageArtifact::Captured { bytes } = &pages[1] else {
            panic!("expected canvas page, got {:?}", pages[1]);
        };
        assert_eq!(image::guess_format(bytes).unwrap(), image::ImageFormat::Jpeg);
        let decoded = image::load_from_memory(bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 12));
        match &pages[2] {
            PageArtifact::Missing { reason } => assert!(reason.contains("canvas"), "{reason}"),
            other => panic!("expected missing page, got {other:?}"),
        }
        assert!(pages[3].is_missing());
    }

    #[test]
    fn data_url_decoding_rejects_foreign_payloads() {
        assert_eq!(
            decode_image_data_url("data:image/png;base64,iVBORw==").unwrap(),
            vec![0x89, b'P', b'N', b'G']
        );
        assert!(decode_image_data_url("data:text/plain;base64,aGk=").is_err());
        assert!(decode_image_data_url("data:image/png,raw").is_err());
        assert!(decode_image_data_url("data:image/png;base64,").is_err());
        assert!(decode_image_data_url("not a data url").is_err());
    }

    #[tokio::test]
    async fn chrome_cleanup_failure_does_not_stop_capture() {
        let launcher = FixtureLauncher::new(DomFixture {
            scroll_heights: vec![300],
            text_layers: 1,
            pages: vec![page_at(0.0)],
            fail_strip_chrome: true,
            ..DomFixture::default()
        });

        let pages = harvest(
            &launcher,
            &reference(),
            HarvestMode::RenderedText,
            &HarvestOptions::without_pauses(),
            &Progress::silent(),
        )
        .await
        .unwrap();

        assert!(matches!(pages[0], PageArtifact::Captured { .. }));
        assert!(launcher.journal().ran(scripts::STRIP_PAGE_CHROME));
    }

    #[tokio::test]
    async fn open_failure_propagates() {
        let launcher = FixtureLauncher::new(DomFixture {
            fail_open: Some("no browser".into()),
            ..DomFixture::default()
        });
        let err = harvest(
            &launcher,
            &reference(),
            HarvestMode::ImageScan,
            &HarvestOptions::without_pauses(),
            &Progress::silent(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HarvestError::Session(_)));
    }
}
