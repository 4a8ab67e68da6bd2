//! Static DOM backend.
//!
//! A [`DomFixture`] describes what a viewer page would report: scroll heights,
//! marker counts, page containers with their image sources and capture
//! behaviour. [`FixtureSession`] answers the same scripts and queries a live
//! page would, so the classifier and harvester run unchanged against it.

use super::scripts::{
    CANVAS_DATA_URL, COUNT_MARKERS, PAGE_CONTAINER_SELECTOR, PAGE_IMAGE_SELECTOR, REVEAL_PAGES,
    SCROLL_HEIGHT, SCROLL_TO_BOTTOM, SCROLL_TO_PREFIX, STRIP_PAGE_CHROME, SUPPRESS_OVERLAYS,
};
use super::{BrowserSession, ElementHandle, SessionLauncher};
use crate::reference::DocumentRef;
use crate::types::Bounds;
use crate::{HarvestError, Result};
use async_trait::async_trait;
use image::{ImageOutputFormat, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const DEFAULT_PAGE_BOUNDS: Bounds = Bounds {
    x: 0.0,
    y: 0.0,
    width: 120.0,
    height: 160.0,
};

/// Vertical distance between consecutive pages laid out without explicit
/// bounds.
const DEFAULT_PAGE_STRIDE: f64 = 200.0;

/// Static description of a viewer page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DomFixture {
    /// Successive `document.body.scrollHeight` readings; the last one repeats.
    pub scroll_heights: Vec<u64>,
    /// Number of `div.text_layer` nodes.
    pub text_layers: u64,
    /// Number of `img.absimg` nodes; derived from `pages` when absent.
    pub image_pages: Option<u64>,
    pub pages: Vec<FixturePage>,
    /// When set, opening a session fails with this message.
    pub fail_open: Option<String>,
    /// Makes the marker count script throw.
    pub fail_marker_count: bool,
    /// Makes the page-chrome cleanup script throw.
    pub fail_strip_chrome: bool,
}

/// One page container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FixturePage {
    /// `src` of each `img.absimg` inside the container.
    pub images: Vec<String>,
    /// Image returned by captures. Relative paths resolve against the
    /// fixture file. A blank page is rendered when absent.
    pub capture: Option<PathBuf>,
    /// Data URL returned by the container's `canvas`, if it has one.
    pub canvas: Option<String>,
    /// Defaults to a 120x160 box stacked below the previous page.
    pub bounds: Option<Bounds>,
    pub fail_region_capture: bool,
    pub fail_element_capture: bool,
}

impl FixturePage {
    /// Box of this page when it sits at `index` in the container list.
    pub fn bounds_at(&self, index: usize) -> Bounds {
        self.bounds.unwrap_or(Bounds {
            y: index as f64 * DEFAULT_PAGE_STRIDE,
            ..DEFAULT_PAGE_BOUNDS
        })
    }
}

impl DomFixture {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let mut fixture: DomFixture = serde_json::from_str(&raw)?;
        if let Some(base) = path.parent() {
            for page in &mut fixture.pages {
                if let Some(capture) = page.capture.as_mut() {
                    if capture.is_relative() {
                        *capture = base.join(&*capture);
                    }
                }
            }
        }
        Ok(fixture)
    }

    pub fn marker_counts(&self) -> (u64, u64) {
        let images = self
            .image_pages
            .unwrap_or_else(|| self.pages.iter().map(|p| p.images.len() as u64).sum());
        (self.text_layers, images)
    }
}

/// What sessions opened by a [`FixtureLauncher`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixtureJournal {
    pub opened: usize,
    pub closed: usize,
    /// Every script run, across sessions, in order.
    pub scripts: Vec<String>,
    /// Scroll positions requested through `window.scrollTo`.
    pub scroll_positions: Vec<u64>,
    pub region_captures: usize,
    pub element_captures: usize,
}

impl FixtureJournal {
    pub fn ran(&self, script: &str) -> bool {
        self.scripts.iter().any(|s| s == script)
    }
}

/// Opens [`FixtureSession`]s over a shared fixture.
#[derive(Debug, Clone)]
pub struct FixtureLauncher {
    fixture: Arc<DomFixture>,
    journal: Arc<Mutex<FixtureJournal>>,
}

impl FixtureLauncher {
    pub fn new(fixture: DomFixture) -> Self {
        Self {
            fixture: Arc::new(fixture),
            journal: Arc::new(Mutex::new(FixtureJournal::default())),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self::new(DomFixture::from_path(path)?))
    }

    /// Snapshot of everything recorded so far.
    pub fn journal(&self) -> FixtureJournal {
        self.journal
            .lock()
            .map(|j| j.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SessionLauncher for FixtureLauncher {
    async fn open(&self, _reference: &DocumentRef) -> Result<Box<dyn BrowserSession>> {
        if let Some(message) = &self.fixture.fail_open {
            return Err(HarvestError::session(message.clone()));
        }
        record(&self.journal, |j| j.opened += 1);
        Ok(Box::new(FixtureSession {
            fixture: Arc::clone(&self.fixture),
            journal: Arc::clone(&self.journal),
            elements: Vec::new(),
            height_reads: 0,
            closed: false,
        }))
    }

    fn name(&self) -> &str {
        "fixture"
    }
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Page(usize),
    Image { page: usize, index: usize },
}

/// Session over a [`DomFixture`].
#[derive(Debug)]
pub struct FixtureSession {
    fixture: Arc<DomFixture>,
    journal: Arc<Mutex<FixtureJournal>>,
    elements: Vec<Node>,
    height_reads: usize,
    closed: bool,
}

fn record(journal: &Mutex<FixtureJournal>, update: impl FnOnce(&mut FixtureJournal)) {
    if let Ok(mut journal) = journal.lock() {
        update(&mut journal);
    }
}

impl FixtureSession {
    fn ensure_open(&self, operation: &str) -> Result<()> {
        if self.closed {
            return Err(HarvestError::closed(operation));
        }
        Ok(())
    }

    fn node(&self, handle: ElementHandle, operation: &str) -> Result<Node> {
        self.ensure_open(operation)?;
        self.elements.get(handle.0).copied().ok_or_else(|| {
            HarvestError::InvalidState(format!("{operation}: unknown element handle {}", handle.0))
        })
    }

    fn register(&mut self, nodes: impl IntoIterator<Item = Node>) -> Vec<ElementHandle> {
        let start = self.elements.len();
        self.elements.extend(nodes);
        (start..self.elements.len()).map(ElementHandle).collect()
    }

    fn page(&self, index: usize) -> Result<&FixturePage> {
        self.fixture
            .pages
            .get(index)
            .ok_or_else(|| HarvestError::InvalidState(format!("no fixture page {index}")))
    }

    fn next_height(&mut self) -> u64 {
        let heights = &self.fixture.scroll_heights;
        let height = heights
            .get(self.height_reads)
            .or_else(|| heights.last())
            .copied()
            .unwrap_or(0);
        self.height_reads += 1;
        height
    }

    fn page_at(&self, bounds: Bounds) -> Option<usize> {
        self.fixture
            .pages
            .iter()
            .enumerate()
            .position(|(index, p)| p.bounds_at(index) == bounds)
    }

    fn render_capture(&self, index: usize) -> Result<Vec<u8>> {
        let page = self.page(index)?;
        let image = match &page.capture {
            Some(path) => image::open(path)
                .map_err(|e| HarvestError::Capture(format!("{}: {e}", path.display())))?,
            None => {
                let bounds = page.bounds_at(index);
                let width = bounds.width.max(1.0).round() as u32;
                let height = bounds.height.max(1.0).round() as u32;
                image::DynamicImage::ImageRgb8(RgbImage::from_pixel(
                    width,
                    height,
                    Rgb([255, 255, 255]),
                ))
            }
        };
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)?;
        Ok(png)
    }
}

#[async_trait]
impl BrowserSession for FixtureSession {
    async fn run_script(&mut self, script: &str) -> Result<Value> {
        self.ensure_open("run_script")?;
        record(&self.journal, |j| j.scripts.push(script.to_string()));

        if script == SCROLL_HEIGHT {
            return Ok(json!(self.next_height()));
        }
        if script == COUNT_MARKERS {
            if self.fixture.fail_marker_count {
                return Err(HarvestError::Script("marker count threw an exception".into()));
            }
            let (text_layers, image_pages) = self.fixture.marker_counts();
            return Ok(json!({ "textLayers": text_layers, "imagePages": image_pages }));
        }
        if script == STRIP_PAGE_CHROME && self.fixture.fail_strip_chrome {
            return Err(HarvestError::Script("page chrome cleanup threw an exception".into()));
        }
        if script == SUPPRESS_OVERLAYS || script == STRIP_PAGE_CHROME {
            return Ok(json!(0));
        }
        if script == REVEAL_PAGES {
            return Ok(json!(self.fixture.pages.len()));
        }
        if script == SCROLL_TO_BOTTOM {
            return Ok(Value::Null);
        }
        if let Some(rest) = script.strip_prefix(SCROLL_TO_PREFIX) {
            let position = rest
                .trim_end_matches(')')
                .trim()
                .parse::<u64>()
                .map_err(|e| {
                    HarvestError::Script(format!("bad scroll position in {script}: {e}"))
                })?;
            record(&self.journal, |j| j.scroll_positions.push(position));
            return Ok(Value::Null);
        }

        Err(HarvestError::Script(format!(
            "fixture cannot evaluate script: {script}"
        )))
    }

    async fn query(&mut self, selector: &str) -> Result<Vec<ElementHandle>> {
        self.ensure_open("query")?;
        if selector != PAGE_CONTAINER_SELECTOR {
            return Ok(Vec::new());
        }
        let count = self.fixture.pages.len();
        Ok(self.register((0..count).map(Node::Page)))
    }

    async fn query_within(
        &mut self,
        parent: ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>> {
        let Node::Page(page) = self.node(parent, "query_within")? else {
            return Ok(Vec::new());
        };
        if selector != PAGE_IMAGE_SELECTOR {
            return Ok(Vec::new());
        }
        let count = self.page(page)?.images.len();
        Ok(self.register((0..count).map(|index| Node::Image { page, index })))
    }

    async fn attribute(&mut self, element: ElementHandle, name: &str) -> Result<Option<String>> {
        match self.node(element, "attribute")? {
            Node::Image { page, index } if name == "src" => {
                Ok(self.page(page)?.images.get(index).cloned())
            }
            _ => Ok(None),
        }
    }

    async fn call_function(&mut self, element: ElementHandle, function: &str) -> Result<Value> {
        let node = self.node(element, "call_function")?;
        match node {
            Node::Page(page) if function == CANVAS_DATA_URL => Ok(json!(self.page(page)?.canvas)),
            _ => Err(HarvestError::Script(format!(
                "fixture cannot call function on {node:?}: {function}"
            ))),
        }
    }

    async fn scroll_into_view(&mut self, element: ElementHandle) -> Result<()> {
        self.node(element, "scroll_into_view")?;
        Ok(())
    }

    async fn bounding_box(&mut self, element: ElementHandle) -> Result<Bounds> {
        match self.node(element, "bounding_box")? {
            Node::Page(page) => Ok(self.page(page)?.bounds_at(page)),
            Node::Image { .. } => Ok(DEFAULT_PAGE_BOUNDS),
        }
    }

    async fn capture_region(&mut self, bounds: Bounds) -> Result<Vec<u8>> {
        self.ensure_open("capture_region")?;
        record(&self.journal, |j| j.region_captures += 1);
        let index = self
            .page_at(bounds)
            .ok_or_else(|| HarvestError::Capture(format!("no page at {bounds:?}")))?;
        if self.page(index)?.fail_region_capture {
            return Err(HarvestError::Capture(format!(
                "region capture failed for page {}",
                index + 1
            )));
        }
        self.render_capture(index)
    }

    async fn capture_element(&mut self, element: ElementHandle) -> Result<Vec<u8>> {
        let Node::Page(index) = self.node(element, "capture_element")? else {
            return Err(HarvestError::Capture("only page containers can be captured".into()));
        };
        record(&self.journal, |j| j.element_captures += 1);
        if self.page(index)?.fail_element_capture {
            return Err(HarvestError::Capture(format!(
                "element capture failed for page {}",
                index + 1
            )));
        }
        self.render_capture(index)
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.elements.clear();
            record(&self.journal, |j| j.closed += 1);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::scripts;

    fn reference() -> DocumentRef {
        DocumentRef::parse("https://viewer.example.com/document/7/fixture").unwrap()
    }

    fn two_page_fixture() -> DomFixture {
        DomFixture {
            scroll_heights: vec![1000, 1800],
            pages: vec![
                FixturePage {
                    images: vec!["https://img.example.com/1.jpg".into()],
                    ..FixturePage::default()
                },
                FixturePage {
                    images: vec!["/relative.jpg".into(), "https://img.example.com/2.jpg".into()],
                    ..FixturePage::default()
                },
            ],
            ..DomFixture::default()
        }
    }

    #[tokio::test]
    async fn heights_advance_then_repeat_last_value() {
        let launcher = FixtureLauncher::new(two_page_fixture());
        let mut session = launcher.open(&reference()).await.unwrap();
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(session.run_script(scripts::SCROLL_HEIGHT).await.unwrap());
        }
        assert_eq!(seen, vec![json!(1000), json!(1800), json!(1800), json!(1800)]);
    }

    #[tokio::test]
    async fn image_count_defaults_to_page_images() {
        let launcher = FixtureLauncher::new(two_page_fixture());
        let mut session = launcher.open(&reference()).await.unwrap();
        let counts = session.run_script(scripts::COUNT_MARKERS).await.unwrap();
        assert_eq!(counts, json!({ "textLayers": 0, "imagePages": 3 }));
    }

    #[tokio::test]
    async fn attributes_follow_dom_order() {
        let launcher = FixtureLauncher::new(two_page_fixture());
        let mut session = launcher.open(&reference()).await.unwrap();
        let pages = session
            .query(scripts::PAGE_CONTAINER_SELECTOR)
            .await
            .unwrap();
        assert_eq!(pages.len(), 2);
        let images = session
            .query_within(pages[1], scripts::PAGE_IMAGE_SELECTOR)
            .await
            .unwrap();
        let mut sources = Vec::new();
        for image in images {
            sources.push(session.attribute(image, "src").await.unwrap());
        }
        assert_eq!(
            sources,
            vec![
                Some("/relative.jpg".to_string()),
                Some("https://img.example.com/2.jpg".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn operations_after_close_are_rejected() {
        let launcher = FixtureLauncher::new(two_page_fixture());
        let mut session = launcher.open(&reference()).await.unwrap();
        session.close().await.unwrap();
        session.close().await.unwrap();

        let err = session
            .run_script(scripts::SCROLL_HEIGHT)
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::InvalidState(_)));
        assert!(session.query("div").await.is_err());
        assert!(session.is_closed());
        assert_eq!(launcher.journal().closed, 1);
    }

    #[tokio::test]
    async fn unknown_scripts_fail() {
        let launcher = FixtureLauncher::new(DomFixture::default());
        let mut session = launcher.open(&reference()).await.unwrap();
        let err = session.run_script("alert(1)").await.unwrap_err();
        assert!(matches!(err, HarvestError::Script(_)));
    }

    #[tokio::test]
    async fn blank_capture_matches_page_bounds() {
        let fixture = DomFixture {
            pages: vec![FixturePage {
                bounds: Some(Bounds {
                    x: 0.0,
                    y: 40.0,
                    width: 30.0,
                    height: 20.0,
                }),
                ..FixturePage::default()
            }],
            ..DomFixture::default()
        };
        let launcher = FixtureLauncher::new(fixture);
        let mut session = launcher.open(&reference()).await.unwrap();
        let pages = session
            .query(scripts::PAGE_CONTAINER_SELECTOR)
            .await
            .unwrap();
        let bounds = session.bounding_box(pages[0]).await.unwrap();
        let png = session.capture_region(bounds).await.unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (30, 20));
    }

    #[tokio::test]
    async fn region_capture_resolves_pages_without_explicit_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let red = dir.path().join("red.png");
        let blue = dir.path().join("blue.png");
        RgbImage::from_pixel(4, 4, Rgb([255, 0, 0]))
            .save(&red)
            .unwrap();
        RgbImage::from_pixel(4, 4, Rgb([0, 0, 255]))
            .save(&blue)
            .unwrap();
        let launcher = FixtureLauncher::new(DomFixture {
            pages: vec![
                FixturePage {
                    capture: Some(red),
                    ..FixturePage::default()
                },
                FixturePage {
                    capture: Some(blue),
                    ..FixturePage::default()
                },
            ],
            ..DomFixture::default()
        });
        let mut session = launcher.open(&reference()).await.unwrap();
        let pages = session
            .query(scripts::PAGE_CONTAINER_SELECTOR)
            .await
            .unwrap();

        let first = session.bounding_box(pages[0]).await.unwrap();
        let second = session.bounding_box(pages[1]).await.unwrap();
        assert_ne!(first, second);

        let png = session.capture_region(second).await.unwrap();
        let captured = image::load_from_memory(&png).unwrap().to_rgb8();
        assert_eq!(captured.get_pixel(0, 0).0, [0, 0, 255]);
    }

    #[tokio::test]
    async fn region_capture_failure_stays_on_its_page() {
        let launcher = FixtureLauncher::new(DomFixture {
            pages: vec![
                FixturePage {
                    fail_region_capture: true,
                    ..FixturePage::default()
                },
                FixturePage::default(),
            ],
            ..DomFixture::default()
        });
        let mut session = launcher.open(&reference()).await.unwrap();
        let pages = session
            .query(scripts::PAGE_CONTAINER_SELECTOR)
            .await
            .unwrap();
        let second = session.bounding_box(pages[1]).await.unwrap();
        assert!(session.capture_region(second).await.is_ok());
        let first = session.bounding_box(pages[0]).await.unwrap();
        assert!(session.capture_region(first).await.is_err());
    }

    #[tokio::test]
    async fn canvas_function_returns_the_page_data_url() {
        let launcher = FixtureLauncher::new(DomFixture {
            pages: vec![
                FixturePage {
                    canvas: Some("data:image/jpeg;base64,/9j/".into()),
                    ..FixturePage::default()
                },
                FixturePage::default(),
            ],
            ..DomFixture::default()
        });
        let mut session = launcher.open(&reference()).await.unwrap();
        let pages = session
            .query(scripts::PAGE_CONTAINER_SELECTOR)
            .await
            .unwrap();

        let drawn = session
            .call_function(pages[0], scripts::CANVAS_DATA_URL)
            .await
            .unwrap();
        assert_eq!(drawn, json!("data:image/jpeg;base64,/9j/"));
        let plain = session
            .call_function(pages[1], scripts::CANVAS_DATA_URL)
            .await
            .unwrap();
        assert_eq!(plain, Value::Null);
        assert!(session
            .call_function(pages[0], "function() { return 1; }")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn fail_open_surfaces_as_session_error() {
        let launcher = FixtureLauncher::new(DomFixture {
            fail_open: Some("browser exploded".into()),
            ..DomFixture::default()
        });
        let err = launcher.open(&reference()).await.err().unwrap();
        assert!(matches!(err, HarvestError::Session(ref m) if m == "browser exploded"));
        assert_eq!(launcher.journal().opened, 0);
    }

    #[test]
    fn relative_capture_paths_resolve_against_fixture_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viewer.json");
        fs::write(
            &path,
            r#"{"scrollHeights":[10],"textLayers":2,"pages":[{"capture":"p1.png"}]}"#,
        )
        .unwrap();
        let fixture = DomFixture::from_path(&path).unwrap();
        assert_eq!(fixture.text_layers, 2);
        assert_eq!(fixture.pages[0].capture, Some(dir.path().join("p1.png")));
    }
}
