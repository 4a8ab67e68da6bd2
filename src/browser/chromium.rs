//! Chromium-family backend over the DevTools protocol.
//!
//! Driver start-up walks an ordered list of [`BrowserProvider`]s and keeps
//! the first one that comes up. Chrome, Chromium and Edge all speak CDP, so
//! the browser choice is only a matter of which executable is launched.

use super::{BrowserSession, SessionLauncher};
use crate::reference::DocumentRef;
use crate::types::WindowSize;
use crate::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default timeout for page navigation.
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(60);

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Well-known install locations, tried in order.
const CHROMIUM_PATHS: &[&str] = &[
    // Linux
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/opt/google/chrome/google-chrome",
    "/usr/bin/microsoft-edge",
    "/usr/bin/microsoft-edge-stable",
    "/opt/microsoft/msedge/msedge",
    // macOS
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
    // Windows
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
];

/// Executable names looked up on `PATH`.
const CHROMIUM_COMMANDS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "microsoft-edge",
    "msedge",
];

/// Configuration options for browser sessions.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Explicit browser executable, tried before detected ones.
    pub executable: Option<PathBuf>,
    /// DevTools endpoint of an already running browser (`http://host:9222`
    /// or a `ws://` debugger URL). Tried first when set.
    pub remote_url: Option<String>,
    pub headless: bool,
    pub window: WindowSize,
    /// Covers driver start-up plus the initial page load.
    pub navigation_timeout: Duration,
    pub user_agent: String,
    /// Extra command-line switches for launched browsers.
    pub extra_args: Vec<String>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            executable: None,
            remote_url: None,
            headless: true,
            window: WindowSize::default(),
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// One way of obtaining a running browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserProvider {
    Remote(String),
    Executable(PathBuf),
    Detected(PathBuf),
    /// Let the driver locate a browser on its own.
    DriverDefault,
}

impl fmt::Display for BrowserProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrowserProvider::Remote(url) => write!(f, "remote {url}"),
            BrowserProvider::Executable(path) => write!(f, "configured {}", path.display()),
            BrowserProvider::Detected(path) => write!(f, "detected {}", path.display()),
            BrowserProvider::DriverDefault => f.write_str("driver default"),
        }
    }
}

impl BrowserOptions {
    /// Start-up attempts in order, using executables found on this machine.
    pub fn providers(&self) -> Vec<BrowserProvider> {
        self.providers_with(detect_chromium_executables())
    }

    /// Start-up attempts in order for a given set of detected executables.
    pub fn providers_with(&self, detected: Vec<PathBuf>) -> Vec<BrowserProvider> {
        let mut providers = Vec::new();
        if let Some(url) = self.remote_url.as_ref().filter(|u| !u.trim().is_empty()) {
            providers.push(BrowserProvider::Remote(url.trim().to_string()));
        }
        if let Some(path) = &self.executable {
            providers.push(BrowserProvider::Executable(path.clone()));
        }
        for path in detected {
            if self.executable.as_ref() != Some(&path) {
                providers.push(BrowserProvider::Detected(path));
            }
        }
        providers.push(BrowserProvider::DriverDefault);
        providers
    }
}

/// Chromium-family executables present on this machine, without duplicates.
pub fn detect_chromium_executables() -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = CHROMIUM_PATHS
        .iter()
        .map(PathBuf::from)
        .filter(|p| p.is_file())
        .collect();

    if let Some(path_var) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path_var) {
            for name in CHROMIUM_COMMANDS {
                let candidate = dir.join(name);
                if candidate.is_file() && !found.iter().any(|p| same_file(p, &candidate)) {
                    found.push(candidate);
                }
            }
        }
    }
    found
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Opens CDP sessions on Chrome, Chromium or Edge.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    options: BrowserOptions,
}

impl ChromiumLauncher {
    pub fn new(options: BrowserOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl SessionLauncher for ChromiumLauncher {
    async fn open(&self, reference: &DocumentRef) -> Result<Box<dyn BrowserSession>> {
        #[cfg(feature = "browser")]
        {
            live::open(&self.options, reference).await
        }
        #[cfg(not(feature = "browser"))]
        {
            let _ = reference;
            Err(crate::HarvestError::session(
                "browser support not compiled into this build",
            ))
        }
    }

    fn name(&self) -> &str {
        "chromium"
    }
}

#[cfg(feature = "browser")]
mod live {
    use super::{BrowserOptions, BrowserProvider};
    use crate::browser::scripts::{MEASURE_ELEMENT, SCROLL_ELEMENT_TO_START};
    use crate::browser::{BrowserSession, ElementHandle};
    use crate::reference::DocumentRef;
    use crate::types::Bounds;
    use crate::{HarvestError, Result};
    use async_trait::async_trait;
    use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, Viewport};
    use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
    use chromiumoxide::error::CdpError;
    use chromiumoxide::page::ScreenshotParams;
    use chromiumoxide::{Browser, BrowserConfig, Element, Page};
    use futures::StreamExt;
    use serde_json::Value;
    use std::path::Path;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;
    use tracing::{debug, info};

    struct Driver {
        browser: Browser,
        handler: JoinHandle<()>,
        /// False when attached to a browser someone else started.
        owned: bool,
    }

    impl Driver {
        async fn shutdown(mut self) {
            if self.owned {
                if let Err(e) = self.browser.close().await {
                    debug!(error = %e, "browser close failed");
                }
                if let Err(e) = self.browser.wait().await {
                    debug!(error = %e, "browser wait failed");
                }
            }
            self.handler.abort();
        }
    }

    pub(super) async fn open(
        options: &BrowserOptions,
        reference: &DocumentRef,
    ) -> Result<Box<dyn BrowserSession>> {
        let mut attempts = Vec::new();
        for provider in options.providers() {
            match start(options, &provider).await {
                Ok(driver) => {
                    info!(provider = %provider, "browser started");
                    let session = navigate(driver, options, reference).await?;
                    return Ok(Box::new(session));
                }
                Err(err) => {
                    debug!(provider = %provider, error = %err, "browser provider failed");
                    attempts.push(format!("{provider}: {err}"));
                }
            }
        }
        Err(HarvestError::session(format!(
            "could not start a browser ({})",
            attempts.join("; ")
        )))
    }

    async fn start(
        options: &BrowserOptions,
        provider: &BrowserProvider,
    ) -> std::result::Result<Driver, String> {
        match provider {
            BrowserProvider::Remote(url) => connect_remote(url, options).await,
            BrowserProvider::Executable(path) | BrowserProvider::Detected(path) => {
                launch(options, Some(path)).await
            }
            BrowserProvider::DriverDefault => launch(options, None).await,
        }
    }

    async fn launch(
        options: &BrowserOptions,
        executable: Option<&Path>,
    ) -> std::result::Result<Driver, String> {
        let mut builder = BrowserConfig::builder()
            .window_size(options.window.width, options.window.height)
            .viewport(None)
            .request_timeout(options.navigation_timeout)
            .no_sandbox()
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-gpu")
            .arg("--hide-scrollbars")
            .arg(format!("--user-agent={}", options.user_agent));

        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = executable {
            builder = builder.chrome_executable(path);
        }
        for arg in &options.extra_args {
            builder = builder.arg(arg.clone());
        }

        let config = builder.build()?;
        let (browser, handler) = timeout(options.navigation_timeout, Browser::launch(config))
            .await
            .map_err(|_| format!("launch timed out after {:?}", options.navigation_timeout))?
            .map_err(|e| e.to_string())?;

        Ok(Driver {
            browser,
            handler: spawn_handler(handler),
            owned: true,
        })
    }

    async fn connect_remote(
        url: &str,
        options: &BrowserOptions,
    ) -> std::result::Result<Driver, String> {
        let ws_url = if url.starts_with("ws://") || url.starts_with("wss://") {
            url.to_string()
        } else {
            resolve_debugger_url(url, options).await?
        };
        debug!(ws_url = %ws_url, "connecting to remote browser");

        let (browser, handler) = timeout(options.navigation_timeout, Browser::connect(ws_url))
            .await
            .map_err(|_| format!("connect timed out after {:?}", options.navigation_timeout))?
            .map_err(|e| e.to_string())?;

        Ok(Driver {
            browser,
            handler: spawn_handler(handler),
            owned: false,
        })
    }

    async fn resolve_debugger_url(
        url: &str,
        options: &BrowserOptions,
    ) -> std::result::Result<String, String> {
        let version_url = format!("{}/json/version", url.trim_end_matches('/'));
        let client = reqwest::Client::builder()
            .timeout(options.navigation_timeout)
            .build()
            .map_err(|e| e.to_string())?;
        let info: Value = client
            .get(&version_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;

        info.get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| format!("no webSocketDebuggerUrl at {version_url}"))
    }

    fn spawn_handler(mut handler: chromiumoxide::Handler) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser handler error");
                }
            }
        })
    }

    async fn navigate(
        driver: Driver,
        options: &BrowserOptions,
        reference: &DocumentRef,
    ) -> Result<ChromiumSession> {
        let load = async {
            let page = driver.browser.new_page(reference.as_str()).await?;
            page.wait_for_navigation().await?;
            Ok::<Page, CdpError>(page)
        };

        let loaded = timeout(options.navigation_timeout, load).await;
        match loaded {
            Ok(Ok(page)) => {
                info!(url = %reference, "document page loaded");
                Ok(ChromiumSession {
                    driver: Some(driver),
                    page,
                    elements: Vec::new(),
                })
            }
            Ok(Err(e)) => {
                driver.shutdown().await;
                Err(HarvestError::session(format!(
                    "failed to load {reference}: {e}"
                )))
            }
            Err(_) => {
                driver.shutdown().await;
                Err(HarvestError::session(format!(
                    "navigation to {reference} timed out after {:?}",
                    options.navigation_timeout
                )))
            }
        }
    }

    pub(super) struct ChromiumSession {
        /// `None` once closed.
        driver: Option<Driver>,
        page: Page,
        elements: Vec<Element>,
    }

    impl ChromiumSession {
        fn ensure_open(&self, operation: &str) -> Result<()> {
            if self.driver.is_none() {
                return Err(HarvestError::closed(operation));
            }
            Ok(())
        }

        fn element(&self, handle: ElementHandle, operation: &str) -> Result<&Element> {
            self.ensure_open(operation)?;
            self.elements.get(handle.0).ok_or_else(|| {
                HarvestError::InvalidState(format!(
                    "{operation}: unknown element handle {}",
                    handle.0
                ))
            })
        }

        fn register(&mut self, found: Vec<Element>) -> Vec<ElementHandle> {
            let start = self.elements.len();
            self.elements.extend(found);
            (start..self.elements.len()).map(ElementHandle).collect()
        }
    }

    #[async_trait]
    impl BrowserSession for ChromiumSession {
        async fn run_script(&mut self, script: &str) -> Result<Value> {
            self.ensure_open("run_script")?;
            let params = EvaluateParams::builder()
                .expression(script)
                .return_by_value(true)
                .await_promise(true)
                .build()
                .map_err(HarvestError::Script)?;
            let result = self
                .page
                .evaluate_expression(params)
                .await
                .map_err(|e| HarvestError::Script(e.to_string()))?;
            Ok(result.value().cloned().unwrap_or(Value::Null))
        }

        async fn query(&mut self, selector: &str) -> Result<Vec<ElementHandle>> {
            self.ensure_open("query")?;
            let found = self
                .page
                .find_elements(selector)
                .await
                .map_err(|e| HarvestError::Script(format!("query {selector}: {e}")))?;
            Ok(self.register(found))
        }

        async fn query_within(
            &mut self,
            parent: ElementHandle,
            selector: &str,
        ) -> Result<Vec<ElementHandle>> {
            let found = self
                .element(parent, "query_within")?
                .find_elements(selector)
                .await
                .map_err(|e| HarvestError::Script(format!("query {selector}: {e}")))?;
            Ok(self.register(found))
        }

        async fn attribute(
            &mut self,
            element: ElementHandle,
            name: &str,
        ) -> Result<Option<String>> {
            self.element(element, "attribute")?
                .attribute(name)
                .await
                .map_err(|e| HarvestError::Script(format!("attribute {name}: {e}")))
        }

        async fn call_function(&mut self, element: ElementHandle, function: &str) -> Result<Value> {
            let returned = self
                .element(element, "call_function")?
                .call_js_fn(function, false)
                .await
                .map_err(|e| HarvestError::Script(format!("call function: {e}")))?;
            Ok(returned.result.value.unwrap_or(Value::Null))
        }

        async fn scroll_into_view(&mut self, element: ElementHandle) -> Result<()> {
            self.element(element, "scroll_into_view")?
                .call_js_fn(SCROLL_ELEMENT_TO_START, false)
                .await
                .map_err(|e| HarvestError::Script(format!("scroll into view: {e}")))?;
            Ok(())
        }

        async fn bounding_box(&mut self, element: ElementHandle) -> Result<Bounds> {
            let returned = self
                .element(element, "bounding_box")?
                .call_js_fn(MEASURE_ELEMENT, false)
                .await
                .map_err(|e| HarvestError::Script(format!("measure element: {e}")))?;
            let raw = returned
                .result
                .value
                .as_ref()
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    HarvestError::Script("element measurement returned no value".into())
                })?;
            Ok(serde_json::from_str(raw)?)
        }

        async fn capture_region(&mut self, bounds: Bounds) -> Result<Vec<u8>> {
            self.ensure_open("capture_region")?;
            let params = ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .clip(Viewport {
                    x: bounds.x,
                    y: bounds.y,
                    width: bounds.width,
                    height: bounds.height,
                    scale: 1.0,
                })
                .from_surface(true)
                .capture_beyond_viewport(true)
                .build();
            self.page
                .screenshot(params)
                .await
                .map_err(|e| HarvestError::Capture(format!("region capture: {e}")))
        }

        async fn capture_element(&mut self, element: ElementHandle) -> Result<Vec<u8>> {
            self.element(element, "capture_element")?
                .screenshot(CaptureScreenshotFormat::Png)
                .await
                .map_err(|e| HarvestError::Capture(format!("element capture: {e}")))
        }

        async fn close(&mut self) -> Result<()> {
            let Some(driver) = self.driver.take() else {
                return Ok(());
            };
            self.elements.clear();
            if !driver.owned {
                if let Err(e) = self.page.clone().close().await {
                    debug!(error = %e, "page close failed");
                }
            }
            driver.shutdown().await;
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.driver.is_none()
        }
    }

    impl Drop for ChromiumSession {
        fn drop(&mut self) {
            if let Some(driver) = self.driver.take() {
                driver.handler.abort();
            }
        }
    }
}
