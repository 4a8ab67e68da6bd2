//! Browser automation for document viewer pages.
//!
//! A [`SessionLauncher`] opens one [`BrowserSession`] per document. The
//! session exposes the handful of driver capabilities the classifier and the
//! harvester need: running in-page script, querying elements, measuring them
//! and capturing them as PNG.
//!
//! # Module Structure
//!
//! - [`chromium`] - Chromium-family backend over the DevTools protocol
//! - [`fixture`] - Static DOM backend for tests and offline runs
//! - [`scripts`] - In-page scripts and viewer selectors
//!
//! # Example
//!
//! ```no_run
//! use docharvest_lib::browser::{BrowserOptions, ChromiumLauncher, SessionLauncher};
//! use docharvest_lib::DocumentRef;
//!
//! # async fn example() -> docharvest_lib::Result<()> {
//! let launcher = ChromiumLauncher::new(BrowserOptions::default());
//! let reference = DocumentRef::parse("https://www.example.com/document/1/title").unwrap();
//! let mut session = launcher.open(&reference).await?;
//! let height = session.run_script("document.body.scrollHeight").await?;
//! println!("document height: {height}");
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

mod chromium;
mod fixture;
pub mod scripts;

use crate::reference::DocumentRef;
use crate::types::Bounds;
use crate::{HarvestError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

pub use chromium::{
    BrowserOptions, BrowserProvider, ChromiumLauncher, DEFAULT_NAVIGATION_TIMEOUT,
    DEFAULT_USER_AGENT,
};
pub use fixture::{DomFixture, FixtureJournal, FixtureLauncher, FixturePage};

/// Opaque reference to an element owned by a session.
///
/// Handles are only meaningful to the session that returned them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub(crate) usize);

/// One live page in a browser, exclusively owned by its caller.
///
/// Every operation except [`BrowserSession::close`] fails with
/// [`HarvestError::InvalidState`] once the session is closed.
#[async_trait]
pub trait BrowserSession: Send {
    /// Evaluates `script` in the page and returns its JSON value.
    async fn run_script(&mut self, script: &str) -> Result<Value>;

    async fn query(&mut self, selector: &str) -> Result<Vec<ElementHandle>>;

    async fn query_within(
        &mut self,
        parent: ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>>;

    async fn attribute(&mut self, element: ElementHandle, name: &str) -> Result<Option<String>>;

    /// Calls `function` with `this` bound to `element` and returns its JSON
    /// value.
    async fn call_function(&mut self, element: ElementHandle, function: &str) -> Result<Value>;

    async fn scroll_into_view(&mut self, element: ElementHandle) -> Result<()>;

    /// Bounding box in document coordinates (CSS pixels).
    async fn bounding_box(&mut self, element: ElementHandle) -> Result<Bounds>;

    /// PNG of an arbitrary document region.
    async fn capture_region(&mut self, bounds: Bounds) -> Result<Vec<u8>>;

    /// PNG of a single element as the driver renders it.
    async fn capture_element(&mut self, element: ElementHandle) -> Result<Vec<u8>>;

    /// Releases the driver. Calling it again is a no-op.
    async fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Starts sessions navigated to a document.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Fails with [`HarvestError::Session`] when no driver can be started or
    /// the page does not load in time.
    async fn open(&self, reference: &DocumentRef) -> Result<Box<dyn BrowserSession>>;

    /// Short backend label for logs and reports.
    fn name(&self) -> &str;
}

/// Runs `script` and deserializes its result.
pub async fn run_script_as<T: DeserializeOwned>(
    session: &mut dyn BrowserSession,
    script: &str,
) -> Result<T> {
    let value = session.run_script(script).await?;
    serde_json::from_value(value.clone()).map_err(|e| {
        HarvestError::Script(format!("unexpected script result {value}: {e}"))
    })
}

/// Closes a session, logging instead of failing.
pub async fn close_quietly(session: &mut dyn BrowserSession) {
    if let Err(err) = session.close().await {
        debug!(error = %err, "browser session did not close cleanly");
    }
}
