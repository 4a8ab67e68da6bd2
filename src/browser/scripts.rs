//! In-page scripts and viewer selectors.
//!
//! Scripts are evaluated as expressions, so multi-statement bodies are
//! wrapped in an IIFE. Backends may match these constants by identity.

/// Page containers, in DOM order.
pub const PAGE_CONTAINER_SELECTOR: &str =
    "#document_container div.outer_page_container > div[id^='outer_page_']";

/// Raster page images inside a container.
pub const PAGE_IMAGE_SELECTOR: &str = "img.absimg";

/// Stops pending loads and removes scripts plus known overlay, paywall and
/// login elements. Returns the number of removed nodes.
pub const SUPPRESS_OVERLAYS: &str = r#"(() => {
  window.stop();
  let removed = 0;
  document.querySelectorAll('script').forEach(e => { e.remove(); removed++; });
  document.querySelectorAll(
    '.overlay, .modal, .paywall, .popup, .login-prompt, .container-overlay, #nux-modal'
  ).forEach(e => { e.remove(); removed++; });
  return removed;
})()"#;

pub const SCROLL_HEIGHT: &str = "document.body.scrollHeight";

pub const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight)";

pub(crate) const SCROLL_TO_PREFIX: &str = "window.scrollTo(0, ";

pub fn scroll_to(position: u64) -> String {
    format!("{SCROLL_TO_PREFIX}{position})")
}

/// Counts text-layer and page-image markers.
pub const COUNT_MARKERS: &str = r#"(() => ({
  textLayers: document.querySelectorAll('div.text_layer').length,
  imagePages: document.querySelectorAll('img.absimg').length
}))()"#;

/// Scrolls every page container into view to trigger lazy loading.
pub const REVEAL_PAGES: &str = r#"(() => {
  const containers = document.querySelectorAll('div.outer_page_container > div[id^="outer_page_"]');
  containers.forEach(c => c.scrollIntoView());
  return containers.length;
})()"#;

/// Removes cookie/privacy banners, site chrome, and fixed or sticky elements
/// outside the document container.
pub const STRIP_PAGE_CHROME: &str = r#"(() => {
  let removed = 0;
  document.querySelectorAll(
    'div[class*="cookie"], div[class*="Cookie"], div[id*="cookie"], '
    + 'div[class*="privacy"], div[id*="privacy"], '
    + 'header, nav, .navbar, .site-header'
  ).forEach(e => { e.remove(); removed++; });
  Array.from(document.querySelectorAll('body *')).forEach(el => {
    if (!el.isConnected) return;
    const style = window.getComputedStyle(el);
    if ((style.position === 'fixed' || style.position === 'sticky')
        && !el.closest('#document_container')) {
      el.remove();
      removed++;
    }
  });
  return removed;
})()"#;

/// Function body applied to an element; aligns its top with the viewport.
pub(crate) const SCROLL_ELEMENT_TO_START: &str =
    "function() { this.scrollIntoView({block: 'start'}); return true; }";

/// Function body applied to an element; returns its document-space box as
/// a JSON string.
pub(crate) const MEASURE_ELEMENT: &str = r#"function() {
  const r = this.getBoundingClientRect();
  return JSON.stringify({
    x: r.left + window.scrollX,
    y: r.top + window.scrollY,
    width: r.width,
    height: r.height
  });
}"#;

/// Function body applied to a page container; returns the JPEG data URL of
/// its `canvas`, or null when the page is not drawn on a canvas.
pub const CANVAS_DATA_URL: &str = r#"function() {
  const canvas = this.querySelector('canvas');
  return canvas ? canvas.toDataURL('image/jpeg') : null;
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scroll_to_embeds_position() {
        assert_eq!(scroll_to(1500), "window.scrollTo(0, 1500)");
        assert!(scroll_to(0).starts_with(SCROLL_TO_PREFIX));
    }

    #[test]
    fn multi_statement_scripts_are_expressions() {
        for script in [SUPPRESS_OVERLAYS, COUNT_MARKERS, REVEAL_PAGES, STRIP_PAGE_CHROME] {
            assert!(script.starts_with("(() =>"), "not an IIFE: {script}");
            assert!(script.ends_with(")()"), "not invoked: {script}");
        }
    }

    #[test]
    fn marker_script_reports_camel_case_keys() {
        assert!(COUNT_MARKERS.contains("textLayers"));
        assert!(COUNT_MARKERS.contains("imagePages"));
    }
}
