use docharvest_lib::{ErrorCategory, HarvestError, OcrError};

#[test]
fn config_error_display_includes_message() {
    let err = HarvestError::Config("missing base name".to_string());

    assert_eq!(format!("{}", err), "Configuration error: missing base name");
}

#[test]
fn io_error_display_wraps_source() {
    let io_err = std::io::Error::other("disk full");
    let err: HarvestError = io_err.into();
    let rendered = format!("{}", err);

    assert!(rendered.starts_with("IO error: "));
    assert!(rendered.contains("disk full"));
}

#[test]
fn http_error_includes_status_and_url() {
    let err = HarvestError::Http {
        url: "https://cdn.example.com/pages/4.jpg".to_string(),
        status: reqwest::StatusCode::NOT_FOUND,
    };

    assert_eq!(
        format!("{}", err),
        "HTTP 404 Not Found fetching https://cdn.example.com/pages/4.jpg"
    );
}

#[test]
fn session_helper_uses_message() {
    let err = HarvestError::session("all browser providers failed");

    assert_eq!(
        format!("{}", err),
        "Browser session error: all browser providers failed"
    );
}

#[test]
fn ocr_errors_convert_and_keep_ocr_category() {
    let err: HarvestError = OcrError::NotAvailable.into();

    assert!(format!("{}", err).starts_with("OCR error: Tesseract not available"));
    assert_eq!(err.to_payload().category, ErrorCategory::Ocr);
}

#[test]
fn unrecognized_layout_display_and_remediation() {
    let err = HarvestError::UnrecognizedLayout("no text layers or page images".to_string());

    assert_eq!(
        format!("{}", err),
        "Unrecognized document layout: no text layers or page images"
    );
    let payload = err.to_payload();
    assert_eq!(payload.category, ErrorCategory::Layout);
    assert!(payload.remediation.is_some());
}
