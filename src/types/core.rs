//! Core types used throughout the docharvest library.
//!
//! This module contains the fundamental data structures:
//! - [`Classification`] - Document type as detected from viewer markup
//! - [`HarvestMode`] - Capture strategy chosen from a classification
//! - [`MarkerCounts`] - Raw marker counts the classifier decides on
//! - [`Bounds`] - Element positioning in document coordinates

use serde::{Deserialize, Serialize};
use std::fmt;

pub use crate::window::WindowSize;

/// Document type as detected from the viewer's DOM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    /// Pages are served as raster images (`img.absimg`)
    ImageScan,
    /// Pages are rendered as text layers (`div.text_layer`)
    RenderedText,
    /// No recognizable layout markers were found
    Unknown,
}

impl Classification {
    /// Text-layer presence wins over image presence; neither means Unknown.
    pub fn from_counts(counts: MarkerCounts) -> Self {
        if counts.text_layers > 0 {
            Classification::RenderedText
        } else if counts.image_pages > 0 {
            Classification::ImageScan
        } else {
            Classification::Unknown
        }
    }

    /// The capture strategy for this classification, if any.
    pub fn mode(self) -> Option<HarvestMode> {
        match self {
            Classification::ImageScan => Some(HarvestMode::ImageScan),
            Classification::RenderedText => Some(HarvestMode::RenderedText),
            Classification::Unknown => None,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Classification::ImageScan => "image-scan",
            Classification::RenderedText => "rendered-text",
            Classification::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// How the harvester captures pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HarvestMode {
    /// Collect remote image URLs per page container
    ImageScan,
    /// Screenshot each page container's bounding box
    RenderedText,
}

impl From<HarvestMode> for Classification {
    fn from(mode: HarvestMode) -> Self {
        match mode {
            HarvestMode::ImageScan => Classification::ImageScan,
            HarvestMode::RenderedText => Classification::RenderedText,
        }
    }
}

/// Marker counts read from the viewer DOM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerCounts {
    pub text_layers: u64,
    pub image_pages: u64,
}

/// Rectangle bounds of an element, in CSS pixels relative to the document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    /// Finite coordinates and a strictly positive size.
    pub fn is_well_formed(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width > 0.0
            && self.height > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_layers_classify_as_rendered_text() {
        let counts = MarkerCounts {
            text_layers: 3,
            image_pages: 0,
        };
        assert_eq!(
            Classification::from_counts(counts),
            Classification::RenderedText
        );
    }

    #[test]
    fn images_only_classify_as_image_scan() {
        let counts = MarkerCounts {
            text_layers: 0,
            image_pages: 5,
        };
        assert_eq!(Classification::from_counts(counts), Classification::ImageScan);
    }

    #[test]
    fn text_layer_presence_wins_over_image_count() {
        let counts = MarkerCounts {
            text_layers: 1,
            image_pages: 40,
        };
        assert_eq!(
            Classification::from_counts(counts),
            Classification::RenderedText
        );
    }

    #[test]
    fn no_markers_is_unknown() {
        assert_eq!(
            Classification::from_counts(MarkerCounts::default()),
            Classification::Unknown
        );
        assert!(Classification::Unknown.mode().is_none());
    }

    #[test]
    fn malformed_bounds_are_rejected() {
        let ok = Bounds {
            x: 0.0,
            y: 120.5,
            width: 800.0,
            height: 1100.0,
        };
        assert!(ok.is_well_formed());
        assert!(!Bounds { width: 0.0, ..ok }.is_well_formed());
        assert!(!Bounds { height: -4.0, ..ok }.is_well_formed());
        assert!(!Bounds { y: f64::NAN, ..ok }.is_well_formed());
    }

    #[test]
    fn classification_serializes_kebab_case() {
        let json = serde_json::to_string(&Classification::RenderedText).unwrap();
        assert_eq!(json, "\"rendered-text\"");
        assert_eq!(Classification::ImageScan.to_string(), "image-scan");
    }
}
