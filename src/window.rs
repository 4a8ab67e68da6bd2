use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Browser window size used for every session.
///
/// The default is tall enough that most viewer pages fit in one screen,
/// which keeps region captures inside the rendered surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl Default for WindowSize {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 2000,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowParseError {
    #[error("Invalid window size: expected WIDTHxHEIGHT (e.g., 1920x2000)")]
    InvalidFormat,
    #[error("Invalid width: {0}")]
    InvalidWidth(String),
    #[error("Invalid height: {0}")]
    InvalidHeight(String),
    #[error("Window dimensions must be positive")]
    Zero,
}

impl FromStr for WindowSize {
    type Err = WindowParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or(WindowParseError::InvalidFormat)?;

        let width: u32 = w
            .trim()
            .parse()
            .map_err(|_| WindowParseError::InvalidWidth(w.trim().to_string()))?;
        let height: u32 = h
            .trim()
            .parse()
            .map_err(|_| WindowParseError::InvalidHeight(h.trim().to_string()))?;

        if width == 0 || height == 0 {
            return Err(WindowParseError::Zero);
        }

        Ok(WindowSize { width, height })
    }
}

impl std::fmt::Display for WindowSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// Config files store the size as "WIDTHxHEIGHT", same as the CLI flag.
impl Serialize for WindowSize {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WindowSize {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_width_by_height() {
        let size: WindowSize = "1280x4000".parse().unwrap();
        assert_eq!(size.width, 1280);
        assert_eq!(size.height, 4000);
    }

    #[test]
    fn tolerates_spaces_and_uppercase_separator() {
        let size: WindowSize = " 1024 X 768 ".parse().unwrap();
        assert_eq!(
            size,
            WindowSize {
                width: 1024,
                height: 768,
            }
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(
            "1920".parse::<WindowSize>(),
            Err(WindowParseError::InvalidFormat)
        );
        assert!("1920x2000x3".parse::<WindowSize>().is_err());
        assert!("widex900".parse::<WindowSize>().is_err());
        assert_eq!("0x900".parse::<WindowSize>(), Err(WindowParseError::Zero));
    }

    #[test]
    fn default_is_tall_viewer_window() {
        assert_eq!(WindowSize::default().to_string(), "1920x2000");
    }

    #[test]
    fn round_trips_through_toml_string() {
        #[derive(Deserialize)]
        struct Holder {
            window: WindowSize,
        }
        let holder: Holder = toml::from_str("window = \"800x600\"").unwrap();
        assert_eq!(
            holder.window,
            WindowSize {
                width: 800,
                height: 600,
            }
        );
    }
}
