use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::assemble::MissingPagePolicy;
use crate::browser::{BrowserOptions, DEFAULT_NAVIGATION_TIMEOUT, DEFAULT_USER_AGENT};
use crate::download::DEFAULT_DOWNLOAD_TIMEOUT;
use crate::harvest::{HarvestOptions, ScrollPolicy};
use crate::ocr::OcrOptions;
use crate::pipeline::OcrMode;
use crate::types::WindowSize;

const CONFIG_DIR: &str = "docharvest";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserSection,
    pub scroll: ScrollPolicy,
    pub download: DownloadSection,
    pub ocr: OcrSection,
    pub output: OutputSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub executable: Option<PathBuf>,
    pub remote_url: Option<String>,
    pub headless: bool,
    pub window: WindowSize,
    #[serde(with = "humantime_serde")]
    pub navigation_timeout: Duration,
    pub user_agent: String,
    pub extra_args: Vec<String>,
}

impl Default for BrowserSection {
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSection {
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for DownloadSection {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSection {
    pub mode: OcrMode,
    #[serde(flatten)]
    pub engine: OcrOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub directory: PathBuf,
    pub base_name: String,
    pub keep_intermediate: bool,
    pub missing_pages: MissingPagePolicy,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            base_name: "document".to_string(),
            keep_intermediate: false,
            missing_pages: MissingPagePolicy::default(),
        }
    }
}

impl Config {
    /// Priority: explicit path > central config > defaults.
    ///
    /// An explicit path must exist; a missing central config falls back to
    /// defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match Self::central_config_path() {
            Some(central) if central.is_file() => Self::from_file(&central),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, String> {
        let raw = fs::read_to_string(path).map_err(|e| e.to_string())?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, String> {
        toml::from_str(raw).map_err(|e| e.to_string())
    }

    /// `$XDG_CONFIG_HOME/docharvest/config.toml` or the platform equivalent.
    pub fn central_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.scroll.step == 0 {
            return Err("scroll.step must be greater than zero".into());
        }
        if self.scroll.max_steps == 0 {
            return Err("scroll.max_steps must be greater than zero".into());
        }
        if self.browser.navigation_timeout.is_zero() {
            return Err("browser.navigation_timeout must be greater than zero".into());
        }
        if self.download.timeout.is_zero() {
            return Err("download.timeout must be greater than zero".into());
        }
        if self.ocr.engine.upscale == 0 {
            return Err("ocr.upscale must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&self.ocr.engine.min_confidence) {
            return Err("ocr.min_confidence must be between 0.0 and 1.0".into());
        }
        if self.ocr.engine.language.trim().is_empty() {
            return Err("ocr.language cannot be empty".into());
        }
        let base = self.output.base_name.trim();
        if base.is_empty() {
            return Err("output.base_name cannot be empty".into());
        }
        if base.contains(['/', '\\']) {
            return Err("output.base_name must be a file name, not a path".into());
        }
        Ok(())
    }

    pub fn browser_options(&self) -> BrowserOptions {
        BrowserOptions {
            executable: self.browser.executable.clone(),
            remote_url: self.browser.remote_url.clone(),
            headless: self.browser.headless,
            window: self.browser.window,
            navigation_timeout: self.browser.navigation_timeout,
            user_agent: self.browser.user_agent.clone(),
            extra_args: self.browser.extra_args.clone(),
        }
    }

    pub fn harvest_options(&self) -> HarvestOptions {
        HarvestOptions {
            scroll: self.scroll,
            ..HarvestOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_match_expected() {
        let cfg = Config::default();

        assert_eq!(cfg.browser.window, WindowSize::default());
        assert!(cfg.browser.headless);
        assert_eq!(cfg.scroll.step, 500);
        assert_eq!(cfg.scroll.pause, Duration::from_millis(200));
        assert_eq!(cfg.scroll.max_steps, 1000);
        assert_eq!(cfg.download.timeout, Duration::from_secs(15));
        assert_eq!(cfg.ocr.mode, OcrMode::Auto);
        assert_eq!(cfg.ocr.engine.upscale, 2);
        assert_eq!(cfg.output.directory, PathBuf::from("output"));
        assert_eq!(cfg.output.missing_pages, MissingPagePolicy::Gap);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let cfg = Config::from_toml(
            r#"
[browser]
window = "1280x4000"
navigation_timeout = "90s"
remote_url = "http://127.0.0.1:9222"

[scroll]
step = 800
pause = "150ms"

[ocr]
mode = "always"
language = "por"

[output]
base_name = "livro"
missing_pages = "placeholder"
"#,
        )
        .unwrap();

        assert_eq!(
            cfg.browser.window,
            WindowSize {
                width: 1280,
                height: 4000,
            }
        );
        assert_eq!(cfg.browser.navigation_timeout, Duration::from_secs(90));
        assert_eq!(cfg.scroll.step, 800);
        assert_eq!(cfg.scroll.pause, Duration::from_millis(150));
        assert_eq!(cfg.scroll.max_steps, 1000);
        assert_eq!(cfg.ocr.mode, OcrMode::Always);
        assert_eq!(cfg.ocr.engine.language, "por");
        assert_eq!(cfg.ocr.engine.upscale, 2);
        assert_eq!(cfg.output.base_name, "livro");
        assert_eq!(cfg.output.missing_pages, MissingPagePolicy::Placeholder);

        let options = cfg.browser_options();
        assert_eq!(options.remote_url.as_deref(), Some("http://127.0.0.1:9222"));
        assert_eq!(cfg.harvest_options().scroll.step, 800);
    }

    #[test]
    fn validate_rejects_degenerate_values() {
        let mut cfg = Config::default();
        cfg.scroll.step = 0;
        assert!(cfg.validate().unwrap_err().contains("scroll.step"));

        let mut cfg = Config::default();
        cfg.ocr.engine.upscale = 0;
        assert!(cfg.validate().unwrap_err().contains("upscale"));

        let mut cfg = Config::default();
        cfg.output.base_name = "  ".into();
        assert!(cfg.validate().unwrap_err().contains("base_name"));

        let mut cfg = Config::default();
        cfg.output.base_name = "../escape".into();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.download.timeout = Duration::ZERO;
        assert!(cfg.validate().unwrap_err().contains("download.timeout"));
    }

    #[test]
    fn unknown_mode_is_a_parse_error() {
        assert!(Config::from_toml("[ocr]\nmode = \"sometimes\"").is_err());
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn loads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docharvest.toml");
        fs::write(&path, "[download]\ntimeout = \"30s\"\n").unwrap();
        let cfg = Config::load(Some(&path)).unwrap();
        assert_eq!(cfg.download.timeout, Duration::from_secs(30));
    }
}
