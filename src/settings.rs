use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use docharvest_lib::{
    ChromiumLauncher, Config, FixtureLauncher, HarvestError, SessionLauncher,
};
use tracing::debug;

use crate::cli::{BrowserArgs, ExtractArgs};

/// Checks if a flag was present in the command-line arguments.
pub fn flag_present(args: &[String], flag: &str) -> bool {
    args.iter()
        .any(|arg| arg == flag || arg.starts_with(&format!("{flag}=")))
}

/// Load config from a TOML file, central config, or return defaults.
/// Priority: explicit path > ~/.config/docharvest/config.toml > defaults
pub fn load_config(path: Option<&Path>) -> Result<Config, HarvestError> {
    let cfg = Config::load(path).map_err(|e| {
        let loc = path
            .map(|p| p.display().to_string())
            .or_else(|| Config::central_config_path().map(|p| p.display().to_string()))
            .unwrap_or_else(|| "defaults".to_string());
        HarvestError::Config(format!("Failed to read config {}: {}", loc, e))
    })?;

    cfg.validate().map_err(|e| {
        let prefix = path
            .map(|p| format!("Invalid config ({}): {}", p.display(), e))
            .unwrap_or_else(|| format!("Invalid config: {}", e));
        HarvestError::Config(prefix)
    })?;
    Ok(cfg)
}

/// Merge browser flags into `config`, preferring CLI when flags are present.
///
/// Flags with a clap default only win when they were typed.
pub fn apply_browser_args(config: &mut Config, args: &BrowserArgs, raw_args: &[String]) {
    if let Some(executable) = &args.browser {
        config.browser.executable = Some(executable.clone());
    }
    if let Some(remote) = &args.remote_browser {
        config.browser.remote_url = Some(remote.clone());
    }
    if args.headed {
        config.browser.headless = false;
    }
    if flag_present(raw_args, "--window") {
        config.browser.window = args.window;
    }
    if flag_present(raw_args, "--nav-timeout") {
        config.browser.navigation_timeout = Duration::from_secs(args.nav_timeout);
    }
}

/// Merge extract flags into `config`.
pub fn apply_extract_args(config: &mut Config, args: &ExtractArgs, raw_args: &[String]) {
    apply_browser_args(config, &args.browser, raw_args);
    if let Some(dir) = &args.output_dir {
        config.output.directory = dir.clone();
    }
    if let Some(name) = &args.name {
        config.output.base_name = name.clone();
    }
    if args.keep_pages {
        config.output.keep_intermediate = true;
    }
    if let Some(mode) = args.ocr {
        config.ocr.mode = mode;
    }
    if let Some(policy) = args.missing_pages {
        config.output.missing_pages = policy;
    }
    if flag_present(raw_args, "--download-timeout") {
        config.download.timeout = Duration::from_secs(args.download_timeout);
    }
}

/// Fixture backend when `--fixture` is given, Chromium otherwise.
pub fn launcher_for(
    args: &BrowserArgs,
    config: &Config,
) -> Result<Arc<dyn SessionLauncher>, HarvestError> {
    match &args.fixture {
        Some(path) => {
            debug!(fixture = %path.display(), "using static DOM fixture");
            Ok(Arc::new(FixtureLauncher::from_path(path)?))
        }
        None => Ok(Arc::new(ChromiumLauncher::new(config.browser_options()))),
    }
}

/// Format effective config as a single-line string.
pub fn format_effective_config(config: &Config, config_source: Option<&Path>) -> String {
    let source = config_source
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());
    let browser = match (&config.browser.remote_url, &config.browser.executable) {
        (Some(remote), _) => format!("remote {remote}"),
        (None, Some(exe)) => exe.display().to_string(),
        (None, None) => "auto".to_string(),
    };
    format!(
        "Effective config [{source}]: browser={browser}, headless={}, window={}x{}, timeouts: nav={}s, download={}s, scroll: step={}px, pause={}ms, max_steps={}, ocr={:?} ({}, x{}), output={}/{}.pdf, keep_pages={}, missing_pages={:?}",
        config.browser.headless,
        config.browser.window.width,
        config.browser.window.height,
        config.browser.navigation_timeout.as_secs(),
        config.download.timeout.as_secs(),
        config.scroll.step,
        config.scroll.pause.as_millis(),
        config.scroll.max_steps,
        config.ocr.mode,
        config.ocr.engine.language,
        config.ocr.engine.upscale,
        config.output.directory.display(),
        config.output.base_name,
        config.output.keep_intermediate,
        config.output.missing_pages,
    )
}
