mod assemble;
mod classify;
mod extract;

pub use assemble::run_assemble;
pub use classify::run_classify;
pub use extract::run_extract;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use docharvest_lib::{
    Config, DocharvestOutput, DocumentRef, HarvestError, HarvestOptions, Progress, ProgressEvent,
};
use tracing::debug;

use crate::cli::{BrowserArgs, Cli, OutputFormat};
use crate::formatting::{render_error, write_output};
use crate::settings::{format_effective_config, load_config};

/// Global flags every command shares.
pub struct Context {
    pub raw_args: Vec<String>,
    pub config_path: Option<PathBuf>,
    pub quiet: bool,
    pub format: OutputFormat,
    pub output: Option<PathBuf>,
}

impl Context {
    pub fn new(raw_args: Vec<String>, cli: &Cli) -> Self {
        Self {
            raw_args,
            config_path: cli.config.clone(),
            quiet: cli.quiet,
            format: cli.format,
            output: cli.output.clone(),
        }
    }

    pub fn load_config(&self) -> Result<Config, HarvestError> {
        load_config(self.config_path.as_deref())
    }

    /// Re-validates after CLI overrides and logs the merged result.
    pub fn finalize_config(&self, config: &Config) -> Result<(), HarvestError> {
        config
            .validate()
            .map_err(|e| HarvestError::Config(format!("Invalid settings: {e}")))?;
        debug!(
            "{}",
            format_effective_config(config, self.config_path.as_deref())
        );
        Ok(())
    }

    /// Progress lines on stderr unless `--quiet`.
    pub fn progress(&self) -> Progress {
        if self.quiet {
            return Progress::silent();
        }
        Progress::new(Some(Arc::new(|event: &ProgressEvent| {
            eprintln!("{event}");
        })))
    }

    pub fn fail(&self, err: HarvestError) -> ExitCode {
        render_error(err, self.format, self.output.clone())
    }

    /// Writes `body` and returns `code`, or a fatal code when writing fails.
    pub fn finish(&self, body: &DocharvestOutput, code: ExitCode) -> ExitCode {
        match write_output(body, self.format, self.output.clone()) {
            Ok(()) => code,
            Err(err) => self.fail(HarvestError::Config(err.to_string())),
        }
    }
}

pub(crate) fn parse_reference(url: &str) -> Result<DocumentRef, HarvestError> {
    DocumentRef::parse(url).map_err(|e| HarvestError::Config(e.to_string()))
}

/// Fixture pages are static, so their runs skip every rendering pause.
pub(crate) fn harvest_options(config: &Config, browser: &BrowserArgs) -> HarvestOptions {
    if browser.fixture.is_some() {
        let mut options = HarvestOptions::without_pauses();
        options.scroll.step = config.scroll.step;
        options.scroll.max_steps = config.scroll.max_steps;
        return options;
    }
    config.harvest_options()
}
