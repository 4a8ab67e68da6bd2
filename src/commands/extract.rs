use std::process::ExitCode;

use docharvest_lib::output::ExtractOutput;
use docharvest_lib::{DocharvestOutput, Downloader, ExtractRequest, Extractor, HarvestError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use super::{harvest_options, parse_reference, Context};
use crate::cli::ExtractArgs;
use crate::settings::{apply_extract_args, launcher_for};

/// Run the extract command.
pub async fn run_extract(ctx: &Context, args: ExtractArgs) -> ExitCode {
    match extract(ctx, args).await {
        Ok(body) => ctx.finish(&body, ExitCode::SUCCESS),
        Err(err) => ctx.fail(err),
    }
}

async fn extract(ctx: &Context, args: ExtractArgs) -> Result<DocharvestOutput, HarvestError> {
    let mut config = ctx.load_config()?;
    apply_extract_args(&mut config, &args, &ctx.raw_args);
    ctx.finalize_config(&config)?;

    let url = match &args.url {
        Some(url) => url.clone(),
        None => prompt_for_url().await?,
    };
    let reference = parse_reference(&url)?;

    let launcher = launcher_for(&args.browser, &config)?;
    info!(backend = launcher.name(), "browser backend selected");
    let downloader = Downloader::new(config.download.timeout, &config.download.user_agent)?;
    let extractor = Extractor::new(launcher, downloader)
        .with_harvest_options(harvest_options(&config, &args.browser))
        .with_ocr_options(config.ocr.engine.clone())
        .with_progress(ctx.progress());

    let request = ExtractRequest {
        reference,
        output_dir: config.output.directory.clone(),
        base_name: config.output.base_name.clone(),
        keep_intermediate: config.output.keep_intermediate,
        ocr_mode: config.ocr.mode,
        missing_pages: config.output.missing_pages,
    };
    let outcome = extractor.extract(&request).await?;
    Ok(DocharvestOutput::Extract(ExtractOutput::from_outcome(
        request.reference.as_str(),
        outcome,
    )))
}

/// Reads the document URL from stdin, prompting on stderr.
async fn prompt_for_url() -> Result<String, HarvestError> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(b"Document URL: ").await?;
    stderr.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;
    let url = line.trim().to_string();
    if url.is_empty() {
        return Err(HarvestError::Config(
            "no document URL given; pass it as an argument or type it at the prompt".into(),
        ));
    }
    Ok(url)
}
