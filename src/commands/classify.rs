use std::process::ExitCode;

use docharvest_lib::output::{ClassifyOutput, OUTPUT_VERSION};
use docharvest_lib::{classify, DocharvestOutput, HarvestError};

use super::{harvest_options, parse_reference, Context};
use crate::cli::ClassifyArgs;
use crate::formatting::exit_code_for_classification;
use crate::settings::{apply_browser_args, launcher_for};

/// Run the classify command. An unrecognized layout is reported and exits 1.
pub async fn run_classify(ctx: &Context, args: ClassifyArgs) -> ExitCode {
    match classify_document(ctx, args).await {
        Ok(out) => {
            let code = exit_code_for_classification(out.classification);
            ctx.finish(&DocharvestOutput::Classify(out), code)
        }
        Err(err) => ctx.fail(err),
    }
}

async fn classify_document(
    ctx: &Context,
    args: ClassifyArgs,
) -> Result<ClassifyOutput, HarvestError> {
    let mut config = ctx.load_config()?;
    apply_browser_args(&mut config, &args.browser, &ctx.raw_args);
    ctx.finalize_config(&config)?;

    let reference = parse_reference(&args.url)?;
    let launcher = launcher_for(&args.browser, &config)?;
    let classification = classify(
        launcher.as_ref(),
        &reference,
        &harvest_options(&config, &args.browser),
        &ctx.progress(),
    )
    .await;

    Ok(ClassifyOutput {
        version: OUTPUT_VERSION.to_string(),
        url: reference.as_str().to_string(),
        classification,
        harvest_mode: classification.mode(),
    })
}
