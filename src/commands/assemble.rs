use std::path::PathBuf;
use std::process::ExitCode;

use docharvest_lib::assemble::page_images_in;
use docharvest_lib::output::AssembleOutput;
use docharvest_lib::{
    assemble_images, assemble_with_text_layer, default_engine, Config, DocharvestOutput,
    HarvestError, OcrError, OcrMode, Stage,
};
use tracing::warn;

use super::Context;
use crate::cli::AssembleArgs;

/// Run the assemble command.
pub async fn run_assemble(ctx: &Context, args: AssembleArgs) -> ExitCode {
    match assemble(ctx, args) {
        Ok(body) => ctx.finish(&body, ExitCode::SUCCESS),
        Err(err) => ctx.fail(err),
    }
}

fn assemble(ctx: &Context, args: AssembleArgs) -> Result<DocharvestOutput, HarvestError> {
    let mut config = ctx.load_config()?;
    if let Some(mode) = args.ocr {
        config.ocr.mode = mode;
    }
    ctx.finalize_config(&config)?;

    let pages = collect_inputs(&args.inputs)?;
    if pages.is_empty() {
        return Err(HarvestError::assembly("no page images found in the given inputs"));
    }
    let output = args
        .pdf
        .clone()
        .unwrap_or_else(|| default_document_path(&config));

    let progress = ctx.progress();
    progress.started(
        Stage::Assemble,
        format!("Writing {} pages to {}", pages.len(), output.display()),
    );

    // Loose page images carry no document type, so auto means "if an engine exists".
    let engine = match config.ocr.mode {
        OcrMode::Never => None,
        OcrMode::Always => Some(
            default_engine(&config.ocr.engine).ok_or(HarvestError::Ocr(OcrError::NotAvailable))?,
        ),
        OcrMode::Auto => {
            let engine = default_engine(&config.ocr.engine);
            if engine.is_none() {
                warn!("no OCR engine available; writing an image-only PDF");
            }
            engine
        }
    };

    let result = match engine {
        Some(engine) => {
            assemble_with_text_layer(&pages, &output, engine.as_ref(), config.ocr.engine.upscale)
        }
        None => assemble_images(&pages, &output),
    };
    let summary = match result {
        Ok(summary) => summary,
        Err(err) => {
            progress.failed(Stage::Assemble, err.to_string());
            return Err(err);
        }
    };
    progress.completed(
        Stage::Assemble,
        format!("{} pages written to {}", summary.pages, output.display()),
    );

    Ok(DocharvestOutput::Assemble(AssembleOutput::from_summary(
        pages.len(),
        summary,
    )))
}

/// A single directory expands to its page images; files are taken as given.
fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, HarvestError> {
    if let [dir] = inputs {
        if dir.is_dir() {
            return page_images_in(dir);
        }
    }
    for path in inputs {
        if !path.is_file() {
            return Err(HarvestError::Config(format!(
                "page image {} does not exist",
                path.display()
            )));
        }
    }
    Ok(inputs.to_vec())
}

fn default_document_path(config: &Config) -> PathBuf {
    config
        .output
        .directory
        .join(format!("{}.pdf", config.output.base_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn directory_input_expands_to_sorted_pages() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["page_002.png", "page_001.png"] {
            RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]))
                .save(dir.path().join(name))
                .unwrap();
        }
        let pages = collect_inputs(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(
            pages,
            vec![dir.path().join("page_001.png"), dir.path().join("page_002.png")]
        );
    }

    #[test]
    fn missing_file_input_is_a_config_error() {
        let err = collect_inputs(&[PathBuf::from("/nonexistent/page.png")]).unwrap_err();
        assert!(matches!(err, HarvestError::Config(_)));
    }

    #[test]
    fn default_path_comes_from_output_section() {
        let mut config = Config::default();
        config.output.base_name = "meditations".into();
        assert_eq!(
            default_document_path(&config),
            PathBuf::from("output/meditations.pdf")
        );
    }
}
