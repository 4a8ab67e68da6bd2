use std::fmt::Write as FmtWrite;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use docharvest_lib::output::OUTPUT_VERSION;
use docharvest_lib::{Classification, DocharvestOutput, ErrorOutput, HarvestError};

use crate::cli::OutputFormat;

/// Write output in the requested format.
pub fn write_output(
    body: &DocharvestOutput,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => write_json_output(body, output.as_deref())?,
        OutputFormat::Pretty => write_pretty_output(body, output.as_deref())?,
    };
    Ok(())
}

/// Render an error and return the appropriate exit code.
pub fn render_error(err: HarvestError, format: OutputFormat, output: Option<PathBuf>) -> ExitCode {
    let code = exit_code_for_error(&err);
    let error_payload = err.to_payload();
    let payload = DocharvestOutput::Error(ErrorOutput {
        version: OUTPUT_VERSION.to_string(),
        message: Some(error_payload.message.clone()),
        error: error_payload,
    });

    match format {
        OutputFormat::Json => {
            let content =
                serde_json::to_string(&payload).unwrap_or_else(|_| "{\"mode\":\"error\"}".into());
            if let Some(path) = output {
                if let Err(write_err) = std::fs::write(&path, &content) {
                    eprintln!("Failed to write error output: {}", write_err);
                    println!("{content}");
                }
            } else {
                println!("{content}");
            }
        }
        OutputFormat::Pretty => {
            if let Err(write_err) = write_pretty_output(&payload, output.as_deref()) {
                eprintln!("Failed to write error output: {}", write_err);
            }
        }
    };

    code
}

/// Exit code 1 is a graceful abort on an unrecognized layout; every other
/// error is fatal (2).
pub fn exit_code_for_error(err: &HarvestError) -> ExitCode {
    match err {
        HarvestError::UnrecognizedLayout(_) => ExitCode::from(1),
        _ => ExitCode::from(2),
    }
}

/// Determine exit code for the classify command.
pub fn exit_code_for_classification(classification: Classification) -> ExitCode {
    match classification {
        Classification::Unknown => ExitCode::from(1),
        _ => ExitCode::SUCCESS,
    }
}

/// Write JSON output to file or stdout.
fn write_json_output(
    body: &DocharvestOutput,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = serde_json::to_string(body)?;
    if let Some(path) = output {
        std::fs::write(path, content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Write pretty output to file or stdout.
fn write_pretty_output(body: &DocharvestOutput, output: Option<&Path>) -> io::Result<()> {
    let stdout_is_tty = std::io::stdout().is_terminal();
    let use_human = output.is_none() && stdout_is_tty;

    if use_human {
        let content = format_pretty(body, true);
        println!("{content}");
        return Ok(());
    }

    // Non-tty or file output: keep JSON shape for pipelines/files.
    let content =
        serde_json::to_string_pretty(body).unwrap_or_else(|_| "{\"mode\":\"error\"}".to_string());
    if let Some(path) = output {
        std::fs::write(path, &content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Format output for human consumption in a terminal.
pub fn format_pretty(body: &DocharvestOutput, colorize: bool) -> String {
    match body {
        DocharvestOutput::Extract(out) => {
            let mut buf = String::new();
            let complete = out.missing_ordinals.is_empty();
            let status = if complete { "DONE" } else { "PARTIAL" };
            let status_colored = color(status, if complete { "32" } else { "33" }, colorize);
            writeln!(buf, "{} {}", status_colored, out.document_path.display()).ok();
            writeln!(buf, "Source: {}", out.url).ok();
            writeln!(buf, "Document type: {}", out.classification).ok();
            writeln!(
                buf,
                "Pages: {} of {} assembled",
                out.assembled_pages, out.total_pages
            )
            .ok();
            if out.text_layer_pages > 0 {
                writeln!(buf, "Searchable pages: {}", out.text_layer_pages).ok();
            }
            if !complete {
                let ordinals: Vec<String> =
                    out.missing_ordinals.iter().map(|o| o.to_string()).collect();
                writeln!(
                    buf,
                    "{} {}",
                    color("Missing pages:", "33", colorize),
                    ordinals.join(", ")
                )
                .ok();
                for failure in &out.failures {
                    writeln!(buf, "- page {}: {}", failure.ordinal, failure.reason).ok();
                }
            }
            if !out.ocr_failures.is_empty() {
                writeln!(buf, "OCR failed on {} pages:", out.ocr_failures.len()).ok();
                for failure in &out.ocr_failures {
                    writeln!(buf, "- {}: {}", failure.path.display(), failure.reason).ok();
                }
            }
            if let Some(dir) = &out.pages_dir {
                writeln!(buf, "Page images kept in {}", dir.display()).ok();
            }
            buf
        }
        DocharvestOutput::Classify(out) => {
            let mut buf = String::new();
            let code = match out.classification {
                Classification::Unknown => "31",
                _ => "36",
            };
            let header = color("[CLASSIFY]", code, colorize);
            writeln!(buf, "{} {}", header, out.classification).ok();
            writeln!(buf, "Source: {}", out.url).ok();
            if out.harvest_mode.is_none() {
                writeln!(buf, "No text layers or page images were found.").ok();
            }
            buf
        }
        DocharvestOutput::Assemble(out) => {
            let mut buf = String::new();
            let header = color("[ASSEMBLE]", "34", colorize);
            writeln!(buf, "{} {}", header, out.document_path.display()).ok();
            writeln!(buf, "Pages: {} of {} inputs", out.pages, out.inputs).ok();
            if out.text_layer_pages > 0 {
                writeln!(buf, "Searchable pages: {}", out.text_layer_pages).ok();
            }
            if !out.skipped.is_empty() {
                writeln!(buf, "Skipped:").ok();
                for skipped in &out.skipped {
                    writeln!(buf, "- {}: {}", skipped.path.display(), skipped.reason).ok();
                }
            }
            buf
        }
        DocharvestOutput::Error(out) => {
            let mut buf = String::new();
            let header = color("[ERROR]", "31", colorize);
            let message = out
                .message
                .as_deref()
                .unwrap_or_else(|| out.error.message.as_str());
            writeln!(buf, "{} {}", header, message).ok();
            if let Some(remediation) = &out.error.remediation {
                writeln!(buf, "Hint: {}", remediation).ok();
            }
            buf
        }
    }
}

/// Apply ANSI color codes when enabled.
fn color(text: &str, code: &str, colorize: bool) -> String {
    if colorize {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    } else {
        text.to_string()
    }
}
