mod cli;
mod commands;
mod formatting;
mod settings;

use std::process::ExitCode;

use cli::Commands;
use commands::{run_assemble, run_classify, run_extract, Context};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    run().await
}

async fn run() -> ExitCode {
    let raw_args: Vec<String> = std::env::args().collect();
    let args = cli::parse();
    init_tracing(args.verbose);

    let ctx = Context::new(raw_args, &args);
    match args.command {
        Commands::Extract(extract) => run_extract(&ctx, extract).await,
        Commands::Classify(classify) => run_classify(&ctx, classify).await,
        Commands::Assemble(assemble) => run_assemble(&ctx, assemble).await,
    }
}

/// Logs go to stderr; `RUST_LOG` wins over the `--verbose` default.
fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        "warn,docharvest=debug,docharvest_lib=debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
