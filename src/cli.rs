use clap::{Args, Parser, Subcommand, ValueEnum};
use docharvest_lib::{MissingPagePolicy, OcrMode, WindowSize};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docharvest")]
#[command(
    version,
    about = "Document Harvester - Capture pages from web document viewers into a PDF",
    long_about = "Document Harvester (docharvest)\n\nModes:\n- extract: classify a document viewer page, harvest every page (image scans are downloaded, rendered text is captured) and assemble a PDF.\n- classify: report whether a document is an image scan or rendered text.\n- assemble: build a PDF from page images already on disk.\n\nUse --help on any subcommand for details."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, short, global = true, help = "Do not print progress to stderr")]
    pub quiet: bool,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Optional config file (TOML) to set defaults for browser/scroll/download/ocr/output; CLI flags override config"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value = "json",
        help = "Report format"
    )]
    pub format: OutputFormat,

    #[arg(
        long,
        short,
        global = true,
        help = "Report file path (stdout if omitted)"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Harvest a document and assemble it into a PDF
    Extract(ExtractArgs),

    /// Detect whether a document is an image scan or rendered text
    Classify(ClassifyArgs),

    /// Assemble page images already on disk into a PDF
    Assemble(AssembleArgs),
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    #[arg(help = "Document viewer URL (prompted for on stdin when omitted)")]
    pub url: Option<String>,

    #[command(flatten)]
    pub browser: BrowserArgs,

    #[arg(
        long,
        value_name = "PATH",
        help = "Directory for the PDF and page images"
    )]
    pub output_dir: Option<PathBuf>,

    #[arg(
        long,
        value_name = "NAME",
        help = "File name of the PDF, without extension"
    )]
    pub name: Option<String>,

    #[arg(long, help = "Keep the page images after assembly")]
    pub keep_pages: bool,

    #[arg(
        long,
        value_name = "MODE",
        help = "OCR text layer: auto, always or never"
    )]
    pub ocr: Option<OcrMode>,

    #[arg(
        long,
        value_name = "POLICY",
        help = "Pages that could not be saved: gap (leave out) or placeholder (blank page)"
    )]
    pub missing_pages: Option<MissingPagePolicy>,

    #[arg(
        long,
        default_value = "15",
        help = "Timeout (seconds) for each page image download"
    )]
    pub download_timeout: u64,
}

#[derive(Args, Debug)]
pub struct ClassifyArgs {
    #[arg(help = "Document viewer URL")]
    pub url: String,

    #[command(flatten)]
    pub browser: BrowserArgs,
}

#[derive(Args, Debug)]
pub struct AssembleArgs {
    #[arg(
        required = true,
        value_name = "DIR_OR_FILES",
        help = "A directory of page images (sorted by file name) or image files in page order"
    )]
    pub inputs: Vec<PathBuf>,

    #[arg(
        long,
        value_name = "PATH",
        help = "PDF to write (default: <output dir>/<name>.pdf from config)"
    )]
    pub pdf: Option<PathBuf>,

    #[arg(
        long,
        value_name = "MODE",
        help = "OCR text layer: auto, always or never"
    )]
    pub ocr: Option<OcrMode>,
}

/// Browser selection shared by the commands that open a document.
#[derive(Args, Debug, Clone)]
pub struct BrowserArgs {
    #[arg(
        long,
        value_name = "PATH",
        help = "Chrome, Chromium or Edge executable"
    )]
    pub browser: Option<PathBuf>,

    #[arg(
        long,
        value_name = "URL",
        help = "DevTools endpoint of a running browser (http://host:9222 or ws://...)"
    )]
    pub remote_browser: Option<String>,

    #[arg(long, help = "Show the browser window")]
    pub headed: bool,

    #[arg(
        long,
        default_value = "1920x2000",
        help = "Browser window size (WIDTHxHEIGHT)"
    )]
    pub window: WindowSize,

    #[arg(
        long,
        default_value = "60",
        help = "Navigation timeout (seconds) for opening the document"
    )]
    pub nav_timeout: u64,

    #[arg(
        long,
        value_name = "PATH",
        help = "Static DOM fixture (JSON) used instead of a browser"
    )]
    pub fixture: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Pretty,
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands, OutputFormat};
    use clap::Parser;
    use docharvest_lib::{MissingPagePolicy, OcrMode};
    use std::path::Path;

    #[test]
    fn extract_command_uses_defaults() {
        let cli = Cli::parse_from([
            "docharvest",
            "extract",
            "https://www.example.com/document/434649239/Meditations",
        ]);

        assert!(!cli.verbose);
        assert!(!cli.quiet);
        assert!(cli.config.is_none());
        assert!(matches!(cli.format, OutputFormat::Json));

        match cli.command {
            Commands::Extract(args) => {
                assert_eq!(
                    args.url.as_deref(),
                    Some("https://www.example.com/document/434649239/Meditations")
                );
                assert!(args.output_dir.is_none());
                assert!(args.name.is_none());
                assert!(!args.keep_pages);
                assert!(args.ocr.is_none());
                assert!(args.missing_pages.is_none());
                assert_eq!(args.download_timeout, 15);
                assert_eq!(args.browser.window.width, 1920);
                assert_eq!(args.browser.window.height, 2000);
                assert_eq!(args.browser.nav_timeout, 60);
                assert!(!args.browser.headed);
                assert!(args.browser.fixture.is_none());
            }
            _ => panic!("expected extract command"),
        }
    }

    #[test]
    fn extract_command_respects_overrides() {
        let cli = Cli::parse_from([
            "docharvest",
            "--quiet",
            "extract",
            "https://www.example.com/document/1/x",
            "--output-dir",
            "books",
            "--name",
            "meditations",
            "--keep-pages",
            "--ocr",
            "never",
            "--missing-pages",
            "placeholder",
            "--browser",
            "/usr/bin/chromium",
            "--remote-browser",
            "http://127.0.0.1:9222",
            "--headed",
            "--window",
            "1280x4000",
            "--nav-timeout",
            "90",
            "--download-timeout",
            "30",
            "--format",
            "pretty",
            "--output",
            "report.json",
        ]);

        assert!(cli.quiet);
        assert!(matches!(cli.format, OutputFormat::Pretty));
        assert_eq!(cli.output.as_deref(), Some(Path::new("report.json")));

        match cli.command {
            Commands::Extract(args) => {
                assert_eq!(args.output_dir.as_deref(), Some(Path::new("books")));
                assert_eq!(args.name.as_deref(), Some("meditations"));
                assert!(args.keep_pages);
                assert_eq!(args.ocr, Some(OcrMode::Never));
                assert_eq!(args.missing_pages, Some(MissingPagePolicy::Placeholder));
                assert_eq!(
                    args.browser.browser.as_deref(),
                    Some(Path::new("/usr/bin/chromium"))
                );
                assert_eq!(
                    args.browser.remote_browser.as_deref(),
                    Some("http://127.0.0.1:9222")
                );
                assert!(args.browser.headed);
                assert_eq!(args.browser.window.height, 4000);
                assert_eq!(args.browser.nav_timeout, 90);
                assert_eq!(args.download_timeout, 30);
            }
            _ => panic!("expected extract command with overrides"),
        }
    }

    #[test]
    fn extract_url_is_optional() {
        let cli = Cli::parse_from(["docharvest", "extract"]);
        match cli.command {
            Commands::Extract(args) => assert!(args.url.is_none()),
            _ => panic!("expected extract command"),
        }
    }

    #[test]
    fn assemble_takes_files_and_sets_verbose() {
        let cli = Cli::parse_from([
            "docharvest",
            "--verbose",
            "assemble",
            "page_001.png",
            "page_002.jpg",
            "--pdf",
            "out.pdf",
        ]);

        assert!(cli.verbose);
        match cli.command {
            Commands::Assemble(args) => {
                assert_eq!(args.inputs.len(), 2);
                assert_eq!(args.pdf.as_deref(), Some(Path::new("out.pdf")));
                assert!(args.ocr.is_none());
            }
            _ => panic!("expected assemble command"),
        }
    }

    #[test]
    fn assemble_requires_inputs() {
        assert!(Cli::try_parse_from(["docharvest", "assemble"]).is_err());
    }

    #[test]
    fn invalid_window_is_rejected() {
        assert!(Cli::try_parse_from([
            "docharvest",
            "classify",
            "https://www.example.com/document/1/x",
            "--window",
            "wide",
        ])
        .is_err());
    }
}
