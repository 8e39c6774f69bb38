//! vouch CLI - scripted demo driver for the manual test harness.
//!
//! Runs a human-in-the-loop session over the given files: an
//! availability check first, then one view command per file, then a
//! report. Meant for trying out a viewer build; real suites use the
//! library surface directly.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use vouch::report::ReportFormat;
use vouch::{Session, SessionConfig, TestOptions};

#[derive(Parser)]
#[command(name = "vouch")]
#[command(about = "Human-in-the-loop test harness", long_about = None)]
#[command(version)]
struct Cli {
    /// Session title shown by the viewer
    #[arg(short, long, default_value = "Human Test")]
    title: String,

    /// Path of the remote viewer executable (default: platform lookup)
    #[arg(long)]
    remote: Option<PathBuf>,

    /// Seconds before the availability check gives up
    #[arg(long, default_value_t = 120)]
    verify_timeout: u64,

    /// Base path for the written report (extension added per format)
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Report format: text, html, or markdown
    #[arg(short, long, default_value = "text")]
    format: ReportFormatArg,

    /// Structural heading level for HTML/Markdown reports
    #[arg(long, default_value_t = 3)]
    heading_size: u8,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Files to present for judgment (images by extension, text otherwise)
    files: Vec<PathBuf>,
}

#[derive(Clone, Copy)]
struct ReportFormatArg(ReportFormat);

impl std::str::FromStr for ReportFormatArg {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse().map(ReportFormatArg)
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = SessionConfig::new().with_title(cli.title.clone());
    if let Some(remote) = cli.remote.clone() {
        config = config.with_executable(remote);
    }

    let session = Session::start(config).await;
    if session.launch_code() != 0 {
        info!("viewer unavailable, running unattended");
    }

    let verify = session
        .verify_human(Some(TestOptions {
            timeout: Some(cli.verify_timeout),
            ..TestOptions::default()
        }))
        .await;
    if verify.is_skipped() {
        info!("no human is available, remaining tests will auto-skip");
    }

    if cli.files.is_empty() {
        session
            .show_text(
                "This is some text to be shown. It was entered literally",
                Some(TestOptions {
                    prompt: Some("Does this render correctly?".to_string()),
                    ..TestOptions::default()
                }),
            )
            .await;
    }

    for file in &cli.files {
        let verdict = if is_image(file) {
            session.view_image(file, None).await
        } else {
            session.view_file(file, None).await
        };
        info!("{}: {:?}", file.display(), verdict.verdict().label());
    }

    session.end().await;

    if let Some(base) = &cli.report {
        let path = session.produce_report(base, cli.format.0, cli.heading_size)?;
        info!("report written to {}", path.display());
    }
    println!("{}", session.console_report(true));

    Ok(())
}
