use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use site_cloner::{AssetCategory, CloneReport, CloneTarget, Cloner, ClonerConfig, ProgressEvent};

/// Capture an offline snapshot of a web page: DOM, assets and screenshots.
#[derive(Debug, Parser)]
#[command(name = "site-cloner", version, about)]
struct Cli {
    /// Page to clone. `https://` is assumed when no scheme is given.
    url: String,

    /// Output directory. Defaults to `cloned_<domain>`.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON config file. Defaults to `<config dir>/site-cloner/config.json` if present.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run the browser without a window.
    #[arg(long)]
    headless: bool,

    /// Chrome/Chromium executable.
    #[arg(long)]
    chrome: Option<PathBuf>,

    /// Maximum concurrent asset downloads.
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<ClonerConfig> {
    let mut config = match &cli.config {
        Some(path) => ClonerConfig::load(path)?,
        None => ClonerConfig::load_default()?,
    };
    if cli.headless {
        config.headless = true;
    }
    if let Some(chrome) = &cli.chrome {
        config.chrome_path = Some(chrome.clone());
    }
    if let Some(concurrency) = cli.concurrency {
        config.max_concurrent_downloads = concurrency;
    }
    Ok(config)
}

fn print_summary(report: &CloneReport) {
    println!();
    println!("Clone of {} ({:.1}s)", report.target.url(), report.elapsed.as_secs_f64());
    for category in AssetCategory::ALL {
        println!(
            "  {:<12} {:>4} found, {:>4} saved",
            category.directory(),
            report.manifest.count(category),
            report.downloads.saved(category)
        );
    }
    if !report.downloads.failed.is_empty() {
        println!("  {} assets could not be downloaded", report.downloads.failed.len());
    }
    println!("  {} bytes written", report.downloads.bytes_written);
    println!("  manifest: {}", report.manifest_path.display());
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let target = match &cli.output {
        Some(root) => CloneTarget::with_output_root(&cli.url, root.clone()),
        None => CloneTarget::parse(&cli.url),
    }
    .with_context(|| format!("cannot clone {:?}", cli.url))?;

    let cloner = Cloner::new(target, config)?;
    println!("Starting web cloning for: {}", cloner.target().url());

    let report = cloner
        .clone_site_with_callback(|progress| match progress.event {
            ProgressEvent::AssetFailed => eprintln!("  ! {}", progress.message),
            _ => println!("  {}", progress.message),
        })
        .await
        .with_context(|| format!("error during cloning of {}", cloner.target().url()))?;

    print_summary(&report);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}
