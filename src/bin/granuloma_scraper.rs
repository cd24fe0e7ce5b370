use std::process::ExitCode;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing::{info, warn};

use granuloma_scraper::app::App;
use granuloma_scraper::backup;
use granuloma_scraper::config::{ConfigLoader, ConfigOverrides};
use granuloma_scraper::domain::ProfileKind;
use granuloma_scraper::download::{Downloader, HttpTransport, RetryPolicy};
use granuloma_scraper::error::ScraperError;
use granuloma_scraper::logging;
use granuloma_scraper::output::{JsonOutput, LogSink, OutputMode, TextOutput};
use granuloma_scraper::pacing::{ShutdownFlag, ThreadPacer};
use granuloma_scraper::providers::{BingProvider, GoogleProvider};
use granuloma_scraper::store::Store;

#[derive(Parser)]
#[command(name = "granuloma-scraper")]
#[command(about = "Collect lung granuloma histopathology images sorted by stain")]
#[command(version, author)]
struct Cli {
    /// Taxonomy to scrape.
    #[arg(long, value_enum)]
    profile: Option<ProfileKind>,

    /// Only these categories (default: every category of the profile).
    #[arg(long, num_args = 1..)]
    categories: Vec<String>,

    #[arg(long)]
    max_images: Option<usize>,

    #[arg(long)]
    min_images: Option<usize>,

    /// Minimum width and height in pixels.
    #[arg(long, num_args = 2, value_names = ["WIDTH", "HEIGHT"])]
    min_resolution: Option<Vec<u32>>,

    #[arg(long)]
    output_dir: Option<String>,

    /// JSON file with overrides (default: granuloma-scraper.json if present).
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    verbose: bool,

    /// Use only the core queries of each category.
    #[arg(long)]
    no_query_expansion: bool,

    /// Do not copy the ledger files to backups/ before the run.
    #[arg(long)]
    no_backup: bool,

    /// Print the run summary as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<ScraperError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ScraperError) -> u8 {
    match error {
        ScraperError::InvalidImageBounds { .. } => 1,
        ScraperError::ConfigRead(_) | ScraperError::ConfigParse(_) => 2,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    let overrides = ConfigOverrides {
        profile: cli.profile,
        categories: cli.categories,
        output_dir: cli.output_dir,
        max_images: cli.max_images,
        min_images: cli.min_images,
        min_resolution: cli
            .min_resolution
            .as_deref()
            .and_then(|values| match values {
                [width, height] => Some((*width, *height)),
                _ => None,
            }),
        no_query_expansion: cli.no_query_expansion,
    };
    // Bounds are checked here, before any directory or network activity.
    let file_config = ConfigLoader::load(cli.config.as_deref())?;
    let resolved = ConfigLoader::resolve(file_config, overrides)?;

    let store = Store::new(resolved.output_dir.clone());
    store.ensure_root()?;
    let log_path = logging::init(
        &store.log_dir(),
        cli.verbose,
        matches!(output_mode, OutputMode::Json),
    )?;
    info!(log = %log_path, "logging to file");

    if !cli.no_backup {
        backup::backup_before_run(&store);
    }

    let shutdown = ShutdownFlag::new();
    let handler_flag = shutdown.clone();
    if let Err(err) = ctrlc::set_handler(move || handler_flag.request()) {
        warn!(error = %err, "could not install interrupt handler");
    }

    let profile = resolved.profile.clone();
    let delays = profile.delays;
    let transport = HttpTransport::new()?;
    let primary = BingProvider::new(
        transport.clone(),
        ThreadPacer,
        profile.search_mode,
        delays.after_search_page,
        delays.after_search_error,
    );
    let secondary = GoogleProvider::new(transport.clone(), ThreadPacer, delays.after_search_page);
    let downloader = Downloader::new(
        transport,
        ThreadPacer,
        RetryPolicy::new(RetryPolicy::DEFAULT_MAX_ATTEMPTS, delays.retry_backoff),
    );

    let mut app = App::new(
        profile,
        store,
        primary,
        secondary,
        downloader,
        resolved.options,
    )?
    .with_shutdown(shutdown);
    let summary = match output_mode {
        OutputMode::Json => app.run(&resolved.categories, &JsonOutput),
        OutputMode::Text => app.run(&resolved.categories, &LogSink),
    };

    match output_mode {
        OutputMode::Json => JsonOutput::print_summary(&summary).into_diagnostic()?,
        OutputMode::Text => TextOutput::print_summary(&summary).into_diagnostic()?,
    }
    Ok(())
}
