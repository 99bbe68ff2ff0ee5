use anyhow::Result;
use clap::{CommandFactory, Parser};
use ironsheet::config::{self, Settings};
use ironsheet::Pipeline;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ironsheet")]
#[command(about = "Convert spreadsheet tables to JSON, CSV, fixtures, Lua or MessagePack")]
struct Args {
    /// Schema documents to convert; all documents below the first schema
    /// search path when omitted
    targets: Vec<String>,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Log debug details
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Open every source file privately
    #[arg(long, alias = "no_cache")]
    no_cache: bool,

    /// Worker threads: full, half, quarter or a number
    #[arg(long, default_value = "full")]
    jobs: String,

    /// Directory that document targets are resolved against
    #[arg(long, alias = "xls_search_path", default_value = ".")]
    source_search_path: PathBuf,

    /// Comma-separated directories searched for schema documents
    #[arg(long, alias = "yaml_search_path", value_delimiter = ',')]
    schema_search_path: Vec<PathBuf>,

    /// Directory that handler output paths are resolved against
    #[arg(long, alias = "output_base_path", default_value = ".")]
    output_base_path: PathBuf,

    /// UTC offset for spreadsheet dates, e.g. Z, +09:00, -0530
    #[arg(long)]
    timezone: Option<String>,

    /// Write run statistics as JSON to this file
    #[arg(long)]
    metrics: Option<PathBuf>,
}

fn init_logging(args: &Args) {
    let default = if args.quiet {
        "warn"
    } else if args.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn settings(args: &Args) -> Result<Settings> {
    let mut settings = Settings {
        source_search_path: args.source_search_path.clone(),
        schema_search_paths: args.schema_search_path.clone(),
        output_base_path: args.output_base_path.clone(),
        jobs: config::parse_jobs(&args.jobs)?,
        no_cache: args.no_cache,
        ..Settings::default()
    };
    if let Some(tz) = &args.timezone {
        settings.tz_offset = config::parse_timezone(tz)?;
    }
    Ok(settings)
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if args.targets.is_empty() && args.schema_search_path.is_empty() {
        let _ = Args::command().print_help();
        return ExitCode::FAILURE;
    }

    init_logging(&args);

    let settings = match settings(&args) {
        Ok(settings) => settings,
        Err(err) => {
            error!("{err:#}");
            let _ = Args::command().print_help();
            return ExitCode::FAILURE;
        }
    };

    let targets = if args.targets.is_empty() {
        match settings.discover_targets() {
            Ok(targets) => targets,
            Err(err) => {
                error!("{err:#}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        args.targets.clone()
    };

    info!(jobs = settings.jobs, "starting");
    let pipeline = Pipeline::new(settings);
    // The pipeline logs its own failure.
    let result = pipeline.run(&targets);

    if let Some(path) = &args.metrics
        && let Err(err) = pipeline.stats().save_to_file(path)
    {
        error!("{err:#}");
    }

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
