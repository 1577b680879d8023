use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use sfa_harvester::app::{self, App, FailedObject, ImportReport, ProgressSink};
use sfa_harvester::catalog::{Catalog, CkanHttpClient, MemoryCatalog};
use sfa_harvester::config::{ConfigLoader, ResolvedConfig};
use sfa_harvester::error::HarvestError;
use sfa_harvester::metadata::XlsxMetadataSource;
use sfa_harvester::output::{JsonOutput, OutputMode, StderrProgress};
use sfa_harvester::s3::S3HttpClient;

#[derive(Parser)]
#[command(name = "sfa-harvest")]
#[command(about = "Harvests the Swiss Federal Archives open data into a CKAN catalog")]
#[command(version, author)]
struct Cli {
    /// Print machine-readable JSON instead of progress lines.
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Show harvester info")]
    Info,
    #[command(about = "Create a job and gather the workbook into it")]
    Gather(WorkbookArgs),
    #[command(about = "Fetch the gathered objects of a job")]
    Fetch(JobArgs),
    #[command(about = "Import the fetched objects of a job into the catalog")]
    Import(ImportArgs),
    #[command(about = "Gather, fetch and import in one go")]
    Run(RunArgs),
    #[command(about = "List harvest jobs")]
    Jobs,
}

#[derive(Args)]
struct WorkbookArgs {
    /// Local workbook to read instead of downloading it from the bucket.
    #[arg(long)]
    workbook: Option<PathBuf>,
}

#[derive(Args)]
struct JobArgs {
    job: String,
}

#[derive(Args)]
struct ImportArgs {
    job: String,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    workbook: Option<PathBuf>,

    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<HarvestError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &HarvestError) -> u8 {
    match error {
        HarvestError::MissingConfig
        | HarvestError::ConfigRead(_)
        | HarvestError::ConfigParse(_)
        | HarvestError::InvalidConfig(_)
        | HarvestError::InvalidLanguage(_) => 2,
        HarvestError::SourceUnavailable(_)
        | HarvestError::StoreHttp(_)
        | HarvestError::StoreStatus { .. }
        | HarvestError::CatalogHttp(_)
        | HarvestError::CatalogStatus { .. }
        | HarvestError::CatalogAction { .. } => 3,
        HarvestError::ImportFailed { .. } => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    if let Commands::Info = cli.command {
        return run_info(output_mode);
    }

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let dry_run = matches!(
        &cli.command,
        Commands::Import(ImportArgs { dry_run: true, .. })
            | Commands::Run(RunArgs { dry_run: true, .. })
    );
    if dry_run {
        let app = build_app(config, MemoryCatalog::new())?;
        run_command(cli.command, &app, output_mode)
    } else {
        let catalog = CkanHttpClient::new(&config.catalog)?;
        let app = build_app(config, catalog)?;
        run_command(cli.command, &app, output_mode)
    }
}

type HarvestApp<C> = App<XlsxMetadataSource, S3HttpClient, C>;

fn build_app<C: Catalog>(config: ResolvedConfig, catalog: C) -> miette::Result<HarvestApp<C>> {
    let store = S3HttpClient::new(&config.store)?;
    Ok(App::new(config, XlsxMetadataSource::new(), store, catalog)?)
}

fn run_info(output_mode: OutputMode) -> miette::Result<()> {
    let info = app::info();
    match output_mode {
        OutputMode::Json => JsonOutput::print_info(&info).into_diagnostic()?,
        OutputMode::Human => {
            println!("{} ({})", info.title, info.name);
            println!("{}", info.description);
        }
    }
    Ok(())
}

fn run_command<C: Catalog>(
    command: Commands,
    app: &HarvestApp<C>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Human => &StderrProgress,
    };

    match command {
        Commands::Info => run_info(output_mode),
        Commands::Gather(args) => {
            let job = app.create_job()?;
            let report = app.gather(&job.id, args.workbook.as_deref(), sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_gather(&report).into_diagnostic()?,
                OutputMode::Human => {
                    println!("job {}", report.job_id);
                    println!(
                        "enqueued {}, skipped {}, unstable ids {}",
                        report.object_ids.len(),
                        report.skipped.len(),
                        report.unstable
                    );
                    for skipped in &report.skipped {
                        println!("  row {}: {}", skipped.row, skipped.reason);
                    }
                }
            }
            Ok(())
        }
        Commands::Fetch(args) => {
            let report = app.fetch(&args.job, sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_fetch(&report).into_diagnostic()?,
                OutputMode::Human => {
                    println!("fetched {}", report.fetched);
                    print_failures(&report.failed);
                }
            }
            Ok(())
        }
        Commands::Import(args) => {
            let report = app.import(&args.job, sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_import(&report).into_diagnostic()?,
                OutputMode::Human => print_import_summary(&report),
            }
            ensure_imported(&report)
        }
        Commands::Run(args) => {
            let report = app.run(args.workbook.as_deref(), sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_run(&report).into_diagnostic()?,
                OutputMode::Human => {
                    println!("job {} ({:?})", report.job.id, report.job.status);
                    println!(
                        "gathered {}, skipped {}, unstable ids {}",
                        report.gather.object_ids.len(),
                        report.gather.skipped.len(),
                        report.gather.unstable
                    );
                    print_import_summary(&report.import);
                }
            }
            ensure_imported(&report.import)
        }
        Commands::Jobs => {
            let report = app.jobs()?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_jobs(&report).into_diagnostic()?,
                OutputMode::Human => {
                    for job in &report.jobs {
                        println!(
                            "{}  {:?}  {}",
                            job.id,
                            job.status,
                            job.created_at.to_rfc3339()
                        );
                    }
                }
            }
            Ok(())
        }
    }
}

fn print_import_summary(report: &ImportReport) {
    println!("imported {}", report.imported.len());
    for outcome in &report.imported {
        let action = if outcome.created { "created" } else { "updated" };
        println!("  {} {} ({})", action, outcome.name, outcome.guid);
    }
    print_failures(&report.failed);
}

fn print_failures(failed: &[FailedObject]) {
    if !failed.is_empty() {
        println!("failed {}", failed.len());
    }
    for failure in failed {
        println!("  {}: {}", failure.guid, failure.message);
    }
}

fn ensure_imported(report: &ImportReport) -> miette::Result<()> {
    match report.failed.first() {
        None => Ok(()),
        Some(first) => Err(HarvestError::ImportFailed {
            guid: first.guid.clone(),
            message: format!("{} object(s) failed to import", report.failed.len()),
        }
        .into()),
    }
}
