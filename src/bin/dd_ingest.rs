use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use deposit_ingest::config::{ConfigLoader, ResolvedConfig};
use deposit_ingest::dataverse::DataverseClient;
use deposit_ingest::deposit::DepositLoader;
use deposit_ingest::error::{IngestError, IngestFailure};
use deposit_ingest::files::ManifestMapper;
use deposit_ingest::ingest::{self, IngestTask};
use deposit_ingest::metadata::CitationMapper;
use deposit_ingest::output::JsonOutput;
use deposit_ingest::validator::{BagValidator, HttpBagValidator};

#[derive(Parser)]
#[command(name = "dd-ingest")]
#[command(about = "Ingest a deposit bag into a Dataverse repository")]
#[command(version, author)]
struct Cli {
    /// Do not print progress lines on stderr.
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Validate, create the dataset, add files and publish")]
    Ingest(IngestArgs),
    #[command(about = "Check the bag against the packaging profile only")]
    Validate(DepositArgs),
    #[command(about = "Print the dataset and file metadata that would be sent")]
    Map(DepositArgs),
}

#[derive(Args)]
struct DepositArgs {
    /// Deposit directory or .zip file.
    deposit: PathBuf,

    #[arg(long)]
    config: Option<String>,
}

#[derive(Args)]
struct IngestArgs {
    #[command(flatten)]
    target: DepositArgs,

    #[arg(long, conflicts_with = "draft")]
    publish: bool,

    /// Leave the dataset as a draft.
    #[arg(long)]
    draft: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(failure) = report.downcast_ref::<IngestFailure>() {
            return ExitCode::from(failure_exit_code(failure));
        }
        if let Some(error) = report.downcast_ref::<IngestError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &IngestError) -> u8 {
    match error {
        IngestError::InvalidDoi(_)
        | IngestError::InvalidDepositId(_)
        | IngestError::InvalidDeposit { .. }
        | IngestError::MetadataRead(_)
        | IngestError::MissingField(_)
        | IngestError::UnknownTerm { .. }
        | IngestError::InvalidDate { .. }
        | IngestError::ManifestRead(_)
        | IngestError::ManifestEntry { .. } => 2,
        err if err.is_transient() => 3,
        _ => 1,
    }
}

fn failure_exit_code(failure: &IngestFailure) -> u8 {
    match failure {
        IngestFailure::RejectedDeposit { .. }
        | IngestFailure::Mapping(_)
        | IngestFailure::FileMapping { .. } => 2,
        failure if failure.retryable() => 3,
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
    match cli.command {
        Commands::Ingest(args) => run_ingest(args, cli.quiet),
        Commands::Validate(args) => run_validate(args),
        Commands::Map(args) => run_map(args),
    }
}

fn run_ingest(args: IngestArgs, quiet: bool) -> miette::Result<()> {
    let config = ConfigLoader::resolve(args.target.config.as_deref())?;
    let loaded = DepositLoader::open(&args.target.deposit)?;

    let mut options = config.ingest;
    if args.publish {
        options.publish = true;
    }
    if args.draft {
        options.publish = false;
    }

    let dataverse = config.dataverse()?;
    let repository = DataverseClient::new(
        &dataverse.base_url,
        dataverse.api_key()?,
        &dataverse.collection,
        dataverse.timeout,
    )?;
    let task = IngestTask::with_mappers(
        http_validator(&config)?,
        repository,
        CitationMapper::new(config.contact.clone()),
        ManifestMapper,
        options,
    );

    let receipt = task.run_with_progress(loaded.deposit(), |line| {
        if !quiet {
            eprintln!("{line}");
        }
    })?;
    JsonOutput::print_receipt(&receipt).into_diagnostic()?;
    Ok(())
}

fn run_validate(args: DepositArgs) -> miette::Result<()> {
    let config = ConfigLoader::resolve(args.config.as_deref())?;
    let loaded = DepositLoader::open(&args.deposit)?;
    let verdict = http_validator(&config)?.validate(loaded.deposit().bag_dir())?;
    JsonOutput::print_verdict(&verdict).into_diagnostic()?;
    Ok(())
}

fn run_map(args: DepositArgs) -> miette::Result<()> {
    // Mapping works without a config; it only supplies the fallback contact.
    let contact = match ConfigLoader::resolve(args.config.as_deref()) {
        Ok(config) => config.contact,
        Err(IngestError::MissingConfig) => None,
        Err(err) => return Err(err.into()),
    };
    let loaded = DepositLoader::open(&args.deposit)?;
    let mapping = ingest::preview(
        loaded.deposit(),
        &CitationMapper::new(contact),
        &ManifestMapper,
    )?;
    JsonOutput::print_mapping(&mapping).into_diagnostic()?;
    Ok(())
}

fn http_validator(config: &ResolvedConfig) -> Result<HttpBagValidator, IngestError> {
    let validator = config.validator()?;
    HttpBagValidator::new(&validator.base_url, validator.timeout)
}
