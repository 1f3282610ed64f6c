use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hybrid_finder::app::{App, DiscoverOptions};
use hybrid_finder::cancel::CancelFlag;
use hybrid_finder::config::{ConfigLoader, ResolvedConfig};
use hybrid_finder::error::HybridError;
use hybrid_finder::input::load_accessions;
use hybrid_finder::output::JsonOutput;
use hybrid_finder::platform::classify;
use hybrid_finder::query::PlatformBias;
use hybrid_finder::sra::EntrezHttpClient;

#[derive(Parser)]
#[command(name = "hybrid-finder")]
#[command(about = "Find SRA samples sequenced on both short-read and long-read platforms")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    email: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Scan a list of study or run accessions for hybrid samples")]
    Discover(DiscoverArgs),
    #[command(about = "Page through an Entrez query until enough hybrid samples are found")]
    Search(SearchArgs),
    #[command(about = "Write a TSV summary of a hybrid sample file")]
    Summarize(SummarizeArgs),
    #[command(about = "Print the platform category of instrument model strings")]
    Classify(ClassifyArgs),
}

#[derive(Args)]
struct DiscoverArgs {
    input: PathBuf,

    #[arg(long)]
    limit: Option<usize>,

    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    checkpoint_every: Option<usize>,

    #[arg(long)]
    checkpoint: Option<Utf8PathBuf>,

    #[arg(long)]
    output: Option<Utf8PathBuf>,

    #[arg(long)]
    resume: bool,
}

#[derive(Args)]
struct SearchArgs {
    #[arg(long)]
    environment: Option<String>,

    #[arg(long = "pathogen")]
    pathogens: Vec<String>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long, value_enum)]
    bias: Option<PlatformBias>,

    #[arg(long)]
    target: Option<usize>,

    #[arg(long)]
    page_size: Option<usize>,

    #[arg(long)]
    safety_bound: Option<usize>,

    #[arg(long)]
    checkpoint: Option<Utf8PathBuf>,

    #[arg(long)]
    output: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct SummarizeArgs {
    hybrids: Utf8PathBuf,

    #[arg(long)]
    output: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct ClassifyArgs {
    #[arg(required = true)]
    models: Vec<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<HybridError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &HybridError) -> u8 {
    match error {
        HybridError::InvalidSetting { .. }
        | HybridError::ConfigRead(_)
        | HybridError::ConfigParse(_)
        | HybridError::InputRead { .. } => 2,
        HybridError::NcbiHttp(_)
        | HybridError::NcbiStatus { .. }
        | HybridError::MalformedResponse(_) => 3,
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

    if let Commands::Classify(args) = &cli.command {
        for model in &args.models {
            println!("{model}\t{}", classify(Some(model.as_str())));
        }
        return Ok(());
    }

    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(email) = cli.email {
        config.email = email;
    }

    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("interrupt received; finishing in-flight work");
        handler_flag.cancel();
    })
    .into_diagnostic()?;

    match cli.command {
        Commands::Discover(args) => run_discover(args, config, cancel),
        Commands::Search(args) => run_search(args, config, cancel),
        Commands::Summarize(args) => run_summarize(args, config, cancel),
        Commands::Classify(_) => Ok(()),
    }
}

fn build_app(
    config: ResolvedConfig,
    cancel: CancelFlag,
) -> miette::Result<App<EntrezHttpClient>> {
    config.validate()?;
    let client = EntrezHttpClient::new(&config.email, config.api_key.as_deref())?;
    Ok(App::new(client, config).with_cancel(cancel))
}

fn run_discover(
    args: DiscoverArgs,
    mut config: ResolvedConfig,
    cancel: CancelFlag,
) -> miette::Result<()> {
    if let Some(workers) = args.workers {
        config.orchestrator.workers = workers;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(every) = args.checkpoint_every {
        config.orchestrator.checkpoint_every = every;
    }
    if let Some(checkpoint) = args.checkpoint {
        config.checkpoint_path = checkpoint;
    }
    if let Some(output) = args.output {
        config.output_path = output;
    }

    let accessions = load_accessions(&args.input)?;
    let app = build_app(config, cancel)?;
    let options = DiscoverOptions {
        limit: args.limit,
        resume: args.resume,
    };
    let report = app.discover(&accessions, &options)?;
    info!(
        "found {} hybrid samples ({} of {} batches failed)",
        report.checkpoint.len(),
        report.batches_failed(),
        report.batches_total
    );
    JsonOutput::print_discover(&report).into_diagnostic()?;
    Ok(())
}

fn run_search(
    args: SearchArgs,
    mut config: ResolvedConfig,
    cancel: CancelFlag,
) -> miette::Result<()> {
    if args.environment.is_some() {
        config.filters.environment = args.environment;
    }
    if !args.pathogens.is_empty() {
        config.filters.pathogens = args.pathogens;
    }
    if args.host.is_some() {
        config.filters.host = args.host;
    }
    if let Some(bias) = args.bias {
        config.filters.bias = bias;
    }
    if let Some(target) = args.target {
        config.target = target;
    }
    if let Some(page_size) = args.page_size {
        config.page_size = page_size;
    }
    if let Some(bound) = args.safety_bound {
        config.safety_bound = bound;
    }
    if let Some(checkpoint) = args.checkpoint {
        config.search_checkpoint_path = checkpoint;
    }
    if let Some(output) = args.output {
        config.output_path = output;
    }

    let app = build_app(config, cancel)?;
    let report = app.search()?;
    info!(
        "confirmed {} hybrid samples after checking {} candidates ({})",
        report.hybrids_confirmed, report.candidates_checked, report.stop
    );
    JsonOutput::print_search(&report).into_diagnostic()?;
    Ok(())
}

fn run_summarize(
    args: SummarizeArgs,
    config: ResolvedConfig,
    cancel: CancelFlag,
) -> miette::Result<()> {
    let hybrids = JsonOutput::read_hybrids(&args.hybrids)?;
    let app = build_app(config, cancel)?;
    let rows = app.summarize(&hybrids);
    JsonOutput::write_summary(args.output.as_deref(), &rows)?;
    if let Some(output) = &args.output {
        info!("summary of {} samples saved to {output}", rows.len());
    }
    Ok(())
}
