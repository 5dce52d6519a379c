use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_sra_digest::app::{App, CancelToken, inspect, list_groups};
use kira_sra_digest::config::{ConfigLoader, ConfigOverrides, DEFAULT_READ_RETRIES};
use kira_sra_digest::domain::RecordKind;
use kira_sra_digest::error::KiraError;
use kira_sra_digest::output::{JsonOutput, OutputMode};
use kira_sra_digest::summary::RunSummary;
use kira_sra_digest::tui::Tui;

#[derive(Parser)]
#[command(name = "kira-sra")]
#[command(about = "Digest SRA metadata XML dumps into compact per-study JSON documents")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Process a corpus and write one JSON document per accepted study")]
    Run(RunArgs),
    #[command(about = "Extract a single metadata file and print its records")]
    Inspect(InspectArgs),
    #[command(about = "List the file groups found under the corpus root")]
    Groups(GroupsArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    input: Option<Utf8PathBuf>,

    #[arg(long)]
    output: Option<Utf8PathBuf>,

    #[arg(long)]
    workers: Option<usize>,

    /// Process only the first N groups.
    #[arg(long)]
    limit: Option<usize>,

    #[arg(long)]
    min_samples: Option<usize>,

    /// Write study documents without indentation.
    #[arg(long)]
    compact: bool,
}

#[derive(Args)]
struct InspectArgs {
    file: Utf8PathBuf,

    /// Record kind; taken from the file name when omitted.
    #[arg(long)]
    kind: Option<RecordKind>,
}

#[derive(Args)]
struct GroupsArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    input: Option<Utf8PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    if error.is_fatal() { 2 } else { 1 }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Run(args) => run_digest(args, output_mode),
        Commands::Inspect(args) => {
            let result =
                inspect(&args.file, args.kind, DEFAULT_READ_RETRIES).map_err(miette::Report::new)?;
            JsonOutput::print_inspect(&result).into_diagnostic()
        }
        Commands::Groups(args) => {
            let root = match args.input {
                Some(input) => input,
                None => {
                    ConfigLoader::resolve(args.config.as_deref(), &ConfigOverrides::default())
                        .map_err(miette::Report::new)?
                        .input
                }
            };
            let result = list_groups(&root).map_err(miette::Report::new)?;
            JsonOutput::print_groups(&result).into_diagnostic()
        }
    }
}

fn run_digest(args: RunArgs, output_mode: OutputMode) -> miette::Result<()> {
    let overrides = ConfigOverrides {
        input: args.input,
        output: args.output,
        workers: args.workers,
        limit: args.limit,
        min_samples: args.min_samples,
        compact: args.compact,
    };
    let config =
        ConfigLoader::resolve(args.config.as_deref(), &overrides).map_err(miette::Report::new)?;
    let app = App::new(config).map_err(miette::Report::new)?;
    let cancel = CancelToken::new();

    match output_mode {
        OutputMode::Interactive => {
            let mut tui = Tui::new(cancel.clone());
            let summary = tui.run(move |sink| app.run(&cancel, sink))?;
            print_run_summary(&summary);
            Ok(())
        }
        OutputMode::NonInteractive => {
            let summary = app.run(&cancel, &JsonOutput).map_err(miette::Report::new)?;
            JsonOutput::print_summary(&summary).into_diagnostic()
        }
    }
}

fn print_run_summary(summary: &RunSummary) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("{cyan}KIRA-SRA summary{reset}");
    println!(
        "{cyan}groups: {} seen, {} processed, {} skipped, {} failed, {} not started{reset}",
        summary.groups_seen,
        summary.groups_processed,
        summary.groups_skipped,
        summary.groups_failed,
        summary.groups_not_started
    );
    println!(
        "{green}accepted studies: {} of {}{reset}",
        summary.accepted, summary.studies_seen
    );
    println!("{yellow}filtered out: {}{reset}", summary.rejected_total());
    for (reason, count) in &summary.rejected {
        println!("{yellow}   {reason}: {count}{reset}");
    }
    println!("{red}errors: {}{reset}", summary.error_total());
    for (kind, count) in &summary.errors {
        println!("{red}   {kind}: {count}{reset}");
    }
    if let Some(output) = &summary.output {
        println!("{cyan}output: {output}{reset}");
    }
    if summary.cancelled {
        println!("{yellow}run stopped early; rerun to process the remaining groups{reset}");
    }
}
