//! Dyn-O-Tool command line.
//!
//! Usage:
//!   dynotool list
//!   dynotool info <TABLE>
//!   dynotool head <TABLE> [--limit 20]
//!   dynotool copy <SRC_TABLE> <DEST_TABLE> [--mode buffered|streaming]
//!   dynotool backup <TABLE> --file <file>
//!   dynotool export <TABLE> [--file <file|s3://bucket>] [--format line-json] [--type sequential|segmented|parallel] [--segments 10]
//!   dynotool import <TABLE> --file <file|s3://bucket> [--format line-json]
//!   dynotool wipe <TABLE> [--yes]
//!   dynotool truncate <TABLE> [--filter <json>] [--yes]
//!
//! Every command accepts --profile, --region, --endpoint-url and --config.
//! Results go to stdout; progress glyphs and logs go to stderr.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use dynotool::aws::{AwsContext, DynamoClient, LambdaInvoker, S3ObjectStore};
use dynotool::codec::output::DelimitedLayout;
use dynotool::codec::wire;
use dynotool::config::{ConfigOverrides, DynotoolConfig};
use dynotool::launcher::{launch_parallel_export, LaunchRequest};
use dynotool::orchestrator::{render_info, AlwaysConfirm, Confirm, ConfirmPrompt};
use dynotool::{
    logging, CopyMode, DotProgress, DynoError, ExportMode, OutputFormat, ProgressSink, SilentProgress, Target,
    ThreadSleeper, TransferOrchestrator, UnencodablePolicy,
};

#[derive(Parser, Debug)]
#[command(name = "dynotool", version, about = "Bulk operations on DynamoDB tables")]
struct Cli {
    /// AWS profile to use.
    #[arg(long, global = true)]
    profile: Option<String>,

    #[arg(long, global = true)]
    region: Option<String>,

    /// Service endpoint override (local emulators).
    #[arg(long, global = true)]
    endpoint_url: Option<String>,

    /// Configuration file (default: ~/.dynotool.yaml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Namespace used to name remote functions.
    #[arg(long, global = true)]
    namespace: Option<String>,

    /// Give up after this many consecutive throttled retries.
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Requests per batch write (1-25).
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Records evaluated per scan request.
    #[arg(long, global = true)]
    page_size: Option<u32>,

    /// abort or skip records that cannot be encoded.
    #[arg(long, global = true)]
    on_unencodable: Option<UnencodablePolicy>,

    /// -v info, -vv debug, -vvv trace.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List all tables.
    List,
    /// Show status, size and key schema of a table.
    Info { table: String },
    /// Print the first records of a table as line-json.
    Head {
        table: String,
        #[arg(long, default_value_t = 20)]
        limit: u64,
    },
    /// Copy SRC_TABLE into a new table DEST_TABLE.
    Copy {
        source: String,
        destination: String,
        #[arg(long, value_enum, default_value_t = CopyModeArg::Buffered)]
        mode: CopyModeArg,
    },
    /// Lossless export in the native tagged form.
    Backup {
        table: String,
        #[arg(long)]
        file: String,
    },
    /// Export a table to a file or an s3:// bucket.
    Export(ExportArgs),
    /// Import a file or an s3:// bucket into a table.
    Import(ImportArgs),
    /// Delete and recreate a table.
    Wipe {
        table: String,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Delete every record of a table, or those matching --filter.
    Truncate {
        table: String,
        /// {"expression": ..., "names": {...}, "values": {...}}
        #[arg(long)]
        filter: Option<String>,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Debug)]
struct ExportArgs {
    table: String,
    /// Target file or s3://bucket (default: the table name).
    #[arg(long, alias = "target")]
    file: Option<String>,
    /// line-json, json-array, delimited-row or native.
    #[arg(long, default_value = "line-json")]
    format: String,
    /// Columns of delimited-row output (default: key attributes).
    #[arg(long, value_delimiter = ',')]
    columns: Vec<String>,
    #[arg(long, default_value_t = ',')]
    delimiter: char,
    #[arg(long = "type", value_enum, default_value_t = ExportType::Sequential)]
    export_type: ExportType,
    #[arg(long, default_value_t = 10)]
    segments: u32,
}

#[derive(Args, Debug)]
struct ImportArgs {
    table: String,
    #[arg(long, alias = "source")]
    file: String,
    /// line-json, json-array or native.
    #[arg(long, default_value = "line-json")]
    format: String,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CopyModeArg {
    Buffered,
    Streaming,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ExportType {
    Sequential,
    Segmented,
    Parallel,
}

impl Command {
    fn reports_progress(&self) -> bool {
        !matches!(self, Command::List | Command::Info { .. } | Command::Head { .. })
    }
}

// ── Confirmation ────────────────────────────────────────────────────

/// Asks on stderr, reads the answer from stdin. Only `y`/`yes` approves.
struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &ConfirmPrompt) -> bool {
        let mut err = io::stderr().lock();
        let scope = if prompt.filtered { " matching the filter" } else { "" };
        let _ = match prompt.operation {
            "wipe" => writeln!(
                err,
                "You are about to drop and recreate table '{}' (~{} items).",
                prompt.table, prompt.approximate_items
            ),
            _ => writeln!(
                err,
                "You are about to delete items{} from table '{}' (~{} items, {} in the first page).",
                scope, prompt.table, prompt.approximate_items, prompt.page_items
            ),
        };
        if let Some(sample) = &prompt.sample {
            let rendered = serde_json::to_string_pretty(&wire::record_to_json(sample)).unwrap_or_default();
            let _ = writeln!(err, "Sample record:\n{}", rendered);
        }
        let _ = write!(err, "Type 'yes' to continue: ");
        let _ = err.flush();

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(0) | Err(_) => false,
            Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        }
    }
}

fn confirm_gate(yes: bool) -> &'static dyn Confirm {
    if yes {
        &AlwaysConfirm
    } else {
        &TerminalConfirm
    }
}

// ── Commands ────────────────────────────────────────────────────────

fn is_delimited(format: &str) -> bool {
    matches!(format, "delimited-row" | "csv")
}

fn export_format(orchestrator: &TransferOrchestrator<'_>, args: &ExportArgs) -> anyhow::Result<OutputFormat> {
    if !is_delimited(&args.format) {
        return Ok(OutputFormat::parse(&args.format, None)?);
    }
    if !args.delimiter.is_ascii() {
        return Err(DynoError::InvalidArgument(format!("delimiter '{}' is not ASCII", args.delimiter)).into());
    }
    let columns = if args.columns.is_empty() {
        orchestrator.info(&args.table)?.key_attributes()
    } else {
        args.columns.clone()
    };
    let layout = DelimitedLayout::new(columns, args.delimiter as u8)?;
    Ok(OutputFormat::parse(&args.format, Some(layout))?)
}

fn run_export(
    orchestrator: &TransferOrchestrator<'_>,
    context: &Arc<AwsContext>,
    config: &DynotoolConfig,
    args: &ExportArgs,
) -> anyhow::Result<()> {
    let format = export_format(orchestrator, args)?;
    let raw = args.file.as_deref().unwrap_or(&args.table);
    let target = Target::parse(raw, format.default_extension())?;

    let mode = match args.export_type {
        ExportType::Sequential => ExportMode::Sequential,
        ExportType::Segmented => ExportMode::Segmented(args.segments),
        ExportType::Parallel => {
            let Target::Bucket(bucket) = &target else {
                return Err(DynoError::InvalidArgument("parallel export needs an s3:// target".to_string()).into());
            };
            let invoker = LambdaInvoker::new(Arc::clone(context));
            let request = LaunchRequest {
                bucket: bucket.clone(),
                table: args.table.clone(),
                total_segments: args.segments,
            };
            launch_parallel_export(&invoker, &config.function_names(), &request)?;
            println!(
                "Parallel export of {} launched: {} segments into {}",
                args.table, args.segments, target
            );
            return Ok(());
        }
    };

    let stats = orchestrator.export(&args.table, &target, &format, mode)?;
    println!("Exported {} to {}: {}", args.table, target, stats);
    Ok(())
}

fn run_import(orchestrator: &TransferOrchestrator<'_>, args: &ImportArgs) -> anyhow::Result<()> {
    if is_delimited(&args.format) {
        return Err(DynoError::UnsupportedFormat(format!("{} cannot be imported", args.format)).into());
    }
    let format = OutputFormat::parse(&args.format, None)?;
    let source = Target::parse(&args.file, format.default_extension())?;
    let stats = orchestrator.import(&args.table, &source, &format)?;
    println!("Imported {} into {}: {}", source, args.table, stats);
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = DynotoolConfig::load(cli.config.as_deref())?.apply(ConfigOverrides {
        profile: cli.profile,
        region: cli.region,
        endpoint_url: cli.endpoint_url,
        namespace: cli.namespace,
        max_retries: cli.max_retries,
        batch_size: cli.batch_size,
        page_size: cli.page_size,
        on_unencodable: cli.on_unencodable,
    });
    let settings = config.transfer_settings()?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), ?settings, "Dyn-O-Tool starting");

    let context = Arc::new(
        AwsContext::connect(&config.aws_settings()).context("cannot set up AWS clients")?,
    );
    let client = DynamoClient::new(Arc::clone(&context));
    let objects = S3ObjectStore::new(Arc::clone(&context));
    let progress: &dyn ProgressSink = if cli.command.reports_progress() {
        &DotProgress
    } else {
        &SilentProgress
    };
    let orchestrator = TransferOrchestrator::new(&client, settings, &ThreadSleeper, progress).with_object_store(&objects);

    match &cli.command {
        Command::List => {
            for summary in orchestrator.list()? {
                println!("{}", summary);
            }
        }
        Command::Info { table } => {
            println!("{}", render_info(&orchestrator.info(table)?));
        }
        Command::Head { table, limit } => {
            let stdout = io::stdout().lock();
            let (_, mut stdout) = orchestrator.head(table, *limit, stdout)?;
            stdout.flush()?;
        }
        Command::Copy { source, destination, mode } => {
            let mode = match mode {
                CopyModeArg::Buffered => CopyMode::Buffered,
                CopyModeArg::Streaming => CopyMode::Streaming,
            };
            let stats = orchestrator.copy(source, destination, mode)?;
            println!("Copied {} to {}: {}", source, destination, stats);
        }
        Command::Backup { table, file } => {
            let target = Target::parse(file, OutputFormat::Native.default_extension())?;
            let stats = orchestrator.backup(table, &target)?;
            println!("Backed up {} to {}: {}", table, target, stats);
        }
        Command::Export(args) => run_export(&orchestrator, &context, &config, args)?,
        Command::Import(args) => run_import(&orchestrator, args)?,
        Command::Wipe { table, yes } => {
            let definition = orchestrator.wipe(table, confirm_gate(*yes))?;
            println!("Table {} recreated ({})", definition.name, definition.key_attributes().join(", "));
        }
        Command::Truncate { table, filter, yes } => {
            let filter = filter
                .as_deref()
                .map(wire::parse_filter)
                .transpose()
                .context("invalid --filter document")?;
            let stats = orchestrator.truncate(table, filter, confirm_gate(*yes))?;
            println!("Truncated {}: {}", table, stats);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            let code = err
                .chain()
                .find_map(|e| e.downcast_ref::<DynoError>())
                .map(DynoError::exit_code)
                .unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
