/// `vsanalyze` -- Analyze vSAN CMMDS dumps and vSAN trace files
///
/// Run with --help for brief help.
///
/// `overview` prints a table of the DOM objects in a CMMDS dump with their components, the disks
/// and hosts the components live on, and the names of the VMs the objects belong to.
///
/// `unaligned` scans vSAN traces for read-modify-write operations, writes the ones caused by
/// writes that are not 4K aligned to a findings file, and optionally ranks the objects with the
/// most unaligned writes (this needs a CMMDS dump for the names).
///
/// Quirks
///
/// `overview` without --cmmds runs cmmds-tool, which works only on an ESXi host.  `unaligned`
/// never does that, it looks for the dump where the log bundle keeps it.
///
/// Log messages go to stderr, reports to stdout or the findings file.
mod findings;
mod format;
mod overview;
mod producer;
mod ranking;

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use vsanlog::{
    find_trace_files, read_dump, read_trace_files, Topology, TraceLocation, TraceScanner,
    DEFAULT_TRACE_PREFIX,
};

const DEFAULT_CMMDS_DUMP: &str = "cmmds/cmmds-tool_find--f-python.txt";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log more to stderr (repeatable: debug, trace)
    #[arg(long, short, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print information about the program
    Version,

    /// Print an overview of the objects in a CMMDS dump
    Overview(OverviewCmdArgs),

    /// Find read-modify-write operations caused by unaligned writes in vSAN traces
    Unaligned(UnalignedCmdArgs),
}

#[derive(Args, Debug)]
pub struct OverviewCmdArgs {
    /// Path to the CMMDS dump [default: run cmmds-tool]
    #[arg(long, short, env = "VSAN_CMMDS_DUMP")]
    cmmds: Option<PathBuf>,

    #[command(flatten)]
    print_args: OverviewPrintArgs,
}

#[derive(Args, Debug)]
pub struct OverviewPrintArgs {
    /// Only show objects with components that are not Active
    #[arg(long, short)]
    affected: bool,

    /// Show the object columns on every row, not only the first row of each object
    #[arg(long)]
    verbose_rows: bool,

    /// Select fields and format for the output [default: see --fmt=help]
    #[arg(long)]
    fmt: Option<String>,
}

#[derive(Args, Debug)]
pub struct UnalignedCmdArgs {
    #[command(flatten)]
    source_args: TraceSourceArgs,

    /// Sort the findings by latency instead of by start time
    #[arg(long, short)]
    latency: bool,

    /// Write all RMW operations to the findings file, not only those caused by unaligned writes
    #[arg(long, short = 'r')]
    all_rmw: bool,

    /// The findings file
    #[arg(long, short, default_value = findings::DEFAULT_FINDINGS_FILE)]
    output: PathBuf,

    /// Also list the objects with the most unaligned writes and their VM names
    #[arg(long, short)]
    top: bool,

    /// Path to the CMMDS dump, used with --top
    #[arg(long, short, default_value = DEFAULT_CMMDS_DUMP)]
    cmmds: PathBuf,

    #[command(flatten)]
    print_args: RankingPrintArgs,
}

#[derive(Args, Debug)]
pub struct TraceSourceArgs {
    /// A vSAN trace file to process
    #[arg(long, short, conflicts_with = "dir")]
    file: Option<PathBuf>,

    /// vSAN trace directories to process [default: .]
    #[arg(long, short, num_args = 1..)]
    dir: Vec<PathBuf>,

    /// Trace file name prefix in directories, eg vsantraces-- or vsantracesUrgent--
    #[arg(long, short, default_value = DEFAULT_TRACE_PREFIX)]
    prefix: String,
}

#[derive(Args, Debug)]
pub struct RankingPrintArgs {
    /// Number of objects to list with --top
    #[arg(long, default_value_t = 10)]
    top_count: usize,

    /// Only rank objects with components that are not Active
    #[arg(long, short)]
    affected: bool,

    /// Select fields and format for the --top output [default: see --fmt=help]
    #[arg(long)]
    fmt: Option<String>,
}

fn main() {
    match vsanalyze() {
        Ok(()) => {}
        Err(msg) => {
            eprintln!("ERROR: {}", msg);
            process::exit(1);
        }
    }
}

fn vsanalyze() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        // Syntax:
        //  - components of the version string are space-separated but there are spaces nowhere else
        //  - the keyword "vsanalyze" is always the first component
        //  - every component is keyword(value)
        //  - "version" carries a semver
        println!("vsanalyze version({})", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Overview(ref args) => overview_command(args),
        Commands::Unaligned(ref args) => unaligned_command(args),
        Commands::Version => Ok(()),
    }
}

fn init_logging(verbose: u8) -> Result<()> {
    let loglevel = match verbose {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };
    let mut lcfg = simplelog::ConfigBuilder::new();
    lcfg.set_time_level(simplelog::LevelFilter::Off)
        .set_location_level(simplelog::LevelFilter::Off)
        .set_target_level(simplelog::LevelFilter::Off)
        .set_thread_level(simplelog::LevelFilter::Off);
    simplelog::TermLogger::init(
        loglevel,
        lcfg.build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )?;
    Ok(())
}

fn overview_command(args: &OverviewCmdArgs) -> Result<()> {
    if format::maybe_help(&args.print_args.fmt, overview::fmt_help) {
        return Ok(());
    }
    let records = match args.cmmds {
        Some(ref path) => read_dump(path)?,
        None => {
            let tool = producer::CmmdsTool::new();
            producer::produce_and_read(&tool, &producer::scratch_dump_path())?
        }
    };
    let topo = Topology::from_records(records)?;
    overview::print_overview(&mut io::stdout(), &args.print_args, &topo)
}

fn unaligned_command(args: &UnalignedCmdArgs) -> Result<()> {
    if format::maybe_help(&args.print_args.fmt, ranking::fmt_help) {
        return Ok(());
    }
    unaligned_report(&mut io::stdout(), args)
}

// The dump is loaded before anything is written, so a bad dump leaves no findings file behind.
fn unaligned_report(output: &mut dyn io::Write, args: &UnalignedCmdArgs) -> Result<()> {
    let topo = if args.top {
        Some(Topology::from_records(read_dump(&args.cmmds)?)?)
    } else {
        None
    };

    let source_args = &args.source_args;
    let location = if let Some(ref file) = source_args.file {
        TraceLocation::File(file.clone())
    } else if source_args.dir.is_empty() {
        TraceLocation::Dirs(vec![PathBuf::from(".")])
    } else {
        TraceLocation::Dirs(source_args.dir.clone())
    };
    let files = find_trace_files(&location, &source_args.prefix)?;
    let sources = read_trace_files(&files)?;
    let (records, _) = TraceScanner::new()?.scan(&sources);

    let order = if args.latency {
        findings::SortOrder::Latency
    } else {
        findings::SortOrder::StartTime
    };
    findings::write_findings_file(&args.output, &records, order, args.all_rmw)?;
    writeln!(output, "Results: {}", args.output.display())?;

    if let Some(topo) = topo {
        writeln!(output)?;
        ranking::print_ranking(output, &args.print_args, &records, &topo)?;
    }
    Ok(())
}

#[cfg(test)]
fn whitebox_unaligned_args(output: PathBuf, cmmds: &str) -> UnalignedCmdArgs {
    UnalignedCmdArgs {
        source_args: TraceSourceArgs {
            file: None,
            dir: vec![PathBuf::from("../tests/vsanlog")],
            prefix: DEFAULT_TRACE_PREFIX.to_string(),
        },
        latency: false,
        all_rmw: false,
        output,
        top: true,
        cmmds: PathBuf::from(cmmds),
        print_args: RankingPrintArgs {
            top_count: 10,
            affected: false,
            fmt: None,
        },
    }
}

#[test]
fn test_unaligned_missing_dump_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(findings::DEFAULT_FINDINGS_FILE);
    let args = whitebox_unaligned_args(path.clone(), "../tests/vsanlog/no-such-cmmds.txt");
    let mut out = Vec::<u8>::new();
    let e = unaligned_report(&mut out, &args).unwrap_err();
    assert!(matches!(
        e.downcast_ref::<vsanlog::VsanError>(),
        Some(vsanlog::VsanError::DumpNotFound(_))
    ));
    assert!(!path.exists());
    assert!(out.is_empty());
}

#[test]
fn test_unaligned_with_top() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(findings::DEFAULT_FINDINGS_FILE);
    let args = whitebox_unaligned_args(path.clone(), "../tests/vsanlog/whitebox-cmmds.txt");
    let mut out = Vec::<u8>::new();
    unaligned_report(&mut out, &args).unwrap();
    assert!(std::fs::read_to_string(&path).unwrap().lines().count() == 4);
    let out = String::from_utf8(out).unwrap();
    assert!(out.starts_with("Results: "));
    // 5c8a has two unaligned writes, 5f8a one and is not in the dump
    assert!(out.contains("     2 | 5c8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c | vm-01"));
    assert!(out.contains("     1 | 5f8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c | Not in CMMDS"));
}
