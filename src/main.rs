use std::error;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing::{info, Level};

use cputools::aida_dump::AidaCpuidDump;
use cputools::query::{self, OutputOptions, Radix};
use cputools::{decoder, report, CpuidQuery, CpuidSource};

type Result<T> = std::result::Result<T, Box<dyn error::Error>>;

/// CPU information gathering suite for the x86 CPUID instruction.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    source: SourceArgs,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Where CPUID values come from.
#[derive(Debug, Args)]
struct SourceArgs {
    /// Replay CPUID values from an AIDA64 CPUID dump instead of
    /// querying this CPU. Use `-` to read the dump from stdin.
    #[arg(long, global = true, env = "CPUTOOLS_DUMP", value_name = "FILE")]
    dump: Option<PathBuf>,

    /// The logical CPU of the dump to use.
    #[arg(long, global = true, default_value_t = 0)]
    cpu: u32,
}

impl Cli {
    /// Parse the command line and check the conflicts clap can't see.
    ///
    /// `--verbose` is global, so `cputools -v query 0 -c` only sets it
    /// after clap has validated the subcommand's own conflicts.
    fn try_parse_args<I, T>(args: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = Self::try_parse_from(args)?;

        if let Command::Query(query) = &cli.command {
            if query.clean && cli.verbose {
                return Err(Self::command().error(
                    ErrorKind::ArgumentConflict,
                    "the argument '--clean' cannot be used with '--verbose'",
                ));
            }
        }

        Ok(cli)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Call CPUID with the given function and subfunction code and
    /// print the resulting registers.
    Query(QueryArgs),

    /// Decode CPU identification and feature flags.
    Info(InfoArgs),
}

#[derive(Debug, Args)]
struct QueryArgs {
    /// The CPUID function (EAX) to call. Prefix with `0x` for hexadecimal.
    #[arg(value_parser = query::parse_code)]
    function: u32,

    /// The CPUID subfunction (ECX) to call.
    #[arg(value_parser = query::parse_code, default_value = "0")]
    subfunction: u32,

    /// Show ASCII string conversions in little-endian byte order.
    #[arg(short, long)]
    ascii: bool,

    /// Print values only.
    #[arg(short, long, conflicts_with_all = ["ascii", "verbose"])]
    clean: bool,

    /// Query function codes beyond the maximum this CPU reports.
    #[arg(short, long)]
    ignore: bool,

    /// Show values in base 10.
    #[arg(short, long, group = "radix")]
    decimal: bool,

    /// Show values in base 8.
    #[arg(short, long, group = "radix")]
    octal: bool,

    /// Show values in base 2.
    #[arg(short, long, group = "radix")]
    binary: bool,
}

impl QueryArgs {
    fn radix(&self) -> Radix {
        if self.decimal {
            Radix::Decimal
        } else if self.octal {
            Radix::Octal
        } else if self.binary {
            Radix::Binary
        } else {
            Radix::Hex
        }
    }
}

#[derive(Debug, Args)]
struct InfoArgs {
    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
#[derive(Debug, thiserror::Error)]
enum SourceError {
    #[error("this platform has no CPUID instruction, use --dump to replay a CPUID dump")]
    UnsupportedPlatform,
}

fn open_source(args: &SourceArgs) -> Result<Box<dyn CpuidSource>> {
    let path = match &args.dump {
        Some(path) => path,
        None => return native_source(),
    };

    let mut input = String::new();
    if path.as_os_str() == "-" {
        io::stdin().read_to_string(&mut input)?;
    } else {
        input = fs::read_to_string(path)?;
    }

    info!("replaying logical CPU #{} from {}", args.cpu, path.display());

    Ok(Box::new(AidaCpuidDump::parse(&input, args.cpu)?))
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn native_source() -> Result<Box<dyn CpuidSource>> {
    Ok(Box::new(cputools::native::NativeCpuid))
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
fn native_source() -> Result<Box<dyn CpuidSource>> {
    Err(SourceError::UnsupportedPlatform.into())
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .without_time()
        .with_target(false)
        .init();
}

fn run_query(source: &dyn CpuidSource, args: &QueryArgs, verbose: bool) -> Result<()> {
    let query = CpuidQuery::new(args.function, args.subfunction);
    let result = query::run(source, query, args.ignore)?;

    let options = OutputOptions {
        radix: args.radix(),
        ascii: args.ascii,
        clean: args.clean,
        verbose,
    };

    print!("{}", query::render(&result, &options));

    Ok(())
}

fn run_info(source: &dyn CpuidSource, args: &InfoArgs) -> Result<()> {
    let report = decoder::decode(source);

    if args.json {
        println!("{}", report::json(&report)?);
    } else {
        print!("{}", report::text(&report));
    }

    Ok(())
}

fn run(cli: &Cli, source: &dyn CpuidSource) -> Result<()> {
    match &cli.command {
        Command::Query(args) => run_query(source, args, cli.verbose),
        Command::Info(args) => run_info(source, args),
    }
}

fn main() -> ExitCode {
    let cli = Cli::try_parse_args(std::env::args_os()).unwrap_or_else(|err| err.exit());
    init_logging(cli.verbose);

    match open_source(&cli.source).and_then(|source| run(&cli, source.as_ref())) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}
