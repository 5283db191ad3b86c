use clap::{Args, Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Compile LiquidCode UI and survey documents
#[derive(Parser)]
#[clap(author, version, about)]
enum Cli {
    /// Print the tokens of a document, one per line
    Tokens {
        #[clap(flatten)]
        source: SourceArgs,
    },
    /// Compile a document into a JSON schema, printing it to stdout
    Parse {
        #[clap(flatten)]
        source: SourceArgs,
    },
    /// Print a document in canonical form
    Fmt {
        #[clap(flatten)]
        source: SourceArgs,
    },
    /// Compile a JSON schema into a document
    ///
    /// Schemas with a `nodes` field are compiled as surveys unless a dialect
    /// is given.
    Compile {
        #[clap(flatten)]
        source: SourceArgs,
    },
    /// Compile a JSON schema into a document, read it back, and compare the
    /// result with the original
    Roundtrip {
        #[clap(flatten)]
        source: SourceArgs,
    },
    /// Report problems in a document
    Check {
        #[clap(flatten)]
        source: SourceArgs,
    },
    /// Feed a UI document to the streaming parser in chunks
    #[clap(after_help = STREAM_COMMAND_AFTER_HELP)]
    Stream {
        #[clap(flatten)]
        source: SourceArgs,
        /// Number of characters in each chunk
        #[clap(long = "chunk-size", default_value_t = 16, value_parser = clap::value_parser!(usize))]
        chunk_size: usize,
        /// Keep updating the schema after structural errors
        #[clap(long = "lenient")]
        lenient: bool,
    },
}

const STREAM_COMMAND_AFTER_HELP: &str = "\
Examples:

  $ liquid stream --chunk-size 4 dashboard.liquid
  $ generate-dashboard | liquid stream --lenient -
";

#[derive(Args)]
struct SourceArgs {
    /// Path to the input file, or `-` to read from stdin
    #[clap(name = "FILE")]
    file: PathOrStdin,
    /// Dialect of the input
    #[clap(long = "dialect", value_enum, default_value_t = DialectArg::Auto)]
    dialect: DialectArg,
    /// Continue even if errors were encountered
    #[clap(long = "allow-errors")]
    allow_errors: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum DialectArg {
    Auto,
    Ui,
    Survey,
}

impl From<DialectArg> for Option<liquid::Dialect> {
    fn from(dialect: DialectArg) -> Option<liquid::Dialect> {
        match dialect {
            DialectArg::Auto => None,
            DialectArg::Ui => Some(liquid::Dialect::Ui),
            DialectArg::Survey => Some(liquid::Dialect::Survey),
        }
    }
}

#[derive(Clone, Debug)]
enum PathOrStdin {
    StdIn,
    Path(PathBuf),
}

impl std::str::FromStr for PathOrStdin {
    type Err = std::convert::Infallible;

    fn from_str(src: &str) -> Result<PathOrStdin, std::convert::Infallible> {
        match src {
            "-" => Ok(PathOrStdin::StdIn),
            _ => Ok(PathOrStdin::Path(PathBuf::from(src))),
        }
    }
}

fn unwrap_or_exit<T>(option: Option<T>) -> T {
    option.unwrap_or_else(|| std::process::exit(liquid::Status::Error.exit_code()))
}

fn load_file_or_exit(driver: &mut liquid::Driver, file: PathOrStdin) -> liquid::files::FileId {
    unwrap_or_exit(match file {
        PathOrStdin::StdIn => driver.load_source("<stdin>".to_owned(), std::io::stdin()),
        PathOrStdin::Path(path) => driver.load_source_path(&path),
    })
}

const MAX_PRETTY_WIDTH: usize = 80;

fn get_pretty_width() -> usize {
    termsize::get().map_or(usize::MAX, |size| usize::from(size.cols)).min(MAX_PRETTY_WIDTH)
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("LIQUID_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> ! {
    init_logging();

    let (command, source) = match Cli::parse() {
        Cli::Tokens { source } => (Command::Tokens, source),
        Cli::Parse { source } => (Command::Parse, source),
        Cli::Fmt { source } => (Command::Fmt, source),
        Cli::Compile { source } => (Command::Compile, source),
        Cli::Roundtrip { source } => (Command::Roundtrip, source),
        Cli::Check { source } => (Command::Check, source),
        Cli::Stream {
            source,
            chunk_size,
            lenient,
        } => (Command::Stream { chunk_size, lenient }, source),
    };

    let mut driver = liquid::Driver::new();
    driver.install_panic_hook();
    driver.set_emit_width(get_pretty_width());
    driver.set_allow_errors(source.allow_errors);

    let file_id = load_file_or_exit(&mut driver, source.file);
    let dialect = Option::<liquid::Dialect>::from(source.dialect);
    tracing::debug!(?command, "running");

    let status = match command {
        Command::Tokens => driver.emit_tokens(file_id, dialect),
        Command::Parse => driver.parse_and_emit_schema(file_id, dialect),
        Command::Fmt => driver.format_and_emit_source(file_id, dialect),
        Command::Compile => driver.compile_and_emit_source(file_id, dialect),
        Command::Roundtrip => driver.roundtrip_and_emit(file_id, dialect),
        Command::Check => driver.check(file_id, dialect),
        Command::Stream { chunk_size, lenient } => {
            driver.stream_and_emit(file_id, dialect, chunk_size.max(1), lenient)
        }
    };

    std::process::exit(status.exit_code())
}

#[derive(Debug)]
enum Command {
    Tokens,
    Parse,
    Fmt,
    Compile,
    Roundtrip,
    Check,
    Stream { chunk_size: usize, lenient: bool },
}
