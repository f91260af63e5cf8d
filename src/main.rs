//! Purpose: `lgeos` CLI entry point: locate, load, and probe the GEOS C library.
//! Role: Binary crate root; parses args, runs one command, emits JSON on stdout.
//! Invariants: Commands emit a single JSON document on stdout.
//! Invariants: Errors are emitted as JSON on stderr; exit code comes from `api::to_exit_code`.
//! Invariants: `locate` never opens the library; `version` and `check` do.
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

use lgeos::api::{
    EnvSource, Error, ErrorKind, Geos, GeosLibrary, JsonFileSource, Layered, Located, Settings,
    candidate_names, locate_library, to_exit_code,
};

#[derive(Parser, Debug)]
#[command(
    name = "lgeos",
    version,
    about = "Locate, load, and probe the GEOS C library"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Explicit path to the GEOS C library (overrides settings and GEOS_LIBRARY_PATH)",
        value_hint = ValueHint::FilePath
    )]
    library: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        help = "JSON settings file with a geos_library_path key",
        value_hint = ValueHint::FilePath
    )]
    config: Option<PathBuf>,
    #[arg(
        short,
        long,
        global = true,
        action = ArgAction::Count,
        help = "Log more (-v info, -vv debug); RUST_LOG takes precedence"
    )]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show where the GEOS library would be loaded from, without loading it.
    Locate,
    /// Load GEOS and print its version.
    Version,
    /// Load GEOS, validate entry points, and check that the given symbols are exported.
    Check {
        #[arg(value_name = "SYMBOL")]
        symbols: Vec<String>,
    },
}

fn main() {
    let exit_code = match run() {
        Ok(code) => code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<i32, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(code);
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Run `lgeos --help` for usage."));
            }
        },
    };

    init_tracing(cli.verbose);
    let library = Arc::new(build_library(&cli));

    let value = match cli.command {
        Command::Locate => locate_json(&library)?,
        Command::Version => version_json(&Geos::new(library))?,
        Command::Check { symbols } => {
            let geos = Geos::new(library);
            let (value, ok) = check_json(&geos, &symbols)?;
            emit_json(&value);
            return Ok(if ok { 0 } else { to_exit_code(ErrorKind::Symbol) });
        }
    };
    emit_json(&value);
    Ok(0)
}

fn build_library(cli: &Cli) -> GeosLibrary {
    let mut layered = Layered::new();
    if let Some(path) = &cli.library {
        layered = layered.push(Settings::with_library_path(path));
    }
    if let Some(path) = &cli.config {
        layered = layered.push(JsonFileSource::new(path));
    }
    layered = layered.push(EnvSource::default());
    GeosLibrary::new().with_config(layered)
}

fn locate_json(library: &GeosLibrary) -> Result<Value, Error> {
    let candidates: Vec<&str> = candidate_names(library.platform())
        .map(|names| names.to_vec())
        .unwrap_or_default();
    let located = locate_library(library.platform(), library.config(), library.search())?;
    let (source, name) = match &located {
        Located::Override(_) => ("override", None),
        Located::Search { name, .. } => ("search", Some(name.clone())),
    };
    Ok(json!({
        "platform": library.platform().to_string(),
        "candidates": candidates,
        "source": source,
        "name": name,
        "path": located.path().display().to_string(),
    }))
}

fn version_json(geos: &Geos) -> Result<Value, Error> {
    let raw = geos.version()?;
    let version = geos.version_tuple()?;
    let handle = geos.handle()?;
    Ok(json!({
        "path": handle.path().display().to_string(),
        "version": raw,
        "tuple": [version.major, version.minor, version.subminor],
    }))
}

fn check_json(geos: &Geos, symbols: &[String]) -> Result<(Value, bool), Error> {
    let handle = geos.handle()?;
    let mut ok = true;
    let mut results = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        match geos.probe(symbol) {
            Ok(()) => results.push(json!({"symbol": symbol, "found": true})),
            Err(err) => {
                ok = false;
                tracing::warn!(symbol = %symbol, error = %err, "symbol not exported");
                results.push(json!({"symbol": symbol, "found": false}));
            }
        }
    }
    let bindings = serde_json::to_value(geos.bindings()).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode bindings")
            .with_source(err)
    })?;
    let value = json!({
        "path": handle.path().display().to_string(),
        "entry_points": bindings,
        "symbols": results,
        "ok": ok,
    });
    Ok((value, ok))
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim_start_matches("error: ").trim().to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

fn emit_json(value: &Value) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::Unsupported => "unsupported platform".to_string(),
        ErrorKind::Config => "configuration error".to_string(),
        ErrorKind::Load => "failed to load library".to_string(),
        ErrorKind::Symbol => "symbol not found".to_string(),
        ErrorKind::Geos => "GEOS reported an error".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(symbol) = err.symbol() {
        inner.insert("symbol".to_string(), json!(symbol));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    if let Some(symbol) = err.symbol() {
        lines.push(format!("symbol: {symbol}"));
    }
    for cause in error_causes(err) {
        lines.push(format!("caused by: {cause}"));
    }
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    lines.join("\n")
}
