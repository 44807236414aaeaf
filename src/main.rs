//! Purpose: `vwgate` CLI entry point: version, smoke check, and line-oriented prediction.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Commands emit one JSON value per line on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Every engine call goes through `api::Vw` (gate + load-once).
use std::error::Error as StdError;
use std::io::{self, BufRead, BufWriter, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

use vwgate::api::{
    Error, ErrorKind, LIBRARY_ENV, Multilabel, NativeConfig, NativeEngine, Topics, Vw,
    to_exit_code,
};

const SMOKE_COMMANDS: [&str; 2] = ["", "--quiet"];

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "vwgate",
    version,
    about = "Drive the Vowpal Wabbit native engine through a thread-safe gate",
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Path to the native engine library (default: $VWGATE_LIB, then the platform name of `vwgate`)",
        value_hint = ValueHint::FilePath
    )]
    lib: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the native engine version.
    Version,
    /// Open and close instances with an empty and a `--quiet` command.
    Smoke,
    /// Read one example per stdin line and print one prediction per line.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(
        long,
        default_value = "--quiet",
        allow_hyphen_values = true,
        help = "Engine command line, passed through untouched"
    )]
    command: String,
    #[arg(long, conflicts_with_all = ["topics", "labels"], help = "Learn from each example")]
    learn: bool,
    #[arg(long, conflicts_with = "labels", help = "Emit topic weights (LDA models)")]
    topics: bool,
    #[arg(long, help = "Emit label sets (multi-label decoding is not implemented)")]
    labels: bool,
}

#[derive(Serialize)]
struct OutputLine {
    line: usize,
    #[serde(flatten)]
    outcome: Outcome,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum Outcome {
    Prediction(f32),
    Topics(Vec<f32>),
    Labels(Vec<i32>),
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome { exit_code });
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage).with_message(clap_error_summary(&err)));
            }
        },
    };

    init_tracing();

    let config = match cli.lib {
        Some(path) => NativeConfig::default().with_library_path(path),
        None => NativeConfig::from_env(),
    };
    let engine = Arc::new(NativeEngine::new(config));
    tracing::debug!(
        env = LIBRARY_ENV,
        path = %engine.config().library_path().display(),
        "native config"
    );

    match cli.command {
        Command::Version => {
            let version = engine.version()?;
            emit_json(&json!({ "version": version }))?;
        }
        Command::Smoke => {
            for command in SMOKE_COMMANDS {
                let vw = Vw::with_engine(engine.clone(), command)?;
                vw.close()?;
            }
            emit_json(&json!({ "smoke": "ok", "commands": SMOKE_COMMANDS }))?;
        }
        Command::Run(args) => run_examples(engine, args)?,
    }
    Ok(RunOutcome::ok())
}

fn run_examples(engine: Arc<NativeEngine>, args: RunArgs) -> Result<(), Error> {
    let vw = Vw::with_engine(engine, args.command.as_str())?;
    let topics = vw.multi_predictor(Topics);
    let labels = vw.multi_predictor(Multilabel);

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for (index, line) in stdin.lock().lines().enumerate() {
        let line = line.map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to read stdin")
                .with_source(err)
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let outcome = if args.topics {
            Outcome::Topics(topics.predict(&line)?)
        } else if args.labels {
            Outcome::Labels(labels.predict(&line)?)
        } else if args.learn {
            Outcome::Prediction(vw.learn(&line)?)
        } else {
            Outcome::Prediction(vw.predict(&line)?)
        };
        let record = OutputLine {
            line: index + 1,
            outcome,
        };
        serde_json::to_writer(&mut out, &record).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode output")
                .with_source(err)
        })?;
        writeln!(out).map_err(write_error)?;
    }
    out.flush().map_err(write_error)?;
    vw.close()
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn emit_json(value: &Value) -> Result<(), Error> {
    let json = serde_json::to_string(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode output")
            .with_source(err)
    })?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{json}").map_err(write_error)
}

fn write_error(err: io::Error) -> Error {
    Error::new(ErrorKind::Internal)
        .with_message("failed to write stdout")
        .with_source(err)
}

fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_start_matches("error:").trim().to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
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
        ErrorKind::Closed => "instance is closed".to_string(),
        ErrorKind::Unlinked => "native engine symbols are not linked".to_string(),
        ErrorKind::Load => "native engine library could not be loaded".to_string(),
        ErrorKind::Init => "native engine initialization failed".to_string(),
        ErrorKind::Native => "native engine call failed".to_string(),
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
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(code) = err.native_code() {
        inner.insert("native_code".to_string(), json!(code));
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
    if let Some(code) = err.native_code() {
        lines.push(format!("native code: {code}"));
    }
    for cause in error_causes(err) {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}
