use std::ffi::OsString;
use std::process::ExitCode;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::Parser;
use pollbooth_wait::{estimate, WaitTimeResult};
use tracing_subscriber::EnvFilter;

const ARITY_ERROR: &str =
    "Incorrect number of arguments. Expected: queue_length avg_processing_time_minutes";

#[derive(Parser, Debug)]
#[command(
    name = "predict-wait-time",
    version,
    about = "Estimate the wait time for a polling-booth queue"
)]
struct Cli {
    /// Number of voters currently waiting
    #[arg(allow_hyphen_values = true, allow_negative_numbers = true)]
    queue_length: String,
    /// Average minutes spent processing one voter
    #[arg(allow_hyphen_values = true, allow_negative_numbers = true)]
    avg_processing_time_minutes: String,
}

/// What the process prints on stdout and how it exits.
#[derive(Debug)]
struct Outcome {
    result: WaitTimeResult,
    exit_code: u8,
}

impl Outcome {
    fn estimated(queue_length: &str, avg_processing_time_minutes: &str) -> Self {
        Self {
            result: estimate(queue_length, avg_processing_time_minutes),
            exit_code: 0,
        }
    }

    fn wrong_arity() -> Self {
        Self {
            result: WaitTimeResult::error(ARITY_ERROR),
            exit_code: 1,
        }
    }
}

fn run<I, T>(args: I) -> Result<Outcome, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();

    // `--` is an ordinary argument here, not clap's end-of-options marker.
    if args.iter().skip(1).any(|arg| arg == "--") {
        return Ok(match args.get(1..).unwrap_or_default() {
            [queue_length, avg] => {
                Outcome::estimated(&queue_length.to_string_lossy(), &avg.to_string_lossy())
            }
            _ => Outcome::wrong_arity(),
        });
    }

    match Cli::try_parse_from(args) {
        Ok(cli) => Ok(Outcome::estimated(
            &cli.queue_length,
            &cli.avg_processing_time_minutes,
        )),
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            Err(err)
        }
        Err(err) => {
            tracing::debug!(kind = ?err.kind(), "rejected command line");
            Ok(Outcome::wrong_arity())
        }
    }
}

fn main() -> Result<ExitCode> {
    // stdout carries exactly one JSON line; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let outcome = match run(std::env::args_os()) {
        Ok(outcome) => outcome,
        Err(help) => help.exit(),
    };

    println!("{}", serde_json::to_string(&outcome.result)?);
    Ok(ExitCode::from(outcome.exit_code))
}
