use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use log::info;
use structopt::StructOpt;

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

mod aggregate;
mod allowlist;
mod config;
mod decoder;
mod driver;
mod error;
mod filter;
mod logger;
mod output;
mod record;

use config::Configuration;
use error::{AppError, ConfigError};

#[derive(Debug, StructOpt)]
#[structopt(name = "dns-allowlist")]
struct Opts {
    /// Path to the tolerant-JSON configuration file
    #[structopt(short = "-c", long = "--config")]
    config: Option<PathBuf>,

    /// Reference time for the training window, as an RFC3339 timestamp
    #[structopt(short = "-n", long = "--now")]
    now: Option<String>,

    /// Where to write the allowlist CSV. Use - for standard output. If
    /// omitted, only a one-line summary is printed.
    #[structopt(short = "-o", long = "--output")]
    output: Option<String>,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[structopt(short = "-v", long = "--verbose", parse(from_occurrences))]
    verbose: u8,

    /// nfdump files to process
    #[structopt(name = "FILES", parse(from_os_str))]
    files: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let opts = Opts::from_args();
    logger::init(opts.verbose);

    match run(opts) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn run(opts: Opts) -> Result<(), AppError> {
    let config = Configuration::load(opts.config.as_deref())?;

    let now_raw = opts.now.as_deref().ok_or_else(|| {
        AppError::Config(ConfigError::InvalidValue {
            field: "now",
            reason: "--now is required to evaluate the training window".to_string(),
        })
    })?;
    let now = parse_now(now_raw)?;

    info!("starting run over {} file(s)", opts.files.len());

    let workers = num_cpus::get();
    let data = driver::run(&opts.files, &config, workers)?;
    let allowlist = allowlist::build_allowlist(&data, &config, now.timestamp());

    match opts.output {
        None => {
            println!("The allowlist contains {} entries.", allowlist.len());
        }
        Some(output) if output == "-" => {
            output::write_allowlist_csv(io::stdout(), &allowlist)?;
        }
        Some(output) => {
            let file = std::fs::File::create(&output)
                .map_err(|source| AppError::io(format!("creating output file {:?}", output), source))?;
            output::write_allowlist_csv(file, &allowlist)?;
        }
    }

    Ok(())
}

fn parse_now(raw: &str) -> Result<DateTime<Utc>, ConfigError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| ConfigError::InvalidNow {
            value: raw.to_string(),
            source,
        })
}
