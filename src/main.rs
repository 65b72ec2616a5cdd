//! FIFO Ledger CLI
//!
//! Reads a transaction CSV, matches spends and expirations to earned lots,
//! and writes the requested table to stdout.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- transactions.csv --report redemptions > redemptions.csv
//! ```
//!
//! # Options
//!
//! - `--report <links|lots|redemptions|balances|current|findings>` (default `links`)
//! - `--max-transactions N`: refuse inputs larger than `N`
//! - `--threads N`: match on a dedicated pool of `N` workers
//! - `--strict-funding`: reject customers with under-funded consumers
//! - `--fail-on-error`: exit non-zero when a validation stage fails
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Set to `debug` or `warn` to control logging verbosity

use chrono::Utc;
use fifo_ledger::{
    validate_matches, validate_source, write_report, EngineConfig, EngineError, LedgerEngine,
    ReportKind, Result, Severity, UnderfundedPolicy,
};
use log::{info, warn};
use std::env;
use std::fs::File;
use std::io::{self, BufReader};
use std::process;

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

struct Options {
    input_path: String,
    report: ReportKind,
    fail_on_error: bool,
    config: EngineConfig,
}

fn parse_count(flag: &str, value: Option<String>) -> Result<usize> {
    let value = value.ok_or_else(|| EngineError::Usage(format!("{} needs a value", flag)))?;
    value
        .parse()
        .map_err(|_| EngineError::Usage(format!("{} expects a number, got '{}'", flag, value)))
}

fn parse_args<I: Iterator<Item = String>>(mut args: I) -> Result<Options> {
    let mut input_path = None;
    let mut report = ReportKind::default();
    let mut fail_on_error = false;
    let mut config = EngineConfig::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--report" => {
                let value = args
                    .next()
                    .ok_or_else(|| EngineError::Usage("--report needs a value".to_string()))?;
                report = value.parse()?;
            }
            "--max-transactions" => {
                config.max_transactions = Some(parse_count(&arg, args.next())?);
            }
            "--threads" => config.threads = Some(parse_count(&arg, args.next())?),
            "--strict-funding" => config.underfunded = UnderfundedPolicy::Reject,
            "--fail-on-error" => fail_on_error = true,
            flag if flag.starts_with("--") => {
                return Err(EngineError::Usage(format!("Unknown option '{}'", flag)));
            }
            _ if input_path.is_none() => input_path = Some(arg.clone()),
            _ => return Err(EngineError::Usage(format!("Unexpected argument '{}'", arg))),
        }
    }

    let input_path =
        input_path.ok_or_else(|| EngineError::Usage("Missing input file argument".to_string()))?;

    Ok(Options {
        input_path,
        report,
        fail_on_error,
        config,
    })
}

fn run() -> Result<()> {
    let options = parse_args(env::args().skip(1))?;

    let file = File::open(&options.input_path)?;
    let reader = BufReader::new(file);

    let tolerance = options.config.tolerance;
    let mut engine = LedgerEngine::with_config(options.config);
    engine.ingest_csv(reader)?;
    info!("Loaded {} transactions from {}", engine.len(), options.input_path);

    let report = engine.run()?;

    let fatal = report.findings_at(Severity::Fatal).count();
    if fatal > 0 {
        warn!("{} partitions or rows rejected while loading", fatal);
        if options.fail_on_error {
            return Err(EngineError::ValidationFailed {
                stage: "load".to_string(),
                errors: fatal,
            });
        }
    }

    let source = validate_source(&engine.transactions(), Utc::now());
    let post_match = validate_matches(&report, tolerance);
    for stage in [&source, &post_match] {
        if !stage.passed() || stage.warning_count() > 0 {
            warn!("{}", stage);
        }
        stage.gate(options.fail_on_error)?;
    }

    let stdout = io::stdout();
    let handle = stdout.lock();
    write_report(&report, options.report, handle)?;

    Ok(())
}
