//! Fundwatch CLI.
//!
//! Performs one authenticated portal pass end to end: land on the login
//! page, clear the consent popup, resolve the session, confirm the portfolio
//! page, extract the individual rate of return, and deliver it to the
//! configured sinks.
//!
//! Usage:
//!   $ FUNDWATCH_LOGIN_URL=... FUNDWATCH_PORTFOLIO_URL=... \
//!     FUNDWATCH_USERNAME=... FUNDWATCH_PASSWORD=... \
//!     cargo run --bin fundwatch -- run
//!   Watch the browser while it works:
//!     $ cargo run --bin fundwatch -- run --show-browser -v

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::warn;

use fundwatch::browser::LaunchPlan;
use fundwatch::config::{FundwatchConfig, Verbosity};
use fundwatch::logging::{LogCallback, LogLevel, RunLogger};
use fundwatch::outcome::RunOutcome;
use fundwatch::run::{run_once, RunSinks};
use fundwatch::runtime::ChromiumDriver;
use fundwatch::sinks::{CsvSink, MessageSink, NotifyClient, RecordSink, SheetsClient, SheetsTarget};

#[derive(Parser)]
#[command(
    name = "fundwatch",
    author,
    version,
    about = "Watches a fund portal and records the portfolio rate of return"
)]
struct Cli {
    /// Increase log verbosity (pass multiple times for DEBUG).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Perform one portal pass and deliver the extracted value.
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Show the launched browser window.
    #[arg(long)]
    show_browser: bool,

    /// Override the CSV history file path.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Override the diagnostic screenshot path.
    #[arg(long)]
    screenshot: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_env_logger();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run_command(args, cli.verbose).await,
    }
}

async fn run_command(args: RunArgs, verbose_count: u8) -> Result<()> {
    let mut config = FundwatchConfig::from_env().context("failed to read configuration")?;
    if verbose_count > 0 {
        config.verbose = verbosity_from_count(verbose_count);
    }
    if args.show_browser {
        config.headless = false;
    }
    if let Some(csv) = args.csv {
        config.csv_path = csv;
    }
    if let Some(screenshot) = args.screenshot {
        config.screenshot_path = screenshot;
    }

    let target = config
        .run_target()
        .context("portal URLs and credentials are required")?;

    let mut logger = RunLogger::new(config.verbose);
    logger.set_external_logger(Some(make_log_bridge()));

    let sinks = build_sinks(&config)?;

    let plan = LaunchPlan::from_config(&config);
    let driver = ChromiumDriver::launch(&plan, logger.clone())
        .await
        .context("failed to launch browser")?;

    let (outcome, _metrics) = run_once(Box::new(driver), &target, &config, &sinks, &logger).await;

    match outcome {
        RunOutcome::Success { value, .. } => {
            println!("SUCCESS: {}", value.raw);
            Ok(())
        }
        RunOutcome::Failure { kind, diagnostic } => {
            bail!("run failed ({kind:?}): {diagnostic}")
        }
    }
}

fn build_sinks(config: &FundwatchConfig) -> Result<RunSinks> {
    let mut records: Vec<Box<dyn RecordSink>> =
        vec![Box::new(CsvSink::new(config.csv_path.clone()))];

    if let (Some(sheet_id), Some(token)) = (&config.sheet_id, &config.sheet_token) {
        let target = SheetsTarget {
            spreadsheet_id: sheet_id.clone(),
            worksheet: config.sheet_worksheet.clone(),
        };
        let client = SheetsClient::new(config.sheets_api_url.clone(), token.clone(), target)
            .context("failed to construct sheets client")?;
        records.push(Box::new(client));
    } else if config.sheet_id.is_some() || config.sheet_token.is_some() {
        warn!(
            "sheets sink disabled: FUNDWATCH_SHEET_ID and FUNDWATCH_SHEET_TOKEN must both be set"
        );
    } else {
        warn!("sheets sink disabled: no spreadsheet configured");
    }

    let messenger: Option<Box<dyn MessageSink>> = match &config.notify_token {
        Some(token) => Some(Box::new(
            NotifyClient::new(
                config.notify_api_url.clone(),
                token.clone(),
                config.notify_recipient.clone(),
            )
            .context("failed to construct notify client")?,
        )),
        None => None,
    };

    Ok(RunSinks { records, messenger })
}

fn make_log_bridge() -> LogCallback {
    Arc::new(|record| {
        let category = record.category.as_deref().unwrap_or("run");
        match record.level {
            LogLevel::Error => log::error!("[{category}] {}", record.message),
            LogLevel::Info => log::info!("[{category}] {}", record.message),
            LogLevel::Debug => log::debug!("[{category}] {}", record.message),
        }
        if let Some(aux) = &record.auxiliary {
            if !aux.is_null() {
                log::debug!("[{category}] {aux}");
            }
        }
    })
}

fn verbosity_from_count(count: u8) -> Verbosity {
    match count {
        0 => Verbosity::Medium,
        _ => Verbosity::Detailed,
    }
}

fn init_env_logger() {
    if env::var("RUST_LOG").is_err() {
        unsafe {
            env::set_var("RUST_LOG", "info");
        }
    }

    let _ = env_logger::Builder::from_env(env_logger::Env::default())
        .format_timestamp_secs()
        .try_init();
}
