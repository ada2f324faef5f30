//! rd - replydash command line
//!
//! Runs a packet of requests against simulated strategies and prints the
//! aggregated replies.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use eyre::{Context, Result};
use tracing::info;

use replydash::cli::{Cli, Command, OutputFormat};
use replydash::config::Config;
use replydash::domain::{MainReply, Reply};
use replydash::runner::PacketOutcome;

fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("replydash")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Write to the log file so stdout stays clean for replies
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("rd.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(
        "replydash loaded config: strategies={}, strict-order={}",
        config.strategies.len(),
        config.dashboard.strict_order
    );

    match cli.command {
        Some(Command::Run {
            requests,
            strict,
            soft_ms,
            hard_ms,
            format,
        }) => cmd_run(config, requests, strict, soft_ms, hard_ms, format).await,
        Some(Command::ShowConfig) => cmd_show_config(&config),
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Run one packet and print its replies
async fn cmd_run(
    mut config: Config,
    requests: Vec<String>,
    strict: bool,
    soft_ms: Option<u64>,
    hard_ms: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    if strict {
        config.dashboard.strict_order = true;
    }
    if let Some(ms) = soft_ms {
        config.dashboard.soft_timeout_ms = ms;
    }
    if let Some(ms) = hard_ms {
        config.dashboard.hard_timeout_ms = ms;
    }
    config.validate()?;

    let requests: Vec<String> = requests
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();
    if requests.is_empty() {
        return Err(eyre::eyre!("No request identifiers given"));
    }

    let outcome = config.runner().run(requests).await.context("Packet run failed")?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        OutputFormat::Text => print_outcome(&outcome),
    }
    Ok(())
}

fn print_outcome(outcome: &PacketOutcome) {
    println!("Packet {}", outcome.packet_id);
    for reply in &outcome.replies {
        println!("  {}", describe(reply));
    }
    println!();
    println!(
        "{} replies, {} workers started, {} soft timeouts{} ({} ms)",
        outcome.replies.len(),
        outcome.runner.workers_started,
        outcome.runner.soft_timeouts,
        if outcome.runner.hard_timeout { ", hard timeout" } else { "" },
        outcome.runner.elapsed_ms
    );
}

fn describe(reply: &Reply) -> String {
    let main = match &reply.main {
        MainReply::Delivered(d) => format!("{} from {}", d.kind, d.strategy),
        MainReply::NoReply { tried } if tried.is_empty() => "no reply".to_string(),
        MainReply::NoReply { tried } => format!("no reply (tried {})", tried.join(", ")),
    };
    let mut line = format!("{}: {}", reply.identifier, main);
    if !reply.supplementary.is_empty() {
        line.push_str(&format!(" +{} supplementary", reply.supplementary.len()));
    }
    if !reply.synonyms.is_empty() {
        line.push_str(&format!(" [aka {}]", reply.synonyms.join(", ")));
    }
    line
}

/// Print the effective configuration
fn cmd_show_config(config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    print!("{}", yaml);
    Ok(())
}
