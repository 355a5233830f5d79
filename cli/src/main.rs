//! EntityX Monitor CLI.
//!
//! Thin front end over the core crates: routes URLs with the content
//! classifier and exercises the SSRF-guarded fetcher from the shell.
//!
//! Exit codes: 0 on success, 1 when a fetch or host check fails, 2 on usage
//! errors (reported by clap).

mod args;

use std::io;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use entityx_core::{EntityxConfig, classify};
use entityx_fetch::{FetchError, Fetcher};
use serde_json::json;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use args::{Cli, Command};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // Stdout carries command output; logs go to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli)?;

    match cli.command {
        Command::Classify { urls } => {
            for url in urls {
                println!("{}\t{url}", classify(&url));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Fetch { url } => {
            let fetcher = Fetcher::new(&config.fetch).context("invalid fetch configuration")?;
            match fetcher.fetch(&url).await {
                Ok(payload) => {
                    print_json(&json!({
                        "final_url": payload.final_url.as_str(),
                        "content_type": payload.content_type,
                        "content_type_source": payload.content_type_source,
                        "bytes": payload.bytes.len(),
                    }))?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => report_fetch_error(&e),
            }
        }
        Command::CheckHost { url } => {
            let fetcher = Fetcher::new(&config.fetch).context("invalid fetch configuration")?;
            match fetcher.check_host(&url).await {
                Ok(addresses) => {
                    for address in addresses {
                        println!("{}\t{}", address.ip, address.class);
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => report_fetch_error(&e),
            }
        }
    }
}

fn load_config(cli: &Cli) -> Result<EntityxConfig> {
    match &cli.config {
        Some(path) => {
            let config = EntityxConfig::load_from(path)?
                .with_context(|| format!("config file not found: {}", path.display()))?;
            Ok(config)
        }
        None => Ok(EntityxConfig::load()),
    }
}

fn report_fetch_error(error: &FetchError) -> Result<ExitCode> {
    print_json(&error.to_json())?;
    Ok(ExitCode::FAILURE)
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("serializing output")?;
    println!("{rendered}");
    Ok(())
}
