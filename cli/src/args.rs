//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "entityx", version)]
#[command(about = "Route URLs and fetch them through the SSRF guard")]
#[command(after_help = "Logging goes to stderr; set RUST_LOG to change the level (default: info).")]
pub struct Cli {
    /// Config file (default: ~/.entityx/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Print the content category of each URL
    Classify {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Fetch through the SSRF guard and print a JSON summary
    Fetch { url: String },
    /// Validate the URL and resolve its host through the guard
    CheckHost { url: String },
}
