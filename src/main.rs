//! hookflow - inspect and validate transition definitions.
//!
//! Definitions are the JSON or YAML documents an application loads into a
//! `hookflow_core::Engine`. This tool checks them before they ship.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::{Config, OutputFormat};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hookflow")]
#[command(about = "Inspect and validate hookflow transition definitions")]
#[command(version)]
struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, env = "HOOKFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Output format (overrides the configured one)
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode and compile a definition, reporting problems
    Validate {
        /// Definition file (.json, .yaml or .yml)
        file: PathBuf,
    },

    /// Print the compiled transition table
    Inspect {
        /// Definition file (.json, .yaml or .yml)
        file: PathBuf,

        /// Only show transitions leaving this state
        #[arg(short, long)]
        from: Option<String>,
    },

    /// Show how a handler reference is parsed
    Parse {
        /// Handler literal, e.g. "auth(AUTH_1)"
        literal: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    };
    if let Some(format) = cli.output {
        config.output.format = format;
    }
    if cli.no_color {
        config.output.color = false;
    }
    if !config.output.color {
        colored::control::set_override(false);
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .init();

    match commands::execute(cli.command, config.output.format) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }
}
