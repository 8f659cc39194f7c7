//! techwriter-cli: command-line front end for text correction
//!
//! Reads text from an argument or stdin, corrects it through a local
//! Ollama server, and prints the result.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use techwriter_core::Config;
use techwriter_llm::Corrector;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "techwriter")]
#[command(about = "Spelling, grammar, and style correction with a local LLM")]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Correct a piece of text
    Correct {
        /// Correction mode (see list-modes)
        #[arg(short, long)]
        mode: Option<String>,

        /// Text to correct; read from stdin if omitted
        text: Option<String>,
    },

    /// List available correction modes
    ListModes,

    /// Print the effective configuration
    ShowConfig,

    /// Write a default config file if none exists
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout only carries corrected text
    let default_filter = if cli.verbose {
        "warn,techwriter=debug,techwriter_core=debug,techwriter_llm=debug"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Some(Commands::Correct { mode, text }) => {
            let config = load_config(cli.config.as_deref())?;
            correct(&config, mode, text).await?;
        }
        Some(Commands::ListModes) => {
            let config = load_config(cli.config.as_deref())?;
            list_modes(&config)?;
        }
        Some(Commands::ShowConfig) => {
            let config = load_config(cli.config.as_deref())?;
            print!("{}", config.to_toml()?);
        }
        Some(Commands::InitConfig) => {
            let path = cli.config.unwrap_or_else(Config::default_path);
            if Config::ensure_default_exists(&path)? {
                println!("Wrote default config to {:?}", path);
            } else {
                println!("Config already exists at {:?}", path);
            }
        }
        None => {
            println!("techwriter - text correction with a local LLM");
            println!("Run with --help for usage");
        }
    }

    Ok(())
}

/// Load the file config, apply environment overrides, and validate
fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            let mut config = Config::load_existing(path)?;
            config.apply_env();
            config.validate()?;
            config
        }
        None => Config::load()?,
    };
    debug!("Effective config: {:?}", config);
    Ok(config)
}

async fn correct(config: &Config, mode: Option<String>, text: Option<String>) -> Result<()> {
    let corrector = Corrector::from_config(config)?;
    let mode = mode.unwrap_or_else(|| config.prompts.default_mode.clone());

    let text = match text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read text from stdin")?;
            buf
        }
    };

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]")?,
    );
    spinner.set_message(format!("Correcting ({})", mode));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = corrector.correct(&mode, &text).await;
    spinner.finish_and_clear();

    match result {
        Ok(correction) => {
            println!("{}", correction.text);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}: {}", e.kind(), e);
            if e.kind().is_retryable() {
                eprintln!(
                    "Check that the Ollama server at {} is running and try again.",
                    config.backend.base_url
                );
            }
            std::process::exit(1);
        }
    }
}

fn list_modes(config: &Config) -> Result<()> {
    let corrector = Corrector::from_config(config)?;
    let registry = corrector.registry();

    for mode in corrector.modes() {
        let model = registry.model_for(mode).unwrap_or(registry.default_model());
        let default_marker = if mode == config.prompts.default_mode {
            " (default)"
        } else {
            ""
        };
        println!("{}{}\n    Model: {}", mode, default_marker, model);
    }

    Ok(())
}
