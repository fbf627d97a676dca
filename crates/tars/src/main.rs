use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tars::models::config::TarsConfig;
use tars::{LogMetrics, Tars};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tars", about = "Trading Agent Recommendation Synthesizer")]
struct Cli {
    /// Path to configuration file. Built-in defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Pretty-print the output JSON
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a symbol with every enabled agent and print the recommendation
    Analyze { symbol: String },
    /// Print stored recommendations for a symbol, newest first
    History {
        symbol: String,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

fn load_config(path: Option<&str>) -> Result<TarsConfig> {
    let Some(path) = path else {
        return Ok(TarsConfig::default());
    };
    let config_str =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config: {path}"))?;
    toml::from_str(&config_str).with_context(|| "Failed to parse config")
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{output}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let tars = Tars::from_config(&config, Arc::new(LogMetrics)).context("Failed to build pipeline")?;

    match cli.command {
        Command::Analyze { symbol } => {
            let symbol = symbol.trim().to_ascii_uppercase();
            let cancel = CancellationToken::new();
            let shutdown = cancel.clone();
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Received shutdown signal");
                shutdown.cancel();
            });

            let recommendation = tars
                .analyze(&cancel, &symbol)
                .await
                .map_err(|e| anyhow::anyhow!("Analysis failed: {e}"))?;
            print_json(&recommendation, cli.pretty)?;
        }
        Command::History { symbol, limit } => {
            let symbol = symbol.trim().to_ascii_uppercase();
            let recommendations = tars
                .history(&symbol, limit)
                .with_context(|| format!("Failed to read history for {symbol}"))?;
            print_json(&recommendations, cli.pretty)?;
        }
    }

    Ok(())
}
