//! Line-oriented chat REPL with cognitive backtracking.
//!
//! Reads user messages from stdin, streams the model's answer to stdout,
//! and prints a short notice whenever the model rewinds itself. The API key
//! comes from `SELKIE_API_KEY`; everything else from the config file.

use std::io::Write as _;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use selkie::engine::{TurnEngine, TurnSink};
use selkie::providers::openai::{OpenAiAdapter, OpenAiConfig};
use selkie::signal::grammar::BacktrackSignal;
use selkie::{default_config_path, load_config};

/// Sink that renders the turn to the terminal.
struct PrintSink;

#[async_trait]
impl TurnSink for PrintSink {
    async fn on_text(&self, segment: &str) {
        print!("{segment}");
        let _ = std::io::stdout().flush();
    }

    async fn on_backtrack(&self, signal: &BacktrackSignal, new_visible: &str) {
        println!();
        println!("-- rewound to {} ({}) --", signal.id, signal.reason);
        print!("{new_visible}");
        let _ = std::io::stdout().flush();
    }

    async fn on_error(&self, message: &str) {
        eprintln!();
        eprintln!("error: {message}");
    }

    async fn on_done(&self, _full_text: &str) {
        println!();
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("selkie-chat failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config_path = default_config_path().context("no platform config directory")?;
    let config = load_config(&config_path)?;
    let api_key = std::env::var("SELKIE_API_KEY").unwrap_or_default();

    let adapter = OpenAiAdapter::new(
        OpenAiConfig::new(api_key, config.model.clone()).with_base_url(config.base_url.clone()),
    );
    let mut engine = TurnEngine::new(config, Arc::new(adapter));
    let sink = PrintSink;

    println!("selkie-chat — type a message, or \"exit\" to quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("you> ");
        let _ = std::io::stdout().flush();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        // Errors were already rendered via the sink; the turn was rolled
        // back, so the next message starts clean.
        let _ = engine.run(line, &sink).await;
    }

    Ok(())
}
