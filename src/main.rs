use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use webrag::api::server;
use webrag::config::Config;
use webrag::pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "webrag", version, about = "Crawl a site, index it, ask it questions")]
struct Cli {
    /// Path to the JSON config file.
    #[arg(long, default_value = "config.json", global = true)]
    config: String,

    /// Base URL of a running webrag server (client commands).
    #[arg(long, default_value = "http://localhost:8000", global = true)]
    base_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server.
    Serve {
        /// Listen address, overriding the configured one.
        #[arg(long)]
        addr: Option<String>,
        /// Restore a previously saved index before serving.
        #[arg(long)]
        load_index: bool,
    },
    /// Ask a running server to crawl a site.
    Crawl {
        start_url: String,
        #[arg(long)]
        max_pages: Option<usize>,
        #[arg(long)]
        max_depth: Option<usize>,
        #[arg(long)]
        crawl_delay_ms: Option<u64>,
    },
    /// Ask a running server to (re)build its index.
    Index {
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },
    /// Ask a running server a question.
    Ask {
        question: Vec<String>,
        #[arg(long)]
        top_k: Option<usize>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { addr, load_index } => {
            let config = Config::load(&cli.config)?;
            config.validate()?;

            let addr = addr.unwrap_or_else(|| config.listen_addr.clone());
            let mut pipeline = Pipeline::new(config).context("failed to build pipeline")?;
            if load_index {
                let count = pipeline
                    .load_index()
                    .context("failed to load saved index")?;
                tracing::info!("restored index with {count} vectors");
            }

            let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
            runtime.block_on(server::serve(&addr, pipeline))
        }
        Command::Crawl {
            start_url,
            max_pages,
            max_depth,
            crawl_delay_ms,
        } => post(
            &cli.base_url,
            "/crawl",
            &json!({
                "start_url": start_url,
                "max_pages": max_pages,
                "max_depth": max_depth,
                "crawl_delay_ms": crawl_delay_ms,
            }),
        ),
        Command::Index {
            chunk_size,
            chunk_overlap,
        } => post(
            &cli.base_url,
            "/index",
            &json!({
                "chunk_size": chunk_size,
                "chunk_overlap": chunk_overlap,
            }),
        ),
        Command::Ask { question, top_k } => post(
            &cli.base_url,
            "/ask",
            &json!({
                "question": question.join(" "),
                "top_k": top_k,
            }),
        ),
    }
}

/// POST a JSON body to the server and pretty-print the reply.
fn post(base_url: &str, path: &str, body: &serde_json::Value) -> Result<()> {
    let url = format!("{}{path}", base_url.trim_end_matches('/'));
    let resp = reqwest::blocking::Client::new()
        .post(&url)
        .json(body)
        .send()
        .with_context(|| format!("request to {url} failed"))?;

    let status = resp.status();
    let value: serde_json::Value = resp
        .json()
        .with_context(|| format!("non-JSON reply from {url}"))?;
    println!("{}", serde_json::to_string_pretty(&value)?);

    anyhow::ensure!(status.is_success(), "server replied {status}");
    Ok(())
}
