use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use serde_json::json;

use spar_client::{persist, DebateClient, RemoteSummarizer, SummaryFanout};
use spar_llm::OpenAiProvider;
use spar_search::{ExaSearchProvider, SearchProvider, StaticSearchProvider};
use spar_server::{AppState, ServerConfig};
use spar_store::{Database, DebateRepo};

#[derive(Parser)]
#[command(name = "spar", about = "Two-persona Singapore tax debate orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the debate server.
    Serve {
        #[arg(long, default_value_t = 9090)]
        port: u16,
    },
    /// Ask a running server to debate a topic and persist the result.
    Ask {
        /// The tax matter to debate.
        topic: String,
        #[arg(long, default_value = "http://127.0.0.1:9090")]
        server: String,
        /// Ground the debate in web search results.
        #[arg(long)]
        web_search: bool,
        #[arg(long, default_value = "wide")]
        search_mode: String,
        #[arg(long, default_value_t = 5)]
        num_results: u32,
        #[arg(long)]
        include_summary: bool,
        /// Skip the TL;DR fan-out and local persistence.
        #[arg(long)]
        no_persist: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Serve { port } => serve(port).await,
        Command::Ask {
            topic,
            server,
            web_search,
            search_mode,
            num_results,
            include_summary,
            no_persist,
        } => {
            ask(
                topic,
                server,
                web_search,
                search_mode,
                num_results,
                include_summary,
                no_persist,
            )
            .await
        }
    }
}

async fn serve(port: u16) -> anyhow::Result<()> {
    let openai_key = std::env::var("OPENAI_API_KEY")
        .context("OPENAI_API_KEY must be set to run the server")?;
    let provider =
        OpenAiProvider::new(SecretString::from(openai_key)).context("build OpenAI client")?;

    let search: Arc<dyn SearchProvider> = match std::env::var("EXA_API_KEY") {
        Ok(key) => Arc::new(
            ExaSearchProvider::new(SecretString::from(key)).context("build Exa client")?,
        ),
        Err(_) => {
            tracing::warn!("EXA_API_KEY not set, web search requests will return no sources");
            Arc::new(StaticSearchProvider::default())
        }
    };

    let state = AppState {
        provider: Arc::new(provider),
        search,
    };
    let handle = spar_server::start(ServerConfig { port }, state)
        .await
        .context("start server")?;
    tracing::info!(port = handle.port, "spar server ready");

    tokio::signal::ctrl_c().await.context("listen for ctrl+c")?;
    tracing::info!("shutting down");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn ask(
    topic: String,
    server: String,
    web_search: bool,
    search_mode: String,
    num_results: u32,
    include_summary: bool,
    no_persist: bool,
) -> anyhow::Result<()> {
    let http = reqwest::Client::new();
    let client = DebateClient::new(http.clone(), server.clone());

    let body = json!({
        "topic": topic,
        "enableWebSearch": web_search,
        "searchMode": search_mode,
        "numResults": num_results,
        "includeSummary": include_summary,
    });
    let replay = client.stream_debate(&body).await?;

    if !replay.sources().is_empty() {
        println!("Sources:");
        for source in replay.sources() {
            println!("  {} <{}>", source.title, source.url);
        }
        println!();
    }

    for run in replay.runs() {
        if replay.is_multi_run() {
            println!("=== Run {} ===", run.id);
        }
        for persona in &run.personas {
            println!("--- {} ({}) ---", persona.name, persona.model);
            match replay.buffer(&run.id, persona.id) {
                Some(text) if !text.is_empty() => println!("{text}\n"),
                _ => println!("(no response)\n"),
            }
        }
    }
    for failure in replay.failures() {
        eprintln!("task failed: {}", failure.message);
    }

    if !replay.is_complete() {
        bail!("session ended before completion");
    }
    if no_persist {
        return Ok(());
    }

    let summarizer = RemoteSummarizer::new(http, server);
    let debate = SummaryFanout::new(&summarizer).run(&replay, &topic).await;

    for run in &debate.runs {
        for persona in &run.personas {
            if let Some(summary) = &persona.summary {
                println!("TL;DR [{}]: {summary}", persona.role);
            }
        }
    }

    let db = Database::open(&database_path()).context("open debate history database")?;
    persist(&DebateRepo::new(db), &debate);
    Ok(())
}

fn database_path() -> PathBuf {
    let home = std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"));
    home.join(".spar").join("debates.db")
}
