//! Command-line front end: forward a task to a model, or stream the answer
//! to stdout as a raw HTTP/1.1 `text/event-stream` response.

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::stream::{Stream, StreamExt};
use tracing::info;
use tracing_subscriber::EnvFilter;

use llm_relay::llm::{LLMEvent, ModelForwarder};
use llm_relay::{ForwarderConfig, SseItem, StreamingResponse, WriterTransport};

#[derive(Debug, Parser)]
#[command(name = "llm-relay", version, about = "Forward prompts to an OpenAI-compatible model")]
struct Cli {
    /// Log at debug level regardless of RUST_LOG
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Model name, overriding LLM_MODEL
    #[arg(long, global = true)]
    model: Option<String>,

    /// API base URL, overriding LLM_BASE_URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// System prompt, overriding LLM_SYSTEM_PROMPT
    #[arg(long, global = true)]
    system_prompt: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send a task and print the model's answer
    Ask {
        /// The task to send
        task: String,
    },
    /// Stream the answer to stdout as server-sent events
    Stream {
        /// The task to send
        task: String,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // stdout carries the response body.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<ForwarderConfig> {
    let mut config = match &cli.model {
        Some(model) => ForwarderConfig::from_lookup(|key| match key {
            "LLM_MODEL" => Some(model.clone()),
            _ => std::env::var(key).ok(),
        }),
        None => ForwarderConfig::from_env(),
    }
    .context("Failed to load forwarder configuration")?;

    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(system_prompt) = &cli.system_prompt {
        config.system_prompt = Some(system_prompt.clone());
    }
    Ok(config)
}

/// Text deltas of the model's answer as SSE items.
///
/// The request is only sent once the response starts pulling, so a failed
/// request is reported as an `error` event like any other source failure.
fn answer_events(
    forwarder: ModelForwarder,
    task: String,
) -> impl Stream<Item = anyhow::Result<SseItem>> + Send + 'static {
    async_stream::try_stream! {
        let mut events = forwarder.run_stream(&task).await?;
        while let Some(event) = events.next().await {
            if let LLMEvent::TextDelta { text } = event? {
                yield SseItem::Json(serde_json::json!({ "content": text }));
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    info!(model = %config.model_name, base_url = %config.base_url, "Loaded configuration");
    let forwarder = ModelForwarder::from_config(config)?;

    match cli.command {
        Command::Ask { task } => {
            let answer = forwarder.run(&task).await?;
            println!("{}", answer);
        }
        Command::Stream { task } => {
            let transport = WriterTransport::new(tokio::io::stdout());
            let summary = StreamingResponse::new(answer_events(forwarder, task))
                .respond(&transport)
                .await?;
            info!(
                chunks = summary.chunks_sent,
                failed = summary.failed,
                "Stream finished"
            );
        }
    }

    Ok(())
}
