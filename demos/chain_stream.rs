//! # Chain Streaming Example
//!
//! Relays a toy chain through a `ChainStreamingResponse` in both run modes and
//! prints every frame the transport receives.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example chain_stream
//! ```

use async_trait::async_trait;
use llm_relay::prelude::*;
use llm_relay::{BackgroundTask, ChainOutputs, ResponseMessage};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Splits the `text` input into words, emitting each one as it goes.
struct EchoChain;

impl EchoChain {
    fn words(config: &ChainConfig) -> anyhow::Result<Vec<String>> {
        let text = config
            .inputs
            .get("text")
            .and_then(|value| value.as_str())
            .ok_or_else(|| anyhow::anyhow!("input 'text' must be a string"))?;
        Ok(text.split_whitespace().map(str::to_string).collect())
    }

    fn outputs(words: &[String]) -> ChainOutputs {
        let mut outputs = ChainOutputs::new();
        outputs.insert("word_count".to_string(), json!(words.len()));
        outputs
    }
}

#[async_trait]
impl Chain for EchoChain {
    async fn acall(&self, config: ChainConfig) -> anyhow::Result<ChainOutputs> {
        let words = Self::words(&config)?;
        for word in &words {
            config.emit(json!({ "token": word }));
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(Self::outputs(&words))
    }

    fn call(&self, config: ChainConfig) -> anyhow::Result<ChainOutputs> {
        let words = Self::words(&config)?;
        for word in &words {
            config.emit(json!({ "token": word }));
            std::thread::sleep(Duration::from_millis(50));
        }
        Ok(Self::outputs(&words))
    }
}

async fn run(mode: &str, text: serde_json::Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("\n=== run mode: {} ===", mode);

    let (transport, mut rx) = ChannelTransport::new(32);
    let printer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match message {
                ResponseMessage::Start { status, headers } => {
                    println!("HTTP {} {:?}", status, headers);
                }
                ResponseMessage::Body { body, more_body } => {
                    print!("{}", String::from_utf8_lossy(&body));
                    if !more_body {
                        println!("[end of body]");
                    }
                }
            }
        }
    });

    let config = ChainConfig::default().with_input("text", text);
    let response = ChainStreamingResponse::with_mode_name(Arc::new(EchoChain), config, mode)?
        .with_background(BackgroundTask::new(|args| async move {
            println!("background: outputs={:?} error={:?}", args.outputs, args.error);
        }));

    response.respond(&transport).await?;
    drop(transport);
    printer.await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    run("async", json!("streams are just iterators with patience")).await?;
    run("sync", json!("blocking work moves to the worker pool")).await?;

    // A non-string input makes the chain fail; the client sees one error event.
    run("sync", json!(42)).await?;

    // Unknown modes are rejected before anything is sent.
    if let Err(e) = run("batch", json!("never sent")).await {
        println!("\nrejected: {}", e);
    }

    Ok(())
}
