//! Integration tests for relaying chain invocations as server-sent events.

mod common;

use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::oneshot;

use common::RecordingTransport;
use llm_relay::{
    BackgroundArgs, BackgroundTask, Chain, ChainConfig, ChainOutputs, ChainStreamingResponse,
    RunMode, StreamError, StreamingResponse,
};

/// Emits one event per token, then returns the joined tokens.
#[derive(Default)]
struct TokenChain {
    tokens: Vec<&'static str>,
    fail_with: Option<&'static str>,
    block_for: Option<Duration>,
    panic: bool,
    worker: Mutex<Option<ThreadId>>,
}

impl TokenChain {
    fn with_tokens(tokens: &[&'static str]) -> Self {
        Self {
            tokens: tokens.to_vec(),
            ..Self::default()
        }
    }

    fn run(&self, config: &ChainConfig) -> anyhow::Result<ChainOutputs> {
        for token in &self.tokens {
            config.emit(json!({ "token": token }));
        }
        if self.panic {
            panic!("chain blew up");
        }
        if let Some(message) = self.fail_with {
            anyhow::bail!(message);
        }

        let mut outputs = ChainOutputs::new();
        outputs.insert("answer".to_string(), json!(self.tokens.concat()));
        Ok(outputs)
    }
}

#[async_trait]
impl Chain for TokenChain {
    async fn acall(&self, config: ChainConfig) -> anyhow::Result<ChainOutputs> {
        *self.worker.lock().unwrap() = Some(thread::current().id());
        tokio::task::yield_now().await;
        self.run(&config)
    }

    fn call(&self, config: ChainConfig) -> anyhow::Result<ChainOutputs> {
        *self.worker.lock().unwrap() = Some(thread::current().id());
        if let Some(delay) = self.block_for {
            thread::sleep(delay);
        }
        self.run(&config)
    }
}

fn capture_background() -> (BackgroundTask, oneshot::Receiver<BackgroundArgs>) {
    let (tx, rx) = oneshot::channel();
    let task = BackgroundTask::new(move |args| async move {
        let _ = tx.send(args);
    });
    (task, rx)
}

fn tokens_of(transport: &RecordingTransport) -> Vec<String> {
    transport
        .frames()
        .data
        .iter()
        .map(|event| {
            let value: Value = event.data_json().unwrap();
            value["token"].as_str().unwrap().to_string()
        })
        .collect()
}

#[tokio::test]
async fn test_async_chain_events_precede_terminal_frame() {
    let transport = RecordingTransport::new();
    let chain = Arc::new(TokenChain::with_tokens(&["Hel", "lo", "!"]));
    let (background, done) = capture_background();

    let summary = ChainStreamingResponse::new(chain, ChainConfig::default(), RunMode::Async)
        .with_background(background)
        .respond(&transport)
        .await
        .unwrap();

    let frames = transport.frames();
    assert_eq!(frames.starts, 1);
    assert_eq!(frames.terminals, 1);
    assert_eq!(frames.terminal_position, Some(frames.total - 1));
    assert!(frames.errors.is_empty());
    assert_eq!(tokens_of(&transport), vec!["Hel", "lo", "!"]);
    assert!(!summary.failed);

    let args = done.await.unwrap();
    assert_eq!(args.outputs.unwrap()["answer"], "Hello!");
    assert_eq!(args.error, None);
    assert!(args.completed_at.is_some());
}

#[tokio::test]
async fn test_sync_chain_runs_off_the_event_loop() {
    let transport = RecordingTransport::new();
    let chain = Arc::new(TokenChain::with_tokens(&["a", "b"]));

    ChainStreamingResponse::new(chain.clone(), ChainConfig::default(), RunMode::Sync)
        .respond(&transport)
        .await
        .unwrap();

    let worker = chain.worker.lock().unwrap().expect("chain was invoked");
    assert_ne!(worker, thread::current().id());
    assert_eq!(tokens_of(&transport), vec!["a", "b"]);
    assert_eq!(transport.frames().terminals, 1);
}

#[tokio::test]
async fn test_blocking_chain_does_not_stall_other_responses() {
    let chain_transport = RecordingTransport::new();
    let plain_transport = RecordingTransport::new();
    let chain = Arc::new(TokenChain {
        block_for: Some(Duration::from_millis(200)),
        ..TokenChain::with_tokens(&["slow"])
    });

    let chained = async {
        ChainStreamingResponse::new(chain, ChainConfig::default(), RunMode::Sync)
            .respond(&chain_transport)
            .await
            .unwrap();
        Instant::now()
    };
    let plain = async {
        StreamingResponse::from_items(["quick", "reply"])
            .respond(&plain_transport)
            .await
            .unwrap();
        Instant::now()
    };

    let (chain_done, plain_done) = tokio::join!(chained, plain);
    assert!(plain_done < chain_done);
    assert_eq!(plain_transport.frames().data.len(), 2);
}

#[tokio::test]
async fn test_failing_chain_sends_one_error_event() {
    for mode in [RunMode::Async, RunMode::Sync] {
        let transport = RecordingTransport::new();
        let chain = Arc::new(TokenChain {
            fail_with: Some("retriever timed out"),
            ..TokenChain::with_tokens(&["partial"])
        });
        let (background, done) = capture_background();

        let summary = ChainStreamingResponse::new(chain, ChainConfig::default(), mode)
            .with_background(background)
            .respond(&transport)
            .await
            .unwrap();

        let frames = transport.frames();
        assert_eq!(frames.data.len(), 1, "mode {mode}");
        assert_eq!(frames.errors.len(), 1, "mode {mode}");
        assert_eq!(frames.terminals, 1, "mode {mode}");
        assert!(!frames.errors[0].data.contains("retriever"));
        assert!(summary.failed);

        let args = done.await.unwrap();
        assert_eq!(args.outputs, Some(ChainOutputs::new()));
        assert_eq!(args.error.as_deref(), Some("retriever timed out"));
    }
}

#[tokio::test]
async fn test_panicking_sync_chain_is_reported() {
    let transport = RecordingTransport::new();
    let chain = Arc::new(TokenChain {
        panic: true,
        ..TokenChain::with_tokens(&["before"])
    });
    let (background, done) = capture_background();

    let summary = ChainStreamingResponse::new(chain, ChainConfig::default(), RunMode::Sync)
        .with_background(background)
        .respond(&transport)
        .await
        .unwrap();

    let frames = transport.frames();
    assert_eq!(tokens_of(&transport), vec!["before"]);
    assert_eq!(frames.errors.len(), 1);
    assert_eq!(frames.terminals, 1);
    assert!(summary.failed);

    let args = done.await.unwrap();
    assert!(args.error.is_some());
}

#[tokio::test]
async fn test_unknown_run_mode_fails_before_sending() {
    let transport = RecordingTransport::new();
    let chain = Arc::new(TokenChain::default());

    let result = ChainStreamingResponse::with_mode_name(chain, ChainConfig::default(), "batch");
    let err = result.unwrap_err();
    assert!(matches!(err, StreamError::InvalidRunMode(ref mode) if mode == "batch"));
    assert_eq!(
        err.to_string(),
        "Invalid run mode 'batch'. Must be one of [async, sync]"
    );
    assert!(transport.messages().is_empty());
}

#[tokio::test]
async fn test_inputs_reach_the_chain() {
    struct Echo;

    #[async_trait]
    impl Chain for Echo {
        async fn acall(&self, config: ChainConfig) -> anyhow::Result<ChainOutputs> {
            Ok(config.inputs)
        }

        fn call(&self, config: ChainConfig) -> anyhow::Result<ChainOutputs> {
            Ok(config.inputs)
        }
    }

    let transport = RecordingTransport::new();
    let config = ChainConfig::default()
        .with_input("question", "What is SSE?")
        .with_input("top_k", 3);
    let (background, done) = capture_background();

    ChainStreamingResponse::with_mode_name(Arc::new(Echo), config, "sync")
        .unwrap()
        .with_background(background)
        .respond(&transport)
        .await
        .unwrap();

    let outputs = done.await.unwrap().outputs.unwrap();
    assert_eq!(outputs["question"], "What is SSE?");
    assert_eq!(outputs["top_k"], 3);
    // No events, so only the head and the terminal frame.
    assert_eq!(transport.frames().total, 2);
}
