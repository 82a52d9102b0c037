use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info_span};

use super::{BackgroundTask, ResponseHead, ResponseWriter, StreamError, StreamSummary};
use crate::sse::SseItem;
use crate::transport::Transport;

/// Outputs returned by a chain invocation, keyed by output name.
pub type ChainOutputs = Map<String, Value>;

/// An orchestration chain that produces outputs from its configuration.
///
/// Implementors provide both an async entry point and a blocking one. The
/// response picks one according to its [`RunMode`].
#[async_trait]
pub trait Chain: Send + Sync + 'static {
    /// Runs the chain on the current runtime.
    async fn acall(&self, config: ChainConfig) -> anyhow::Result<ChainOutputs>;

    /// Runs the chain to completion, blocking the calling thread.
    fn call(&self, config: ChainConfig) -> anyhow::Result<ChainOutputs>;
}

/// How a chain is invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Await [`Chain::acall`] on the current runtime
    #[default]
    Async,
    /// Run [`Chain::call`] on the blocking thread pool
    Sync,
}

impl RunMode {
    /// Returns the mode name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Async => "async",
            RunMode::Sync => "sync",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "async" => Ok(RunMode::Async),
            "sync" => Ok(RunMode::Sync),
            other => Err(StreamError::InvalidRunMode(other.to_string())),
        }
    }
}

/// Pushes intermediate events from a running chain into its response.
///
/// Usable from both async code and blocking threads.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<SseItem>,
}

impl EventSender {
    fn channel() -> (Self, mpsc::UnboundedReceiver<SseItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues an event. Returns `false` once the response has stopped listening.
    pub fn send(&self, item: impl Into<SseItem>) -> bool {
        self.tx.send(item.into()).is_ok()
    }
}

/// Inputs and wiring for one chain invocation.
#[derive(Debug, Clone, Default)]
pub struct ChainConfig {
    /// Named inputs passed to the chain
    pub inputs: Map<String, Value>,
    /// Event channel of the response driving this invocation
    pub events: Option<EventSender>,
}

impl ChainConfig {
    /// Creates a config with the given inputs.
    pub fn new(inputs: Map<String, Value>) -> Self {
        Self {
            inputs,
            events: None,
        }
    }

    /// Adds one named input.
    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    /// Sends an intermediate event if an event channel is attached.
    ///
    /// Returns `false` when there is no channel or it has closed.
    pub fn emit(&self, item: impl Into<SseItem>) -> bool {
        self.events.as_ref().is_some_and(|events| events.send(item))
    }
}

/// A response that relays one chain invocation as server-sent events.
pub struct ChainStreamingResponse {
    chain: Arc<dyn Chain>,
    config: ChainConfig,
    run_mode: RunMode,
    head: ResponseHead,
    background: Option<BackgroundTask>,
}

impl ChainStreamingResponse {
    /// Creates a response for `chain` invoked with `config`.
    pub fn new(chain: Arc<dyn Chain>, config: ChainConfig, run_mode: RunMode) -> Self {
        Self {
            chain,
            config,
            run_mode,
            head: ResponseHead::default(),
            background: None,
        }
    }

    /// Creates a response from a run mode name, failing before anything is
    /// sent if the name is not a supported mode.
    pub fn with_mode_name(
        chain: Arc<dyn Chain>,
        config: ChainConfig,
        run_mode: &str,
    ) -> Result<Self, StreamError> {
        let run_mode = run_mode.parse()?;
        Ok(Self::new(chain, config, run_mode))
    }

    /// Replaces the status, headers and separator.
    pub fn with_head(mut self, head: ResponseHead) -> Self {
        self.head = head;
        self
    }

    /// Attaches work to run after the response closes.
    pub fn with_background(mut self, task: BackgroundTask) -> Self {
        self.background = Some(task);
        self
    }

    /// Returns the run mode.
    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    /// Returns the background task, if any.
    pub fn background(&self) -> Option<&BackgroundTask> {
        self.background.as_ref()
    }

    fn invoke(&self, config: ChainConfig) -> BoxFuture<'static, anyhow::Result<ChainOutputs>> {
        let chain = Arc::clone(&self.chain);
        match self.run_mode {
            RunMode::Async => Box::pin(async move { chain.acall(config).await }),
            RunMode::Sync => Box::pin(async move {
                tokio::task::spawn_blocking(move || chain.call(config))
                    .await
                    .map_err(|e| anyhow::anyhow!("chain worker failed: {e}"))?
            }),
        }
    }

    /// Runs the chain and streams its events to `transport`.
    ///
    /// Events the chain emits are sent as they arrive. A chain failure is
    /// logged, reported to the client as one `error` event, and recorded on
    /// the background task. Only transport failures are returned.
    pub async fn stream_response(&mut self, transport: &dyn Transport) -> Result<StreamSummary, StreamError> {
        let mut writer = ResponseWriter::new(transport, &self.head.separator);
        let span = info_span!(
            "sse_session",
            id = %writer.session().id,
            run_mode = %self.run_mode
        );

        let (events, mut rx) = EventSender::channel();
        let mut config = self.config.clone();
        config.events = Some(events);
        let invocation = self.invoke(config);
        let background = &mut self.background;
        let head = &self.head;

        async move {
            writer.start(head.status, &head.headers).await?;

            tokio::pin!(invocation);
            let result = loop {
                tokio::select! {
                    biased;
                    Some(item) = rx.recv() => writer.send_item(item).await?,
                    result = &mut invocation => break result,
                }
            };
            // Events queued just before the chain returned.
            while let Ok(item) = rx.try_recv() {
                writer.send_item(item).await?;
            }

            match result {
                Ok(outputs) => {
                    debug!(keys = outputs.len(), "Chain completed");
                    if let Some(task) = background.as_mut() {
                        task.args_mut().outputs = Some(outputs);
                    }
                }
                Err(e) => {
                    error!(error = %e, "Chain runtime error");
                    if let Some(task) = background.as_mut() {
                        let args = task.args_mut();
                        args.outputs = Some(ChainOutputs::new());
                        args.error = Some(format!("{e:#}"));
                    }
                    writer.send_error_event().await?;
                }
            }

            writer.close().await?;
            if let Some(task) = background.as_mut() {
                task.args_mut().completed_at = Some(Utc::now());
            }
            Ok(writer.summary())
        }
        .instrument(span)
        .await
    }

    /// Streams the chain, then runs the background task.
    pub async fn respond(mut self, transport: &dyn Transport) -> Result<StreamSummary, StreamError> {
        let summary = self.stream_response(transport).await?;
        if let Some(task) = self.background.take() {
            task.run().await;
        }
        Ok(summary)
    }
}

impl fmt::Debug for ChainStreamingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainStreamingResponse")
            .field("config", &self.config)
            .field("run_mode", &self.run_mode)
            .field("head", &self.head)
            .field("background", &self.background)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_mode_parsing() {
        assert_eq!("async".parse::<RunMode>().unwrap(), RunMode::Async);
        assert_eq!("sync".parse::<RunMode>().unwrap(), RunMode::Sync);

        let err = "batch".parse::<RunMode>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid run mode 'batch'. Must be one of [async, sync]"
        );
        assert!("ASYNC".parse::<RunMode>().is_err());
    }

    #[test]
    fn test_run_mode_serde() {
        assert_eq!(serde_json::to_string(&RunMode::Sync).unwrap(), "\"sync\"");
        let mode: RunMode = serde_json::from_str("\"async\"").unwrap();
        assert_eq!(mode, RunMode::Async);
        assert!(serde_json::from_str::<RunMode>("\"batch\"").is_err());
    }

    #[test]
    fn test_emit_without_channel() {
        let config = ChainConfig::default().with_input("question", "why?");
        assert!(!config.emit("ignored"));
        assert_eq!(config.inputs["question"], "why?");
    }

    #[test]
    fn test_emit_after_receiver_dropped() {
        let (events, rx) = EventSender::channel();
        let config = ChainConfig {
            events: Some(events),
            ..ChainConfig::default()
        };
        assert!(config.emit("queued"));
        drop(rx);
        assert!(!config.emit("lost"));
    }
}
