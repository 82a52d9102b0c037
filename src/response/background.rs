use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;

use super::chain::ChainOutputs;

/// Arguments handed to a background task once its response has closed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackgroundArgs {
    /// Chain outputs; an empty map when the chain failed
    pub outputs: Option<ChainOutputs>,
    /// Message of the error that ended the stream, if any
    pub error: Option<String>,
    /// When the terminal frame was sent
    pub completed_at: Option<DateTime<Utc>>,
}

type TaskFn = Box<dyn FnOnce(BackgroundArgs) -> BoxFuture<'static, ()> + Send>;

/// Work to run after a streamed response has been fully sent.
pub struct BackgroundTask {
    func: TaskFn,
    args: BackgroundArgs,
}

impl BackgroundTask {
    /// Creates a task from an async function of its arguments.
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: FnOnce(BackgroundArgs) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            func: Box::new(move |args| Box::pin(func(args))),
            args: BackgroundArgs::default(),
        }
    }

    /// Returns the arguments collected so far.
    pub fn args(&self) -> &BackgroundArgs {
        &self.args
    }

    pub(crate) fn args_mut(&mut self) -> &mut BackgroundArgs {
        &mut self.args
    }

    /// Runs the task with its collected arguments.
    pub async fn run(self) {
        (self.func)(self.args).await
    }
}

impl fmt::Debug for BackgroundTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundTask")
            .field("args", &self.args)
            .finish()
    }
}
