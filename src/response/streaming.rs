use chrono::Utc;
use futures::stream::{self, Stream, StreamExt};
use std::pin::Pin;
use tracing::{Instrument, error, info_span};

use super::{BackgroundTask, ResponseHead, ResponseWriter, StreamError, StreamSummary};
use crate::sse::SseItem;
use crate::transport::Transport;

/// A boxed source of response items. An `Err` item ends the stream.
pub type BodyStream = Pin<Box<dyn Stream<Item = anyhow::Result<SseItem>> + Send>>;

/// A response that relays an async stream as server-sent events.
///
/// # Example
/// ```
/// use llm_relay::response::StreamingResponse;
/// use llm_relay::transport::ChannelTransport;
///
/// # tokio_test::block_on(async {
/// let (transport, _rx) = ChannelTransport::new(8);
/// let response = StreamingResponse::from_items(["hello", "world"]);
/// let summary = response.respond(&transport).await.unwrap();
/// assert_eq!(summary.chunks_sent, 2);
/// # });
/// ```
pub struct StreamingResponse {
    head: ResponseHead,
    body: Option<BodyStream>,
    background: Option<BackgroundTask>,
}

impl StreamingResponse {
    /// Creates a response from a fallible stream.
    pub fn new<S, T>(content: S) -> Self
    where
        S: Stream<Item = anyhow::Result<T>> + Send + 'static,
        T: Into<SseItem> + 'static,
    {
        Self {
            head: ResponseHead::default(),
            body: Some(Box::pin(content.map(|item| item.map(Into::into)))),
            background: None,
        }
    }

    /// Creates a response from items that are all available up front.
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator + 'static,
        I::Item: Into<SseItem> + 'static,
        I::IntoIter: Send + 'static,
    {
        Self::new(stream::iter(
            items
                .into_iter()
                .map(|item| anyhow::Ok::<SseItem>(item.into())),
        ))
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

    /// Returns the response head.
    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    /// Returns the background task, if any.
    pub fn background(&self) -> Option<&BackgroundTask> {
        self.background.as_ref()
    }

    /// Streams the body to `transport`.
    ///
    /// Source errors are logged, reported to the client as one `error` event,
    /// and swallowed. Only transport failures are returned.
    pub async fn stream_response(&mut self, transport: &dyn Transport) -> Result<StreamSummary, StreamError> {
        let mut body = self.body.take().ok_or(StreamError::BodyConsumed)?;
        let mut writer = ResponseWriter::new(transport, &self.head.separator);
        let span = info_span!("sse_session", id = %writer.session().id);
        let background = &mut self.background;
        let head = &self.head;

        async move {
            writer.start(head.status, &head.headers).await?;

            let mut failure = None;
            while let Some(item) = body.next().await {
                match item {
                    Ok(item) => writer.send_item(item).await?,
                    Err(e) => {
                        error!(error = %e, "Body iterator error");
                        writer.send_error_event().await?;
                        failure = Some(format!("{e:#}"));
                        break;
                    }
                }
            }

            writer.close().await?;

            if let Some(task) = background.as_mut() {
                let args = task.args_mut();
                args.error = failure;
                args.completed_at = Some(Utc::now());
            }
            Ok(writer.summary())
        }
        .instrument(span)
        .await
    }

    /// Streams the body, then runs the background task.
    pub async fn respond(mut self, transport: &dyn Transport) -> Result<StreamSummary, StreamError> {
        let summary = self.stream_response(transport).await?;
        if let Some(task) = self.background.take() {
            task.run().await;
        }
        Ok(summary)
    }
}

impl Default for StreamingResponse {
    fn default() -> Self {
        Self::from_items(Vec::<SseItem>::new())
    }
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("head", &self.head)
            .field("consumed", &self.body.is_none())
            .field("background", &self.background)
            .finish()
    }
}
