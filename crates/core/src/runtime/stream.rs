use std::pin::Pin;
use std::task::{Context, Poll, ready};

use agent_bridge_model::{Error, LogConfig, Message};
use agent_bridge_providers::ResponseStream;
use agent_bridge_storage::Storage;
use bytes::Bytes;
use futures_util::Stream;
use pin_project_lite::pin_project;
use tokio_util::sync::CancellationToken;

use super::ErrorReporter;

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// The stages of sending one message.
///
/// `Idle → Sending → Streaming → Persisting → Done`, with `Errored`
/// reachable from `Sending` and `Streaming`. A [`MessageStream`] exists
/// from `Streaming` on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SendStage {
    /// Nothing has been sent yet.
    Idle,
    /// The request is on its way to the provider.
    Sending,
    /// Assistant text is arriving.
    Streaming,
    /// The answer is complete and being saved.
    Persisting,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Errored,
}

/// What the stream needs once the answer is complete.
pub(crate) struct Completion {
    pub(crate) storage: Storage,
    pub(crate) thread_id: String,
    pub(crate) messages: Vec<Message>,
    pub(crate) response_id: Option<String>,
    pub(crate) required_marker: Option<String>,
    pub(crate) log: LogConfig,
}

impl Completion {
    fn check_marker(&self, content: &str) -> Result<(), Error> {
        match &self.required_marker {
            Some(marker) if !content.contains(marker.as_str()) => {
                Err(Error::protocol(format!(
                    "the response never contained the marker `{marker}`. \
                     The backend is reachable but not set up for this \
                     client; make sure its workflow responds through the \
                     chat integration and includes the marker in its \
                     output"
                )))
            }
            _ => Ok(()),
        }
    }

    fn persist(&self, content: String) -> PinnedFuture<()> {
        let mut assistant = Message::assistant(content);
        if let Some(id) = &self.response_id {
            assistant = assistant.with_id(id.clone());
        }
        let mut messages = self.messages.clone();
        messages.push(assistant);
        let storage = self.storage.clone();
        let thread_id = self.thread_id.clone();
        let log = self.log;

        Box::pin(async move {
            // The answer has already been delivered, a failed save must
            // not turn it into a failure.
            match storage.save_thread(&thread_id, &messages).await {
                Ok(()) if log.verbose => {
                    debug!(%thread_id, "persisted assistant message");
                }
                Ok(()) => {}
                Err(err) => {
                    error!("failed to persist assistant message: {err}");
                }
            }
        })
    }
}

pin_project! {
    /// The assistant answer to one message, as plain UTF-8 text.
    ///
    /// Text is yielded in the order it arrived while also being collected.
    /// When the provider finishes, the collected text is validated and
    /// then saved with the conversation before the stream ends. An error
    /// item ends the stream.
    pub struct MessageStream {
        #[pin]
        response: ResponseStream,
        content: String,
        stage: SendStage,
        completion: Completion,
        persist_fut: Option<PinnedFuture<()>>,
        reporter: ErrorReporter,
        cancellation: Option<CancellationToken>,
    }
}

impl MessageStream {
    pub(crate) fn new(
        response: ResponseStream,
        completion: Completion,
        reporter: ErrorReporter,
        cancellation: Option<CancellationToken>,
    ) -> Self {
        Self {
            response,
            content: String::new(),
            stage: SendStage::Streaming,
            completion,
            persist_fut: None,
            reporter,
            cancellation,
        }
    }

    /// Returns the current stage.
    #[inline]
    pub fn stage(&self) -> SendStage {
        self.stage
    }

    /// Returns the text received so far.
    #[inline]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns the cancellation token passed when the message was sent.
    #[inline]
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }
}

impl Stream for MessageStream {
    type Item = Result<Bytes, Error>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            match *this.stage {
                SendStage::Streaming => {
                    let next = ready!(this.response.as_mut().poll_next(cx));
                    let err = match next {
                        Some(Ok(bytes)) => {
                            this.content
                                .push_str(&String::from_utf8_lossy(&bytes));
                            return Poll::Ready(Some(Ok(bytes)));
                        }
                        Some(Err(err)) => err,
                        None => {
                            let completion = &*this.completion;
                            if let Err(err) =
                                completion.check_marker(this.content.as_str())
                            {
                                err
                            } else if completion.storage.is_agent_managed() {
                                *this.stage = SendStage::Done;
                                return Poll::Ready(None);
                            } else {
                                let content = this.content.clone();
                                *this.persist_fut =
                                    Some(completion.persist(content));
                                *this.stage = SendStage::Persisting;
                                continue;
                            }
                        }
                    };
                    *this.stage = SendStage::Errored;
                    this.reporter.report(&err);
                    return Poll::Ready(Some(Err(err)));
                }
                SendStage::Persisting => {
                    if let Some(persist_fut) = this.persist_fut.as_mut() {
                        ready!(persist_fut.as_mut().poll(cx));
                    }
                    *this.persist_fut = None;
                    *this.stage = SendStage::Done;
                    return Poll::Ready(None);
                }
                _ => return Poll::Ready(None),
            }
        }
    }
}
