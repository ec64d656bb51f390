mod builder;
mod stream;

use std::fmt::{self, Debug};
use std::sync::Arc;

use agent_bridge_model::{Error, LogConfig, Message, Thread, title_from_message};
use agent_bridge_providers::Provider;
use agent_bridge_storage::Storage;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

pub use builder::ChatRuntimeBuilder;
pub use stream::{MessageStream, SendStage};

/// Hands send failures to the bound error callback.
#[derive(Clone, Default)]
pub(crate) struct ErrorReporter(Option<Arc<dyn Fn(&Error) + Send + Sync>>);

impl ErrorReporter {
    /// Logs `err` and invokes the callback. Called exactly once per
    /// failed send.
    pub(crate) fn report(&self, err: &Error) {
        error!("failed to process message: {err}");
        if let Some(on_error) = &self.0 {
            on_error(err);
        }
    }
}

/// A message to be answered by the provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageRequest {
    /// The thread the conversation belongs to.
    pub thread_id: String,
    /// The whole conversation, ending with the new user message.
    pub messages: Vec<Message>,
    /// Id for the assistant message, generated when absent.
    pub response_id: Option<String>,
}

/// A chat bound to one provider and one storage.
///
/// This is the surface the rendering side talks to: thread management,
/// and [`process_message`](Self::process_message) which returns the
/// assistant answer as a stream of text.
#[derive(Clone)]
pub struct ChatRuntime {
    provider: Provider,
    storage: Storage,
    reporter: ErrorReporter,
    log: LogConfig,
}

impl Debug for ChatRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatRuntime")
            .field("provider", &self.provider)
            .field("storage", &self.storage)
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}

impl ChatRuntime {
    /// Returns the bound provider.
    #[inline]
    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// Returns the bound storage.
    #[inline]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Returns all threads, newest first.
    pub async fn fetch_thread_list(&self) -> Result<Vec<Thread>, Error> {
        self.storage.get_thread_list().await
    }

    /// Creates a thread titled after its first message.
    pub async fn create_thread(
        &self,
        first_message: &str,
    ) -> Result<Thread, Error> {
        let thread = self
            .storage
            .create_thread(&title_from_message(first_message))
            .await?;
        if self.log.verbose {
            debug!(thread_id = %thread.thread_id, "created thread");
        }
        Ok(thread)
    }

    /// Deletes a thread.
    pub async fn delete_thread(&self, thread_id: &str) -> Result<(), Error> {
        self.storage.delete_thread(thread_id).await
    }

    /// Stores new metadata (such as the title) of a thread.
    pub async fn update_thread(&self, thread: &Thread) -> Result<(), Error> {
        self.storage.update_thread(thread).await
    }

    /// Returns the messages of a thread, `None` if the thread is unknown.
    pub async fn load_thread(
        &self,
        thread_id: &str,
    ) -> Result<Option<Vec<Message>>, Error> {
        self.storage.get_thread(thread_id).await
    }

    /// Sends the conversation to the provider and returns the answer as
    /// it streams in.
    ///
    /// Failures before the answer starts are returned here, failures after
    /// that are yielded by the stream. Either way the error callback sees
    /// each failure once. The cancellation token is carried by the
    /// returned stream for the caller; this runtime doesn't act on it.
    pub async fn process_message(
        &self,
        req: MessageRequest,
        cancellation: Option<CancellationToken>,
    ) -> Result<MessageStream, Error> {
        let span = trace_span!("process message", thread_id = %req.thread_id);
        self.process_message_inner(req, cancellation)
            .instrument(span)
            .await
    }

    async fn process_message_inner(
        &self,
        req: MessageRequest,
        cancellation: Option<CancellationToken>,
    ) -> Result<MessageStream, Error> {
        trace!(stage = ?SendStage::Sending);

        // The agent server records the user message as part of the run.
        if !self.storage.is_agent_managed() {
            if let Err(err) =
                self.storage.save_thread(&req.thread_id, &req.messages).await
            {
                warn!("failed to persist user message: {err}");
            }
        }

        let response = match self
            .provider
            .send_message(&req.thread_id, &req.messages)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                trace!(stage = ?SendStage::Errored);
                self.reporter.report(&err);
                return Err(err);
            }
        };
        trace!(stage = ?SendStage::Streaming);

        Ok(MessageStream::new(
            response,
            stream::Completion {
                storage: self.storage.clone(),
                thread_id: req.thread_id,
                messages: req.messages,
                response_id: req.response_id,
                required_marker: self
                    .provider
                    .required_marker()
                    .map(ToOwned::to_owned),
                log: self.log,
            },
            self.reporter.clone(),
            cancellation,
        ))
    }
}
