use std::sync::Arc;

use agent_bridge_model::{Error, LogConfig, Message, last_user_content};
use reqwest::{Client, header};
use serde::Serialize;

use crate::config::GraphAgentConfig;
use crate::http;
use crate::io::Chunks;
use crate::stream::ResponseStream;

/// Provider for an agent server that runs graphs on server-side threads.
///
/// The server keeps the conversation history, so only the newest user
/// message is sent with each run.
#[derive(Clone, Debug)]
pub struct GraphAgentProvider {
    client: Client,
    config: Arc<GraphAgentConfig>,
    log: LogConfig,
}

impl GraphAgentProvider {
    /// Creates a new `GraphAgentProvider` with the given configuration.
    #[inline]
    pub fn new(config: GraphAgentConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
            log: LogConfig::default(),
        }
    }

    /// Sets the logging options.
    #[inline]
    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    /// Returns the configuration.
    #[inline]
    pub fn config(&self) -> &GraphAgentConfig {
        &self.config
    }

    /// Starts a streamed run on `thread_id`.
    pub fn send_message(
        &self,
        thread_id: &str,
        messages: &[Message],
    ) -> impl Future<Output = Result<ResponseStream, Error>> + Send + 'static
    {
        let run_req = create_run_request(&self.config, messages);
        let req = self
            .config
            .thread_url(thread_id, &["runs", "stream"])
            .map(|url| {
                if self.log.verbose {
                    debug!(%url, "starting agent run");
                }
                self.config
                    .authorize(self.client.post(url))
                    .header(header::ACCEPT, "text/event-stream")
                    .json(&run_req)
            });
        let log = self.log;

        async move {
            let resp = http::send(req?).await?;
            http::ensure_body(&resp)?;
            Ok(ResponseStream::graph_agent(Chunks::from_response(resp), log))
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct InputMessage {
    r#type: &'static str,
    content: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct RunInput {
    messages: Vec<InputMessage>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct RunRequest {
    assistant_id: String,
    input: RunInput,
    stream_mode: Vec<&'static str>,
    stream_subgraphs: bool,
}

fn create_run_request(
    config: &GraphAgentConfig,
    messages: &[Message],
) -> RunRequest {
    let messages = last_user_content(messages)
        .map(|content| InputMessage {
            r#type: "human",
            content: content.to_owned(),
        })
        .into_iter()
        .collect();
    RunRequest {
        assistant_id: config.assistant_id.clone(),
        input: RunInput { messages },
        stream_mode: vec!["messages-tuple"],
        stream_subgraphs: true,
    }
}
