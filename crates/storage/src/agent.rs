//! Threads kept by the agent server itself.
//!
//! The server records every message of a run as part of executing it, so
//! saving messages from the client side is a no-op here.

use std::sync::Arc;

use agent_bridge_model::{Error, LogConfig, Message, Role, Thread};
use agent_bridge_providers::{GraphAgentConfig, http, text_of};
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

const SEARCH_LIMIT: u32 = 100;
const DEFAULT_TITLE: &str = "New Chat";

/// Storage delegating to the agent server's thread API.
#[derive(Clone, Debug)]
pub struct AgentStorage {
    client: Client,
    config: Arc<GraphAgentConfig>,
    log: LogConfig,
}

#[derive(Clone, Debug, Deserialize)]
struct RemoteThread {
    thread_id: String,
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: Value,
    status: Option<String>,
}

impl From<RemoteThread> for Thread {
    fn from(remote: RemoteThread) -> Self {
        let title = remote
            .metadata
            .get("title")
            .and_then(Value::as_str)
            .filter(|title| !title.is_empty())
            .unwrap_or(DEFAULT_TITLE);
        Thread {
            thread_id: remote.thread_id,
            title: title.to_owned(),
            created_at: remote.created_at.unwrap_or_else(Utc::now),
            is_running: remote.status.as_deref() == Some("busy"),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
struct ThreadState {
    #[serde(default)]
    values: Value,
}

impl AgentStorage {
    /// Creates a storage for the given deployment.
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

    pub(crate) async fn create_thread(
        &self,
        title: &str,
    ) -> Result<Thread, Error> {
        let req = self
            .post("/threads")
            .json(&json!({ "metadata": { "title": title } }));
        let remote: RemoteThread = self.fetch(req).await?;
        Ok(remote.into())
    }

    pub(crate) async fn get_thread_list(&self) -> Result<Vec<Thread>, Error> {
        let req = self
            .post("/threads/search")
            .json(&json!({ "limit": SEARCH_LIMIT, "offset": 0 }));
        let remote: Vec<RemoteThread> = self.fetch(req).await?;
        let mut threads: Vec<Thread> =
            remote.into_iter().map(Thread::from).collect();
        threads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(threads)
    }

    pub(crate) async fn get_thread(
        &self,
        thread_id: &str,
    ) -> Result<Option<Vec<Message>>, Error> {
        let url = self
            .config
            .thread_url(thread_id, &["history"])
            .map_err(store_error)?;
        let req = self.config.authorize(self.client.get(url));
        let resp = http::send_raw(req).await.map_err(store_error)?;
        self.log_response(&resp);
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let history: Vec<ThreadState> = decode(resp).await?;

        // History is ordered newest first.
        let Some(latest) = history.into_iter().next() else {
            return Ok(Some(vec![]));
        };
        let messages = latest
            .values
            .get("messages")
            .and_then(Value::as_array)
            .map(|messages| messages.iter().filter_map(map_message).collect())
            .unwrap_or_default();
        Ok(Some(messages))
    }

    pub(crate) async fn update_thread(
        &self,
        thread: &Thread,
    ) -> Result<(), Error> {
        let url = self
            .config
            .thread_url(&thread.thread_id, &[])
            .map_err(store_error)?;
        let req = self
            .config
            .authorize(self.client.patch(url))
            .json(&json!({ "metadata": { "title": thread.title } }));
        let _: Value = self.fetch(req).await?;
        Ok(())
    }

    pub(crate) async fn delete_thread(
        &self,
        thread_id: &str,
    ) -> Result<(), Error> {
        let url = self
            .config
            .thread_url(thread_id, &[])
            .map_err(store_error)?;
        let req = self.config.authorize(self.client.delete(url));
        let resp = http::send_raw(req).await.map_err(store_error)?;
        self.log_response(&resp);
        if resp.status() == StatusCode::NOT_FOUND {
            // Already gone.
            debug!(thread_id, "thread to delete does not exist");
            return Ok(());
        }
        http::check_status(resp).await.map_err(store_error)?;
        Ok(())
    }

    #[inline]
    fn post(&self, path: &str) -> RequestBuilder {
        self.config
            .authorize(self.client.post(self.config.endpoint(path)))
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
    ) -> Result<T, Error> {
        let resp = http::send_raw(req).await.map_err(store_error)?;
        self.log_response(&resp);
        decode(resp).await
    }

    fn log_response(&self, resp: &Response) {
        if self.log.verbose {
            debug!(
                url = %resp.url(),
                status = %resp.status(),
                "thread store response"
            );
        }
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, Error> {
    let resp = http::check_status(resp).await.map_err(store_error)?;
    let url = resp.url().clone();
    resp.json().await.map_err(|err| {
        Error::persistence(format!("unexpected response from {url}: {err}"))
    })
}

fn map_message(value: &Value) -> Option<Message> {
    let role = match value.get("type").and_then(Value::as_str)? {
        "human" | "user" => Role::User,
        "ai" | "assistant" => Role::Assistant,
        _ => return None,
    };
    let content = value.get("content").and_then(text_of).unwrap_or_default();
    let message = Message::new(role, content);
    match value.get("id").and_then(Value::as_str) {
        Some(id) => Some(message.with_id(id)),
        None => Some(message),
    }
}

fn store_error(err: Error) -> Error {
    Error::persistence(format!("thread store: {}", err.message()))
}
