use std::sync::Arc;

use agent_bridge_model::{Error, LogConfig, Message, last_user_content};
use reqwest::{Client, Method, Url, header};
use serde::Serialize;
use serde_json::Value;

use crate::config::WebhookConfig;
use crate::extract::extract_content;
use crate::http;
use crate::io::Chunks;
use crate::stream::ResponseStream;

/// Provider for a chat webhook.
///
/// The webhook either answers with one JSON document or streams
/// line-delimited JSON records.
#[derive(Clone, Debug)]
pub struct WebhookProvider {
    client: Client,
    config: Arc<WebhookConfig>,
    log: LogConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookRequest<'a> {
    chat_input: &'a str,
    session_id: &'a str,
}

impl WebhookProvider {
    /// Creates a new `WebhookProvider` with the given configuration.
    #[inline]
    pub fn new(config: WebhookConfig) -> Self {
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
    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// Sends the newest user message of `thread_id` to the webhook.
    pub fn send_message(
        &self,
        thread_id: &str,
        messages: &[Message],
    ) -> impl Future<Output = Result<ResponseStream, Error>> + Send + 'static
    {
        let payload = WebhookRequest {
            chat_input: last_user_content(messages).unwrap_or_default(),
            session_id: thread_id,
        };
        let req = self.build_request(&payload);
        let expect_stream = self.config.streaming;
        let log = self.log;

        async move {
            let resp = http::send(req?).await?;
            http::ensure_body(&resp)?;

            if expect_stream || http::is_streaming_content_type(resp.headers())
            {
                let chunks = Chunks::from_response(resp);
                return Ok(ResponseStream::ndjson(chunks, log));
            }

            let body = resp.bytes().await.map_err(|err| {
                Error::connection(format!("failed to read response: {err}"))
            })?;
            match serde_json::from_slice::<Value>(&body) {
                Ok(value) => {
                    if log.verbose {
                        debug!("buffered webhook response: {value}");
                    }
                    Ok(ResponseStream::buffered(buffered_content(&value)))
                }
                Err(err) => {
                    debug!("webhook body is not a JSON document: {err}");
                    if has_records(&body) {
                        let chunks = Chunks::from_chunks([body]);
                        return Ok(ResponseStream::ndjson(chunks, log));
                    }
                    let text = String::from_utf8_lossy(&body).into_owned();
                    Ok(ResponseStream::buffered(Some(text)))
                }
            }
        }
    }

    fn build_request(
        &self,
        payload: &WebhookRequest<'_>,
    ) -> Result<reqwest::RequestBuilder, Error> {
        let config = &self.config;
        let mut req = if config.method == Method::GET {
            let mut url = Url::parse(&config.url).map_err(|err| {
                Error::connection(format!("invalid webhook url: {err}"))
            })?;
            url.query_pairs_mut()
                .append_pair("chatInput", payload.chat_input)
                .append_pair("sessionId", payload.session_id);
            self.client.get(url)
        } else {
            self.client
                .request(config.method.clone(), &config.url)
                .json(payload)
        };
        req = req.header(
            header::ACCEPT,
            "application/json, application/x-ndjson, text/event-stream",
        );
        for (name, value) in &config.headers {
            req = req.header(name, value);
        }
        Ok(req)
    }
}

/// Returns whether any line of `body` is a record carrying content.
fn has_records(body: &[u8]) -> bool {
    String::from_utf8_lossy(body).lines().any(|line| {
        serde_json::from_str::<Value>(line)
            .is_ok_and(|value| extract_content(&value).is_some())
    })
}

fn buffered_content(value: &Value) -> Option<String> {
    extract_content(value).or_else(|| {
        let first = value.as_array()?.first()?;
        extract_content(first)
    })
}

#[cfg(test)]
mod tests {
    use agent_bridge_model::ErrorKind;
    use agent_bridge_test_backend::{PresetResponse, TestBackend};
    use futures_util::StreamExt;

    use super::*;
    use crate::WebhookConfigBuilder;

    async fn collect(stream: ResponseStream) -> Vec<String> {
        stream
            .map(|item| String::from_utf8(item.unwrap().to_vec()).unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_buffered_json() {
        let backend = TestBackend::start().await;
        backend.route(
            Method::POST,
            "/hook",
            PresetResponse::ok("application/json")
                .with_body(r#"{"output":"hi"}"#),
        );
        let provider = WebhookProvider::new(
            WebhookConfigBuilder::with_url(format!("{}/hook", backend.url()))
                .with_header("Authorization", "Bearer t")
                .build(),
        );

        let stream = provider
            .send_message("s1", &[Message::user("Hello")])
            .await
            .unwrap();
        assert_eq!(collect(stream).await, ["hi"]);

        let requests = backend.requests();
        assert_eq!(requests[0].header("authorization"), Some("Bearer t"));
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "chatInput": "Hello", "sessionId": "s1" })
        );
    }

    #[tokio::test]
    async fn test_streaming_by_content_type() {
        let backend = TestBackend::start().await;
        backend.route(
            Method::POST,
            "/hook",
            PresetResponse::ok("application/x-ndjson").with_chunks([
                r#"{"type":"begin"}"#,
                "\n{\"type\":\"item\",\"content\":\"Hel",
                "lo\"}\n{\"type\":\"item\",\"content\":\" world\"}\n",
                r#"{"type":"end"}"#,
            ]),
        );
        let provider = WebhookProvider::new(
            WebhookConfigBuilder::with_url(format!("{}/hook", backend.url()))
                .build(),
        );
        let stream = provider
            .send_message("s1", &[Message::user("Hello")])
            .await
            .unwrap();
        assert_eq!(collect(stream).await.concat(), "Hello world");
    }

    #[tokio::test]
    async fn test_non_json_body_falls_back_to_text() {
        let backend = TestBackend::start().await;
        backend.route(
            Method::POST,
            "/hook",
            PresetResponse::ok("text/plain").with_body("Workflow was started"),
        );
        let provider = WebhookProvider::new(
            WebhookConfigBuilder::with_url(format!("{}/hook", backend.url()))
                .build(),
        );
        let stream = provider
            .send_message("s1", &[Message::user("Hello")])
            .await
            .unwrap();
        assert_eq!(collect(stream).await, ["Workflow was started"]);
    }

    #[tokio::test]
    async fn test_multiline_text_body_is_kept_whole() {
        let backend = TestBackend::start().await;
        backend.route(
            Method::POST,
            "/hook",
            PresetResponse::ok("text/plain").with_body("Line one\nLine two\n"),
        );
        let provider = WebhookProvider::new(
            WebhookConfigBuilder::with_url(format!("{}/hook", backend.url()))
                .build(),
        );
        let stream = provider
            .send_message("s1", &[Message::user("Hello")])
            .await
            .unwrap();
        assert_eq!(collect(stream).await, ["Line one\nLine two\n"]);
    }

    #[tokio::test]
    async fn test_unlabelled_records_body() {
        let backend = TestBackend::start().await;
        backend.route(
            Method::POST,
            "/hook",
            PresetResponse::ok("text/plain").with_body(concat!(
                "{\"type\":\"item\",\"content\":\"a\"}\n",
                "{\"type\":\"item\",\"content\":\"b\"}\n",
            )),
        );
        let provider = WebhookProvider::new(
            WebhookConfigBuilder::with_url(format!("{}/hook", backend.url()))
                .build(),
        );
        let stream = provider
            .send_message("s1", &[Message::user("Hello")])
            .await
            .unwrap();
        assert_eq!(collect(stream).await, ["a", "b"]);
    }

    #[tokio::test]
    async fn test_get_sends_query() {
        let backend = TestBackend::start().await;
        backend.route(
            Method::GET,
            "/hook",
            PresetResponse::ok("application/json")
                .with_body(r#"[{"output":"from array"}]"#),
        );
        let provider = WebhookProvider::new(
            WebhookConfigBuilder::with_url(format!("{}/hook", backend.url()))
                .with_method(Method::GET)
                .build(),
        );
        let stream = provider
            .send_message("s 1", &[Message::user("a&b")])
            .await
            .unwrap();
        assert_eq!(collect(stream).await, ["from array"]);

        let requests = backend.requests();
        assert_eq!(requests[0].query(), Some("chatInput=a%26b&sessionId=s+1"));
    }

    #[tokio::test]
    async fn test_empty_body() {
        let backend = TestBackend::start().await;
        backend.route(Method::POST, "/hook", PresetResponse::status(200));
        let provider = WebhookProvider::new(
            WebhookConfigBuilder::with_url(format!("{}/hook", backend.url()))
                .build(),
        );
        let err = provider
            .send_message("s1", &[Message::user("Hello")])
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
    }
}
