use std::fmt::Debug;

use agent_bridge_model::Error;
use reqwest::{Method, RequestBuilder, Url};

const DEFAULT_ASSISTANT_ID: &str = "agent";

/// Builder for [`GraphAgentConfig`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct GraphAgentConfigBuilder {
    deployment_url: String,
    assistant_id: Option<String>,
    api_key: Option<String>,
}

impl GraphAgentConfigBuilder {
    /// Creates a builder with the given deployment URL.
    #[inline]
    pub fn with_deployment_url<S: Into<String>>(deployment_url: S) -> Self {
        Self {
            deployment_url: deployment_url.into(),
            assistant_id: None,
            api_key: None,
        }
    }

    /// Sets the assistant (graph) to run.
    #[inline]
    pub fn with_assistant_id<S: Into<String>>(
        mut self,
        assistant_id: S,
    ) -> Self {
        self.assistant_id = Some(assistant_id.into());
        self
    }

    /// Sets the API key sent with every request.
    #[inline]
    pub fn with_api_key<S: Into<String>>(mut self, api_key: S) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> GraphAgentConfig {
        GraphAgentConfig {
            deployment_url: self
                .deployment_url
                .trim_end_matches('/')
                .to_owned(),
            assistant_id: self
                .assistant_id
                .unwrap_or_else(|| DEFAULT_ASSISTANT_ID.to_owned()),
            api_key: self.api_key,
        }
    }
}

impl Debug for GraphAgentConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphAgentConfigBuilder")
            .field("deployment_url", &self.deployment_url)
            .field("assistant_id", &self.assistant_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Configuration for an agent server deployment.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct GraphAgentConfig {
    pub(crate) deployment_url: String,
    pub(crate) assistant_id: String,
    pub(crate) api_key: Option<String>,
}

impl GraphAgentConfig {
    /// Returns the deployment URL, without a trailing slash.
    #[inline]
    pub fn deployment_url(&self) -> &str {
        &self.deployment_url
    }

    /// Returns the assistant id.
    #[inline]
    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    /// Returns the full URL of an API path.
    #[inline]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.deployment_url, path)
    }

    /// Returns the URL of `/threads/{thread_id}` followed by `tail`.
    ///
    /// Every segment is percent-encoded, so the id can't change the route.
    pub fn thread_url(
        &self,
        thread_id: &str,
        tail: &[&str],
    ) -> Result<Url, Error> {
        let invalid = || {
            Error::connection(format!(
                "invalid deployment url: {}",
                self.deployment_url
            ))
        };
        let mut url = Url::parse(&self.deployment_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|()| invalid())?
            .pop_if_empty()
            .push("threads")
            .push(thread_id)
            .extend(tail);
        Ok(url)
    }

    /// Attaches credentials to a request.
    #[inline]
    pub fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(api_key) => req.header("x-api-key", api_key),
            None => req,
        }
    }
}

impl Debug for GraphAgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphAgentConfig")
            .field("deployment_url", &self.deployment_url)
            .field("assistant_id", &self.assistant_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Builder for [`WebhookConfig`].
#[derive(Clone, PartialEq, Eq)]
pub struct WebhookConfigBuilder {
    url: String,
    method: Option<Method>,
    headers: Vec<(String, String)>,
    streaming: bool,
    required_marker: Option<String>,
}

impl WebhookConfigBuilder {
    /// Creates a builder with the given webhook URL.
    #[inline]
    pub fn with_url<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            method: None,
            headers: vec![],
            streaming: false,
            required_marker: None,
        }
    }

    /// Sets the HTTP method, `POST` by default.
    #[inline]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Adds a header sent with every request.
    #[inline]
    pub fn with_header<K: Into<String>, V: Into<String>>(
        mut self,
        name: K,
        value: V,
    ) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Declares that the webhook always answers with a record stream.
    #[inline]
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Requires `marker` to appear in every response.
    ///
    /// A webhook that is not wired up to this client's protocol will
    /// never emit the marker, which is then reported as a protocol
    /// violation instead of a silently truncated answer.
    #[inline]
    pub fn with_required_marker<S: Into<String>>(
        mut self,
        marker: S,
    ) -> Self {
        self.required_marker = Some(marker.into());
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> WebhookConfig {
        WebhookConfig {
            url: self.url,
            method: self.method.unwrap_or(Method::POST),
            headers: self.headers,
            streaming: self.streaming,
            required_marker: self.required_marker,
        }
    }
}

impl Debug for WebhookConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let header_names: Vec<_> =
            self.headers.iter().map(|(name, _)| name).collect();
        f.debug_struct("WebhookConfigBuilder")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("headers", &header_names)
            .field("streaming", &self.streaming)
            .field("required_marker", &self.required_marker)
            .finish()
    }
}

/// Configuration for a chat webhook.
#[derive(Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub(crate) url: String,
    pub(crate) method: Method,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) streaming: bool,
    pub(crate) required_marker: Option<String>,
}

impl WebhookConfig {
    /// Returns the webhook URL.
    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the HTTP method used for requests.
    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns whether responses are always decoded as a record stream.
    #[inline]
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Returns the marker every response must contain, if any.
    #[inline]
    pub fn required_marker(&self) -> Option<&str> {
        self.required_marker.as_deref()
    }
}

impl Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Header values usually carry credentials.
        let header_names: Vec<_> =
            self.headers.iter().map(|(name, _)| name).collect();
        f.debug_struct("WebhookConfig")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("headers", &header_names)
            .field("streaming", &self.streaming)
            .field("required_marker", &self.required_marker)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_agent_defaults() {
        let config =
            GraphAgentConfigBuilder::with_deployment_url("http://localhost/")
                .with_api_key("secret")
                .build();
        assert_eq!(config.assistant_id(), "agent");
        assert_eq!(config.endpoint("/threads"), "http://localhost/threads");
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn test_thread_url_encodes_id() {
        let config =
            GraphAgentConfigBuilder::with_deployment_url("http://localhost/api")
                .build();
        let url = config.thread_url("a/b?c", &["runs", "stream"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost/api/threads/a%2Fb%3Fc/runs/stream"
        );

        let config =
            GraphAgentConfigBuilder::with_deployment_url("http://localhost/")
                .build();
        let url = config.thread_url("t1", &[]).unwrap();
        assert_eq!(url.as_str(), "http://localhost/threads/t1");

        let config =
            GraphAgentConfigBuilder::with_deployment_url("not a url").build();
        assert!(config.thread_url("t1", &[]).is_err());
    }

    #[test]
    fn test_webhook_defaults() {
        let builder = WebhookConfigBuilder::with_url("http://localhost/hook")
            .with_header("Authorization", "Bearer secret");
        let builder_debug = format!("{builder:?}");
        assert!(builder_debug.contains("Authorization"));
        assert!(!builder_debug.contains("secret"));

        let config = builder.build();
        assert_eq!(config.method, Method::POST);
        assert!(!config.streaming);
        assert_eq!(config.required_marker(), None);
        assert!(!format!("{config:?}").contains("secret"));
    }
}
