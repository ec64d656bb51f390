//! Backend providers and the streaming pipeline that turns their wire
//! formats into plain assistant text.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod config;
mod extract;
mod graph_agent;
pub mod http;
mod io;
mod stream;
mod webhook;

use agent_bridge_model::{Error, Message};

pub use config::{
    GraphAgentConfig, GraphAgentConfigBuilder, WebhookConfig,
    WebhookConfigBuilder,
};
pub use extract::{extract_content, extract_protocol_version, text_of};
pub use graph_agent::GraphAgentProvider;
pub use stream::ResponseStream;
pub use webhook::WebhookProvider;

/// Identifies a [`Provider`] variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// An agent server running graphs on server-side threads.
    GraphAgent,
    /// A generic chat webhook.
    Webhook,
}

impl ProviderKind {
    /// Returns the name of this kind.
    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::GraphAgent => "graph-agent",
            ProviderKind::Webhook => "webhook",
        }
    }
}

/// The backend a chat is bound to.
///
/// A provider is immutable after construction. Each call to
/// [`send_message`](Provider::send_message) is one network round trip.
#[derive(Clone, Debug)]
pub enum Provider {
    /// See [`GraphAgentProvider`].
    GraphAgent(GraphAgentProvider),
    /// See [`WebhookProvider`].
    Webhook(WebhookProvider),
}

impl Provider {
    /// Returns the kind of this provider.
    #[inline]
    pub fn kind(&self) -> ProviderKind {
        match self {
            Provider::GraphAgent(_) => ProviderKind::GraphAgent,
            Provider::Webhook(_) => ProviderKind::Webhook,
        }
    }

    /// Returns the name of this provider.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Returns the marker token every response must contain, if any.
    #[inline]
    pub fn required_marker(&self) -> Option<&str> {
        match self {
            Provider::GraphAgent(_) => None,
            Provider::Webhook(provider) => provider.config().required_marker(),
        }
    }

    /// Sends the conversation of `thread_id` and returns the decoded
    /// assistant text stream.
    pub async fn send_message(
        &self,
        thread_id: &str,
        messages: &[Message],
    ) -> Result<ResponseStream, Error> {
        match self {
            Provider::GraphAgent(provider) => {
                provider.send_message(thread_id, messages).await
            }
            Provider::Webhook(provider) => {
                provider.send_message(thread_id, messages).await
            }
        }
    }
}

impl From<GraphAgentProvider> for Provider {
    #[inline]
    fn from(provider: GraphAgentProvider) -> Self {
        Provider::GraphAgent(provider)
    }
}

impl From<WebhookProvider> for Provider {
    #[inline]
    fn from(provider: WebhookProvider) -> Self {
        Provider::Webhook(provider)
    }
}
