use std::fmt::{self, Display};
use std::path::PathBuf;

use agent_bridge_core::{ChatRuntime, ChatRuntimeBuilder};
use agent_bridge_model::{Error, LogConfig};
use agent_bridge_providers::{
    GraphAgentConfig, GraphAgentConfigBuilder, GraphAgentProvider, Provider,
    WebhookConfig, WebhookConfigBuilder, WebhookProvider,
};
use agent_bridge_storage::{AgentStorage, LocalStorage, Storage};
use reqwest::Method;

const PREFIX: &str = "AGENT_BRIDGE_";
const DEFAULT_STORAGE_FILE: &str = "threads.json";

/// An invalid or incomplete configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn missing(key: &str) -> Self {
        Self::new(format!("{PREFIX}{key} is not set"))
    }

    fn invalid(key: &str, value: &str, expected: &str) -> Self {
        Self::new(format!(
            "{PREFIX}{key} has invalid value {value:?}, expected {expected}"
        ))
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Which provider to talk to, and how.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderConfig {
    /// An agent server deployment.
    GraphAgent(GraphAgentConfig),
    /// A chat webhook.
    Webhook(WebhookConfig),
}

/// Where conversations are kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageConfig {
    /// Nothing is persisted.
    None,
    /// A JSON file at the given path.
    Local(PathBuf),
    /// The agent server keeps the threads.
    AgentManaged(GraphAgentConfig),
}

/// Runtime configuration read from `AGENT_BRIDGE_*` environment
/// variables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvConfig {
    /// The provider to bind.
    pub provider: ProviderConfig,
    /// The storage to bind.
    pub storage: StorageConfig,
    /// Diagnostics settings for every component.
    pub log: LogConfig,
}

impl EnvConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which is given full
    /// variable names such as `AGENT_BRIDGE_PROVIDER`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let log = LogConfig {
            verbose: vars.flag("DEBUG")?.unwrap_or(false),
        };

        let provider_name = vars.required("PROVIDER")?;
        let provider = match provider_name.as_str() {
            "graph-agent" => {
                ProviderConfig::GraphAgent(graph_agent_config(&vars)?)
            }
            "webhook" => ProviderConfig::Webhook(webhook_config(&vars)?),
            other => {
                return Err(ConfigError::invalid(
                    "PROVIDER",
                    other,
                    "`graph-agent` or `webhook`",
                ));
            }
        };

        let storage_name = vars.get("STORAGE").unwrap_or_else(|| {
            match provider {
                ProviderConfig::GraphAgent(_) => "agent".to_owned(),
                ProviderConfig::Webhook(_) => "local".to_owned(),
            }
        });
        let storage = match storage_name.as_str() {
            "none" => StorageConfig::None,
            "local" => StorageConfig::Local(storage_path(&vars)),
            "agent" => match &provider {
                ProviderConfig::GraphAgent(config) => {
                    StorageConfig::AgentManaged(config.clone())
                }
                ProviderConfig::Webhook(_) => {
                    StorageConfig::AgentManaged(graph_agent_config(&vars)?)
                }
            },
            other => {
                return Err(ConfigError::invalid(
                    "STORAGE",
                    other,
                    "`none`, `local` or `agent`",
                ));
            }
        };

        Ok(Self {
            provider,
            storage,
            log,
        })
    }

    /// Builds a runtime bound to the configured provider and storage.
    pub fn build_runtime(
        self,
        on_error: impl Fn(&Error) + Send + Sync + 'static,
    ) -> ChatRuntime {
        let log = self.log;
        let provider: Provider = match self.provider {
            ProviderConfig::GraphAgent(config) => {
                GraphAgentProvider::new(config).with_log_config(log).into()
            }
            ProviderConfig::Webhook(config) => {
                WebhookProvider::new(config).with_log_config(log).into()
            }
        };
        let storage: Storage = match self.storage {
            StorageConfig::None => Storage::Noop,
            StorageConfig::Local(path) => {
                LocalStorage::new(path).with_log_config(log).into()
            }
            StorageConfig::AgentManaged(config) => {
                AgentStorage::new(config).with_log_config(log).into()
            }
        };
        ChatRuntimeBuilder::with_provider(provider)
            .with_storage(storage)
            .on_error(on_error)
            .with_log_config(log)
            .build()
    }
}

struct Vars<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Vars<'_> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(&format!("{PREFIX}{key}"))
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::missing(key))
    }

    fn flag(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::invalid(key, &value, "a boolean")),
        }
    }
}

fn graph_agent_config(
    vars: &Vars<'_>,
) -> Result<GraphAgentConfig, ConfigError> {
    let deployment_url = vars.required("DEPLOYMENT_URL")?;
    let mut builder =
        GraphAgentConfigBuilder::with_deployment_url(deployment_url);
    if let Some(assistant_id) = vars.get("ASSISTANT_ID") {
        builder = builder.with_assistant_id(assistant_id);
    }
    if let Some(api_key) = vars.get("API_KEY") {
        builder = builder.with_api_key(api_key);
    }
    Ok(builder.build())
}

fn webhook_config(vars: &Vars<'_>) -> Result<WebhookConfig, ConfigError> {
    let mut builder =
        WebhookConfigBuilder::with_url(vars.required("WEBHOOK_URL")?);
    if let Some(method) = vars.get("WEBHOOK_METHOD") {
        let upper = method.to_ascii_uppercase();
        let parsed = Method::from_bytes(upper.as_bytes()).map_err(|_| {
            ConfigError::invalid("WEBHOOK_METHOD", &method, "an HTTP method")
        })?;
        builder = builder.with_method(parsed);
    }
    if let Some(streaming) = vars.flag("WEBHOOK_STREAMING")? {
        builder = builder.with_streaming(streaming);
    }
    if let Some(marker) = vars.get("WEBHOOK_MARKER") {
        builder = builder.with_required_marker(marker);
    }
    Ok(builder.build())
}

fn storage_path(vars: &Vars<'_>) -> PathBuf {
    if let Some(path) = vars.get("STORAGE_PATH") {
        return PathBuf::from(path);
    }
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home)
            .join(".agent-bridge")
            .join(DEFAULT_STORAGE_FILE),
        None => PathBuf::from(DEFAULT_STORAGE_FILE),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use agent_bridge_providers::ProviderKind;
    use agent_bridge_storage::StorageKind;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<EnvConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (format!("{PREFIX}{key}"), value.to_string()))
            .collect();
        EnvConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_graph_agent_defaults_to_agent_storage() {
        let config = config(&[
            ("PROVIDER", "graph-agent"),
            ("DEPLOYMENT_URL", "http://localhost:2024/"),
        ])
        .unwrap();

        let ProviderConfig::GraphAgent(graph) = &config.provider else {
            panic!("unexpected provider: {:?}", config.provider);
        };
        assert_eq!(graph.deployment_url(), "http://localhost:2024");
        assert_eq!(graph.assistant_id(), "agent");
        assert_eq!(config.storage, StorageConfig::AgentManaged(graph.clone()));
        assert!(!config.log.verbose);
    }

    #[test]
    fn test_webhook_settings() {
        let config = config(&[
            ("PROVIDER", "webhook"),
            ("WEBHOOK_URL", "http://localhost:5678/webhook/chat"),
            ("WEBHOOK_METHOD", "get"),
            ("WEBHOOK_STREAMING", "true"),
            ("WEBHOOK_MARKER", "[[done]]"),
            ("STORAGE", "local"),
            ("STORAGE_PATH", "/tmp/chat.json"),
            ("DEBUG", "1"),
        ])
        .unwrap();

        let ProviderConfig::Webhook(webhook) = &config.provider else {
            panic!("unexpected provider: {:?}", config.provider);
        };
        assert_eq!(webhook.url(), "http://localhost:5678/webhook/chat");
        assert_eq!(webhook.method(), &Method::GET);
        assert!(webhook.is_streaming());
        assert_eq!(webhook.required_marker(), Some("[[done]]"));
        assert_eq!(
            config.storage,
            StorageConfig::Local(PathBuf::from("/tmp/chat.json"))
        );
        assert!(config.log.verbose);
    }

    #[test]
    fn test_missing_values() {
        let err = config(&[]).unwrap_err();
        assert_eq!(err.message(), "AGENT_BRIDGE_PROVIDER is not set");

        let err = config(&[("PROVIDER", "webhook")]).unwrap_err();
        assert_eq!(err.message(), "AGENT_BRIDGE_WEBHOOK_URL is not set");

        // Agent storage needs a deployment even with a webhook provider.
        let err = config(&[
            ("PROVIDER", "webhook"),
            ("WEBHOOK_URL", "http://localhost/chat"),
            ("STORAGE", "agent"),
        ])
        .unwrap_err();
        assert_eq!(err.message(), "AGENT_BRIDGE_DEPLOYMENT_URL is not set");
    }

    #[test]
    fn test_invalid_values() {
        let err = config(&[("PROVIDER", "openai")]).unwrap_err();
        assert!(err.message().contains("AGENT_BRIDGE_PROVIDER"));
        assert!(err.to_string().starts_with("configuration error: "));

        let err = config(&[
            ("PROVIDER", "webhook"),
            ("WEBHOOK_URL", "http://localhost/chat"),
            ("WEBHOOK_STREAMING", "maybe"),
        ])
        .unwrap_err();
        assert!(err.message().contains("AGENT_BRIDGE_WEBHOOK_STREAMING"));

        let err = config(&[
            ("PROVIDER", "webhook"),
            ("WEBHOOK_URL", "http://localhost/chat"),
            ("STORAGE", "cloud"),
        ])
        .unwrap_err();
        assert!(err.message().contains("AGENT_BRIDGE_STORAGE"));
    }

    #[tokio::test]
    async fn test_build_runtime() {
        let runtime = config(&[
            ("PROVIDER", "webhook"),
            ("WEBHOOK_URL", "http://localhost/chat"),
            ("STORAGE", "none"),
        ])
        .unwrap()
        .build_runtime(|_| {});

        assert_eq!(runtime.provider().kind(), ProviderKind::Webhook);
        assert_eq!(runtime.storage().kind(), StorageKind::None);
        assert!(runtime.fetch_thread_list().await.unwrap().is_empty());
    }
}
