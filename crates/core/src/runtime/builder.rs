use std::sync::Arc;

use agent_bridge_model::{Error, LogConfig};
use agent_bridge_providers::Provider;
use agent_bridge_storage::Storage;

use super::{ChatRuntime, ErrorReporter};

/// [`ChatRuntime`] builder.
pub struct ChatRuntimeBuilder {
    pub(crate) provider: Provider,
    pub(crate) storage: Storage,
    pub(crate) on_error: Option<Arc<dyn Fn(&Error) + Send + Sync>>,
    pub(crate) log: LogConfig,
}

impl ChatRuntimeBuilder {
    /// Creates a new builder with the specified provider. Nothing is
    /// persisted unless a storage is set.
    #[inline]
    pub fn with_provider(provider: impl Into<Provider>) -> Self {
        Self {
            provider: provider.into(),
            storage: Storage::Noop,
            on_error: None,
            log: LogConfig::default(),
        }
    }

    /// Sets the storage threads are persisted to.
    #[inline]
    pub fn with_storage(mut self, storage: impl Into<Storage>) -> Self {
        self.storage = storage.into();
        self
    }

    /// Attaches a callback to be invoked when sending a message fails.
    #[inline]
    pub fn on_error(
        mut self,
        on_error: impl Fn(&Error) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(on_error));
        self
    }

    /// Sets the logging options.
    #[inline]
    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    /// Builds the runtime.
    #[inline]
    pub fn build(self) -> ChatRuntime {
        let ChatRuntimeBuilder {
            provider,
            storage,
            on_error,
            log,
        } = self;
        ChatRuntime {
            provider,
            storage,
            reporter: ErrorReporter(on_error),
            log,
        }
    }
}
