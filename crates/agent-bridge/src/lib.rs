//! An embeddable chat bridge that talks to remote agent backends.
//!
//! The crate includes a CLI tool for chatting in the terminal. And you can
//! also use it as a library to bring the chat runtime into your own host
//! apps, configured either in code or from the environment.

#![deny(missing_docs)]

#[allow(unused_imports)]
#[macro_use]
extern crate tracing;

mod env;

pub use env::{ConfigError, EnvConfig, ProviderConfig, StorageConfig};

/// Re-exports of [`agent_bridge_model`] crate.
pub mod model {
    pub use agent_bridge_model::*;
}

/// Re-exports of [`agent_bridge_providers`] crate.
pub mod providers {
    pub use agent_bridge_providers::*;
}

/// Re-exports of [`agent_bridge_storage`] crate.
pub mod storage {
    pub use agent_bridge_storage::*;
}

/// Re-exports of [`agent_bridge_core`] crate.
pub mod core {
    pub use agent_bridge_core::*;
}
