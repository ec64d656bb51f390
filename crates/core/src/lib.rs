//! Orchestration of chat threads: sending prompts through the bound
//! provider, streaming the answer back, and persisting the conversation.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod runtime;

pub use runtime::{
    ChatRuntime, ChatRuntimeBuilder, MessageRequest, MessageStream, SendStage,
};
