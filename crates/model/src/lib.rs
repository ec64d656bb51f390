//! Shared vocabulary for the chat bridge.
//!
//! This crate establishes the types every other part of the bridge agrees
//! on: threads and messages as the rendering side sees them, and the one
//! normalized error that all failures are reported through.
//!
//! Types in this crate don't define any behavior. Providers, storage
//! adapters and the runtime live in their own crates.

#![deny(missing_docs)]

mod error;
mod log;
mod message;
mod thread;

pub use error::*;
pub use log::*;
pub use message::*;
pub use thread::*;
