//! Storage adapters persisting threads and their messages.
//!
//! Exactly one adapter is bound to a chat for its whole lifetime. Every
//! adapter is a stateless façade: whatever state exists lives in the
//! medium behind it.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod agent;
mod local;

use agent_bridge_model::{Error, Message, Thread};

pub use agent::AgentStorage;
pub use local::LocalStorage;

/// Identifies a [`Storage`] variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// Nothing is persisted.
    None,
    /// A local key-value file.
    Local,
    /// The agent server's own thread store.
    AgentManaged,
}

/// Where threads and messages are persisted.
#[derive(Clone, Debug)]
pub enum Storage {
    /// Persists nothing. Reads find nothing and writes succeed trivially.
    Noop,
    /// See [`LocalStorage`].
    Local(LocalStorage),
    /// See [`AgentStorage`].
    AgentManaged(AgentStorage),
}

impl Storage {
    /// Returns the kind of this storage.
    #[inline]
    pub fn kind(&self) -> StorageKind {
        match self {
            Storage::Noop => StorageKind::None,
            Storage::Local(_) => StorageKind::Local,
            Storage::AgentManaged(_) => StorageKind::AgentManaged,
        }
    }

    /// Returns whether the backend persists messages by itself while
    /// generating responses.
    #[inline]
    pub fn is_agent_managed(&self) -> bool {
        self.kind() == StorageKind::AgentManaged
    }

    /// Returns all known threads, newest first.
    pub async fn get_thread_list(&self) -> Result<Vec<Thread>, Error> {
        match self {
            Storage::Noop => Ok(vec![]),
            Storage::Local(storage) => storage.get_thread_list().await,
            Storage::AgentManaged(storage) => storage.get_thread_list().await,
        }
    }

    /// Returns the messages of a thread.
    ///
    /// `None` means the thread is unknown, which is distinct from a known
    /// thread without messages.
    pub async fn get_thread(
        &self,
        thread_id: &str,
    ) -> Result<Option<Vec<Message>>, Error> {
        match self {
            Storage::Noop => Ok(None),
            Storage::Local(storage) => storage.get_thread(thread_id).await,
            Storage::AgentManaged(storage) => {
                storage.get_thread(thread_id).await
            }
        }
    }

    /// Replaces the messages of a thread.
    pub async fn save_thread(
        &self,
        thread_id: &str,
        messages: &[Message],
    ) -> Result<(), Error> {
        match self {
            Storage::Local(storage) => {
                storage.save_thread(thread_id, messages).await
            }
            // The agent server has already recorded the messages.
            Storage::Noop | Storage::AgentManaged(_) => Ok(()),
        }
    }

    /// Replaces the thread list.
    pub async fn save_thread_list(
        &self,
        threads: &[Thread],
    ) -> Result<(), Error> {
        match self {
            Storage::Local(storage) => storage.save_thread_list(threads).await,
            Storage::Noop | Storage::AgentManaged(_) => Ok(()),
        }
    }

    /// Inserts or replaces a thread's metadata.
    pub async fn update_thread(&self, thread: &Thread) -> Result<(), Error> {
        match self {
            Storage::Noop => Ok(()),
            Storage::Local(storage) => storage.update_thread(thread).await,
            Storage::AgentManaged(storage) => {
                storage.update_thread(thread).await
            }
        }
    }

    /// Deletes a thread and its messages. Deleting an unknown thread
    /// succeeds.
    pub async fn delete_thread(&self, thread_id: &str) -> Result<(), Error> {
        match self {
            Storage::Noop => Ok(()),
            Storage::Local(storage) => storage.delete_thread(thread_id).await,
            Storage::AgentManaged(storage) => {
                storage.delete_thread(thread_id).await
            }
        }
    }

    /// Creates a new, empty thread.
    ///
    /// With the agent-managed storage the thread is created remotely and
    /// carries the server's id.
    pub async fn create_thread(&self, title: &str) -> Result<Thread, Error> {
        match self {
            Storage::Noop => Ok(Thread::new(title)),
            Storage::Local(storage) => storage.create_thread(title).await,
            Storage::AgentManaged(storage) => {
                storage.create_thread(title).await
            }
        }
    }
}

impl From<LocalStorage> for Storage {
    #[inline]
    fn from(storage: LocalStorage) -> Self {
        Storage::Local(storage)
    }
}

impl From<AgentStorage> for Storage {
    #[inline]
    fn from(storage: AgentStorage) -> Self {
        Storage::AgentManaged(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop() {
        let storage = Storage::Noop;
        assert!(!storage.is_agent_managed());

        let thread = storage.create_thread("Scratch").await.unwrap();
        storage
            .save_thread(&thread.thread_id, &[Message::user("hi")])
            .await
            .unwrap();
        storage.update_thread(&thread).await.unwrap();
        assert_eq!(storage.get_thread(&thread.thread_id).await.unwrap(), None);
        assert!(storage.get_thread_list().await.unwrap().is_empty());
        storage.delete_thread(&thread.thread_id).await.unwrap();
    }
}
