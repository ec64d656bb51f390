//! Persistent storage in a local key-value file.
//!
//! The file holds one JSON object. The thread list lives under
//! `<namespace>:threads` and the messages of each thread under
//! `<namespace>:thread:<id>`. Nothing is cached between calls; every
//! operation reads the file and mutations write it back whole.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use agent_bridge_model::{
    Error, LogConfig, Message, Role, Thread, title_from_message,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::fs;

type Entries = BTreeMap<String, Value>;

const DEFAULT_NAMESPACE: &str = "agent-bridge";

/// Storage backed by a local key-value file.
#[derive(Clone, Debug)]
pub struct LocalStorage {
    path: Arc<PathBuf>,
    namespace: String,
    log: LogConfig,
}

impl LocalStorage {
    /// Creates a storage using the file at `path`.
    ///
    /// The file and its parent directories are created on the first write.
    #[inline]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
            namespace: DEFAULT_NAMESPACE.to_owned(),
            log: LogConfig::default(),
        }
    }

    /// Sets the prefix of all keys written by this storage.
    #[inline]
    pub fn with_namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the logging options.
    #[inline]
    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    /// Returns the path of the backing file.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) async fn get_thread_list(&self) -> Result<Vec<Thread>, Error> {
        let entries = self.read_entries().await?;
        let mut threads: Vec<Thread> =
            decode(&entries, &self.threads_key())?.unwrap_or_default();
        threads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(threads)
    }

    pub(crate) async fn get_thread(
        &self,
        thread_id: &str,
    ) -> Result<Option<Vec<Message>>, Error> {
        let entries = self.read_entries().await?;
        decode(&entries, &self.thread_key(thread_id))
    }

    pub(crate) async fn save_thread(
        &self,
        thread_id: &str,
        messages: &[Message],
    ) -> Result<(), Error> {
        let mut entries = self.read_entries().await?;
        encode(&mut entries, self.thread_key(thread_id), messages)?;

        let threads_key = self.threads_key();
        let mut threads: Vec<Thread> =
            decode(&entries, &threads_key)?.unwrap_or_default();
        if !threads.iter().any(|t| t.thread_id == thread_id) {
            // Threads first seen through a save get a title from their
            // opening message.
            let first = messages.iter().find(|m| m.role == Role::User);
            let mut thread = Thread::new(title_from_message(
                first.map(|m| m.content.as_str()).unwrap_or_default(),
            ));
            thread.thread_id = thread_id.to_owned();
            threads.push(thread);
            encode(&mut entries, threads_key, &threads)?;
        }

        if self.log.verbose {
            debug!(thread_id, count = messages.len(), "saved thread messages");
        }
        self.write_entries(&entries).await
    }

    pub(crate) async fn save_thread_list(
        &self,
        threads: &[Thread],
    ) -> Result<(), Error> {
        let mut entries = self.read_entries().await?;
        encode(&mut entries, self.threads_key(), threads)?;
        self.write_entries(&entries).await
    }

    pub(crate) async fn update_thread(
        &self,
        thread: &Thread,
    ) -> Result<(), Error> {
        let mut entries = self.read_entries().await?;
        let threads_key = self.threads_key();
        let mut threads: Vec<Thread> =
            decode(&entries, &threads_key)?.unwrap_or_default();
        match threads.iter_mut().find(|t| t.thread_id == thread.thread_id) {
            Some(existing) => *existing = thread.clone(),
            None => threads.push(thread.clone()),
        }
        encode(&mut entries, threads_key, &threads)?;
        self.write_entries(&entries).await
    }

    pub(crate) async fn delete_thread(
        &self,
        thread_id: &str,
    ) -> Result<(), Error> {
        let mut entries = self.read_entries().await?;
        entries.remove(&self.thread_key(thread_id));

        let threads_key = self.threads_key();
        let mut threads: Vec<Thread> =
            decode(&entries, &threads_key)?.unwrap_or_default();
        threads.retain(|t| t.thread_id != thread_id);
        encode(&mut entries, threads_key, &threads)?;
        self.write_entries(&entries).await
    }

    pub(crate) async fn create_thread(
        &self,
        title: &str,
    ) -> Result<Thread, Error> {
        let thread = Thread::new(title);
        let mut entries = self.read_entries().await?;
        let no_messages: &[Message] = &[];
        encode(&mut entries, self.thread_key(&thread.thread_id), no_messages)?;

        let threads_key = self.threads_key();
        let mut threads: Vec<Thread> =
            decode(&entries, &threads_key)?.unwrap_or_default();
        threads.push(thread.clone());
        encode(&mut entries, threads_key, &threads)?;
        self.write_entries(&entries).await?;
        Ok(thread)
    }

    #[inline]
    fn threads_key(&self) -> String {
        format!("{}:threads", self.namespace)
    }

    #[inline]
    fn thread_key(&self, thread_id: &str) -> String {
        format!("{}:thread:{thread_id}", self.namespace)
    }

    async fn read_entries(&self) -> Result<Entries, Error> {
        match fs::read(self.path.as_path()).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
                Error::persistence(format!(
                    "{} is corrupted: {err}",
                    self.path.display()
                ))
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Ok(Entries::new())
            }
            Err(err) => Err(io_error("read", &self.path, err)),
        }
    }

    async fn write_entries(&self, entries: &Entries) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|err| {
                io_error("create directory for", &self.path, err)
            })?;
        }
        let bytes = serde_json::to_vec(entries).map_err(|err| {
            Error::persistence(format!("failed to encode entries: {err}"))
        })?;

        // Replace the file in one step so readers never see half of it.
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, bytes)
            .await
            .map_err(|err| io_error("write", &tmp_path, err))?;
        fs::rename(&tmp_path, self.path.as_path())
            .await
            .map_err(|err| io_error("replace", &self.path, err))
    }
}

fn decode<T: DeserializeOwned>(
    entries: &Entries,
    key: &str,
) -> Result<Option<T>, Error> {
    let Some(value) = entries.get(key) else {
        return Ok(None);
    };
    serde_json::from_value(value.clone()).map(Some).map_err(|err| {
        Error::persistence(format!("entry `{key}` is corrupted: {err}"))
    })
}

fn encode<T: Serialize + ?Sized>(
    entries: &mut Entries,
    key: String,
    value: &T,
) -> Result<(), Error> {
    let value = serde_json::to_value(value).map_err(|err| {
        Error::persistence(format!("failed to encode entry `{key}`: {err}"))
    })?;
    entries.insert(key, value);
    Ok(())
}

fn io_error(action: &str, path: &Path, err: io::Error) -> Error {
    Error::persistence(format!("failed to {action} {}: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use agent_bridge_model::ErrorKind;
    use tempfile::TempDir;

    use super::*;

    fn storage(dir: &TempDir) -> LocalStorage {
        LocalStorage::new(dir.path().join("nested").join("store.json"))
    }

    #[tokio::test]
    async fn test_unknown_and_empty_threads() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        assert_eq!(storage.get_thread("missing").await.unwrap(), None);

        let thread = storage.create_thread("Plans").await.unwrap();
        assert_eq!(
            storage.get_thread(&thread.thread_id).await.unwrap(),
            Some(vec![])
        );
        assert_eq!(storage.get_thread_list().await.unwrap(), vec![thread]);
    }

    #[tokio::test]
    async fn test_save_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let messages = vec![
            Message::user("What's the weather like?"),
            Message::assistant("Sunny."),
        ];

        storage.save_thread("t1", &messages).await.unwrap();
        assert_eq!(
            storage.get_thread("t1").await.unwrap(),
            Some(messages.clone())
        );

        // An unlisted thread is registered when saved.
        let threads = storage.get_thread_list().await.unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].thread_id, "t1");
        assert_eq!(threads[0].title, "What's the weather like?");

        // A fresh instance over the same file sees the same data.
        let reopened = LocalStorage::new(storage.path().to_owned());
        assert_eq!(reopened.get_thread("t1").await.unwrap(), Some(messages));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let mut thread = storage.create_thread("Old").await.unwrap();
        let other = storage.create_thread("Other").await.unwrap();

        thread.title = "New".to_owned();
        storage.update_thread(&thread).await.unwrap();
        let threads = storage.get_thread_list().await.unwrap();
        assert_eq!(threads.len(), 2);
        assert!(threads.iter().any(|t| t.title == "New"));

        storage.delete_thread(&thread.thread_id).await.unwrap();
        assert_eq!(storage.get_thread(&thread.thread_id).await.unwrap(), None);
        assert_eq!(storage.get_thread_list().await.unwrap(), vec![other]);
    }

    #[tokio::test]
    async fn test_namespaces_are_separate() {
        let dir = TempDir::new().unwrap();
        let first = storage(&dir).with_namespace("a");
        let second = storage(&dir).with_namespace("b");

        first.save_thread("t1", &[Message::user("hi")]).await.unwrap();
        assert_eq!(second.get_thread("t1").await.unwrap(), None);
        assert!(second.get_thread_list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupted_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "not json").unwrap();

        let err = LocalStorage::new(path).get_thread_list().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PersistenceFailure);
    }
}
