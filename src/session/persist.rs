//! Best-effort key-value persistence backing the session store.
//!
//! Mirrors browser local storage: string keys, string values. Failures are
//! logged and swallowed; the live session stays authoritative and
//! persistence must never interrupt a request.

use std::{
    collections::HashMap,
    fmt, io,
    path::PathBuf,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";
pub const SENSORS_KEY: &str = "sensors";

#[async_trait]
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: &str);
    async fn remove(&self, key: &str);
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Process-local store. Used when no directory is configured, and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    async fn set(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
    }

    async fn remove(&self, key: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// One file per key: `{dir}/{key}.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Option<String> {
        let path = self.path(key);
        match fs::read_to_string(&path).await {
            Ok(content) => Some(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "session_store: failed to read key");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str) {
        let path = self.path(key);

        if let Err(e) = fs::create_dir_all(&self.dir).await {
            warn!(path = %path.display(), error = %e, "session_store: failed to create directory");
            return;
        }

        if let Err(e) = fs::write(&path, value).await {
            warn!(path = %path.display(), error = %e, "session_store: failed to write key");
        } else {
            debug!(path = %path.display(), bytes = value.len(), "session_store: saved");
        }
    }

    async fn remove(&self, key: &str) {
        let path = self.path(key);
        match fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "session_store: removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "session_store: failed to remove key")
            }
        }
    }
}
