//! Bearer token storage.
//!
//! A token store holds at most one opaque token under a fixed name. It does
//! not know about expiry; that is checked remotely.

use crate::error::{ClientError, ClientResult, ErrorCode, ResultExt};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Reads, writes and clears the stored bearer token.
pub trait TokenStore: Send + Sync {
    /// Returns the stored token, if any.
    fn retrieve(&self) -> ClientResult<Option<String>>;

    /// Stores `token`, replacing any previous value.
    fn set(&self, token: &str) -> ClientResult<()>;

    /// Removes the stored token.
    fn clear(&self) -> ClientResult<()>;
}

/// Token store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn retrieve(&self) -> ClientResult<Option<String>> {
        Ok(self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn set(&self, token: &str) -> ClientResult<()> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> ClientResult<()> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Token store backed by a cookie jar file.
///
/// The jar is a JSON object of cookie name to value. Only the configured
/// cookie is touched; other cookies in the jar are preserved.
#[derive(Debug)]
pub struct CookieJarStore {
    path: PathBuf,
    name: String,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

type Jar = BTreeMap<String, String>;

impl CookieJarStore {
    /// Creates a store for cookie `name` in the jar at `path`.
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            lock: Mutex::new(()),
        }
    }

    /// Returns the jar path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the cookie name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn read_jar(&self) -> ClientResult<Jar> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Jar::new()),
            Err(e) => {
                return Err(ClientError::storage(format!(
                    "Failed to read cookie jar {}: {e}",
                    self.path.display()
                )))
            }
        };
        if contents.trim().is_empty() {
            return Ok(Jar::new());
        }
        serde_json::from_str(&contents).map_err(|e| {
            ClientError::storage(format!(
                "Malformed cookie jar {}: {e}",
                self.path.display()
            ))
        })
    }

    fn write_jar(&self, jar: &Jar) -> ClientResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_client_err_with(
                ErrorCode::StorageError,
                "Failed to create cookie jar directory",
            )?;
        }
        let contents =
            serde_json::to_string_pretty(jar).map_err(|e| ClientError::serialize(e.to_string()))?;
        std::fs::write(&self.path, contents)
            .map_client_err_with(ErrorCode::StorageError, "Failed to write cookie jar")
    }
}

impl TokenStore for CookieJarStore {
    fn retrieve(&self) -> ClientResult<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_jar()?.remove(&self.name))
    }

    fn set(&self, token: &str) -> ClientResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut jar = self.read_jar()?;
        jar.insert(self.name.clone(), token.to_string());
        self.write_jar(&jar)
    }

    fn clear(&self) -> ClientResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut jar = self.read_jar()?;
        if jar.remove(&self.name).is_some() {
            self.write_jar(&jar)?;
        }
        Ok(())
    }
}
