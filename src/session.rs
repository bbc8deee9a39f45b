//! Authentication session.
//!
//! The bearer token lives in an explicit [`Session`] value that is passed to
//! every authenticated API call. It is acquired by `login` and invalidated by
//! `logout` or by the backend answering 401. A [`TokenStore`] keeps it across
//! runs.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ChatError;

/// Persistent key-value slot for the auth token.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<String>, ChatError>;
    fn save(&self, token: &str) -> Result<(), ChatError>;
    fn clear(&self) -> Result<(), ChatError>;
}

// ---------------------------------------------------------------------------
// File store
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    token: String,
}

/// Token stored as `{"token": "..."}` in a JSON file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/jbc-chat/session.json`, falling back to the working
    /// directory when the platform has no config dir.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("jbc-chat")
            .join("session.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<String>, ChatError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let file: SessionFile = serde_json::from_str(&raw)?;
        Ok(Some(file.token).filter(|t| !t.is_empty()))
    }

    fn save(&self, token: &str) -> Result<(), ChatError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string(&SessionFile {
            token: token.to_string(),
        })?;
        std::fs::write(&self.path, body)?;
        debug!(path = %self.path.display(), "session token saved");
        Ok(())
    }

    fn clear(&self) -> Result<(), ChatError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Memory store
// ---------------------------------------------------------------------------

/// Process-local store. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    slot: Arc<Mutex<Option<String>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(token.into()))),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<String>, ChatError> {
        Ok(self.lock().clone())
    }

    fn save(&self, token: &str) -> Result<(), ChatError> {
        *self.lock() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), ChatError> {
        *self.lock() = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session {
    token: Option<String>,
    store: Box<dyn TokenStore>,
}

impl Session {
    /// Restore whatever token `store` holds.
    pub fn load(store: impl TokenStore + 'static) -> Result<Self, ChatError> {
        let token = store.load()?;
        debug!(authenticated = token.is_some(), "session loaded");
        Ok(Self {
            token,
            store: Box::new(store),
        })
    }

    /// A session that forgets its token when the process exits.
    pub fn ephemeral() -> Self {
        Self {
            token: None,
            store: Box::new(MemoryTokenStore::new()),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// The token to send as `Authorization: Bearer ...`.
    pub fn bearer(&self) -> Result<&str, ChatError> {
        self.token.as_deref().ok_or(ChatError::NotLoggedIn)
    }

    pub fn acquire(&mut self, token: String) -> Result<(), ChatError> {
        if token.is_empty() {
            return Err(ChatError::InvalidArgument(
                "backend returned an empty access token".to_string(),
            ));
        }
        self.store.save(&token)?;
        self.token = Some(token);
        info!("session acquired");
        Ok(())
    }

    /// Forget the token in memory and in the store.
    pub fn invalidate(&mut self) -> Result<(), ChatError> {
        self.token = None;
        self.store.clear()?;
        info!("session invalidated");
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
