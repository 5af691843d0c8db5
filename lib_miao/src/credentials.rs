//! Bearer token sources for the stream and REST endpoints.
//!
//! The token is looked up again on every `connect()`, so a logout (clearing the
//! token) stops reconnection attempts and a fresh login is picked up without
//! rebuilding the client.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

/// Where the current session token comes from.
pub trait CredentialSource: Send + Sync + 'static {
    /// The bearer token, or `None` when the user is not authenticated.
    fn token(&self) -> Option<String>;
}

/// In-memory session token that can be swapped at runtime.
#[derive(Debug, Default)]
pub struct SessionToken {
    token: RwLock<Option<String>>,
}

impl SessionToken {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    pub fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl CredentialSource for SessionToken {
    fn token(&self) -> Option<String> {
        let guard = self.token.read().unwrap_or_else(PoisonError::into_inner);
        non_empty(guard.as_deref())
    }
}

/// Token stored in a file, re-read on every lookup. A missing or blank file
/// means "not authenticated".
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialSource for TokenFile {
    fn token(&self) -> Option<String> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => non_empty(Some(&contents)),
            Err(e) => {
                log::debug!("token file {} unreadable: {}", self.path.display(), e);
                None
            }
        }
    }
}

fn non_empty(token: Option<&str>) -> Option<String> {
    token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
