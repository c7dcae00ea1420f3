use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct SessionState {
    token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    redirect_path: Option<String>,
}

/// Bearer token plus the path to return to after login.
///
/// Expiry is enforced on read: an expired token is simply reported as absent.
#[derive(Debug)]
pub struct SessionStore {
    path: Option<PathBuf>,
    state: SessionState,
}

impl SessionStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: SessionState::default(),
        }
    }

    /// Opens the session file, starting empty if it is missing or corrupt.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text).unwrap_or_else(|e| {
                log::warn!("Discarding unreadable session file {}: {e}", path.display());
                SessionState::default()
            }),
            Err(_) => SessionState::default(),
        };
        Self {
            path: Some(path),
            state,
        }
    }

    pub fn open_default() -> Self {
        match crate::config::project_dirs() {
            Some(dirs) => Self::open(dirs.data_dir().join("session.toml")),
            None => {
                log::warn!("No data dir available, session will not persist");
                Self::in_memory()
            }
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token_at(Utc::now())
    }

    pub fn token_at(&self, now: DateTime<Utc>) -> Option<&str> {
        match self.state.expires_at {
            Some(expires) if expires <= now => None,
            _ => self.state.token.as_deref(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    /// Returns the token or `Error::Unauthenticated`.
    pub fn require_token(&self) -> Result<String> {
        self.token().map(str::to_string).ok_or(Error::Unauthenticated)
    }

    pub fn set_token(&mut self, token: impl Into<String>, ttl: Duration) -> Result<()> {
        self.state.token = Some(token.into());
        self.state.expires_at = Some(Utc::now() + ttl);
        self.persist()
    }

    pub fn clear(&mut self) -> Result<()> {
        self.state.token = None;
        self.state.expires_at = None;
        self.persist()
    }

    pub fn remember_redirect(&mut self, path: &str) -> Result<()> {
        self.state.redirect_path = Some(path.to_string());
        self.persist()
    }

    /// Hands out the remembered path once.
    pub fn take_redirect(&mut self) -> Result<Option<String>> {
        let path = self.state.redirect_path.take();
        if path.is_some() {
            self.persist()?;
        }
        Ok(path)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(&self.state).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }
}
