//! Session credentials for the usage endpoint.
//!
//! Credentials are a session key plus the organization whose usage is
//! polled. They are kept in a plain JSON file with owner-only permissions;
//! environment variables take precedence so containers and CI can inject
//! them without touching disk.

use crate::error::{Result, SyncError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Every valid session key starts with this prefix.
pub const SESSION_KEY_PREFIX: &str = "sk-ant-";

/// Shortest session key accepted by [`validate_session_key`].
pub const MIN_SESSION_KEY_LEN: usize = 40;

/// Environment override for the session key.
pub const SESSION_KEY_ENV: &str = "USAGE_SYNC_SESSION_KEY";

/// Environment override for the organization ID.
pub const ORG_ID_ENV: &str = "USAGE_SYNC_ORG_ID";

/// Session key and selected organization.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredentials {
    pub session_key: String,
    pub org_id: String,
}

impl SessionCredentials {
    pub fn new(session_key: impl Into<String>, org_id: impl Into<String>) -> Self {
        Self {
            session_key: session_key.into(),
            org_id: org_id.into(),
        }
    }

    /// `Cookie` header value carrying the session key.
    #[must_use]
    pub fn cookie(&self) -> String {
        session_cookie(&self.session_key)
    }
}

impl std::fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("session_key", &mask_key(&self.session_key))
            .field("org_id", &self.org_id)
            .finish()
    }
}

/// Format a session key as a `Cookie` header value.
#[must_use]
pub fn session_cookie(session_key: &str) -> String {
    format!("sessionKey={session_key}")
}

/// Why a session key was rejected before contacting the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum KeyValidationError {
    #[error("Session key is empty")]
    Empty,
    #[error("Key must start with {SESSION_KEY_PREFIX}")]
    MissingPrefix,
    #[error("Key appears too short")]
    TooShort,
}

/// Local format check for a session key.
pub fn validate_session_key(key: &str) -> std::result::Result<(), KeyValidationError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(KeyValidationError::Empty);
    }
    if !key.starts_with(SESSION_KEY_PREFIX) {
        return Err(KeyValidationError::MissingPrefix);
    }
    if key.chars().count() < MIN_SESSION_KEY_LEN {
        return Err(KeyValidationError::TooShort);
    }
    Ok(())
}

/// Mask a key for display, keeping the first 7 and last 4 characters.
#[must_use]
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_owned();
    }
    let head: String = chars.iter().take(7).collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    let hidden = chars.len().saturating_sub(11).max(1);
    format!("{head}{}{tail}", "*".repeat(hidden))
}

/// Where the fetcher and the service read and write credentials.
pub trait CredentialStore: Send + Sync {
    /// Currently configured credentials, if complete.
    fn load(&self) -> Option<SessionCredentials>;

    /// Replace stored credentials.
    fn save(&self, credentials: &SessionCredentials) -> Result<()>;

    /// Forget stored credentials.
    fn clear(&self) -> Result<()>;
}

/// Credentials held in memory only.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<Option<SessionCredentials>>,
}

impl MemoryCredentialStore {
    pub fn new(credentials: Option<SessionCredentials>) -> Self {
        Self {
            inner: RwLock::new(credentials),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Option<SessionCredentials> {
        self.inner.read().clone()
    }

    fn save(&self, credentials: &SessionCredentials) -> Result<()> {
        *self.inner.write() = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.inner.write() = None;
        Ok(())
    }
}

/// JSON file backed credentials with environment override.
pub struct FileCredentialStore {
    path: PathBuf,
    use_env: bool,
}

impl FileCredentialStore {
    /// Store bound to `path`. Environment overrides are honored.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            use_env: true,
        }
    }

    /// Ignore [`SESSION_KEY_ENV`] / [`ORG_ID_ENV`].
    #[must_use]
    pub fn without_env_override(mut self) -> Self {
        self.use_env = false;
        self
    }

    /// Store at the default location (`config_dir()/credentials.json`).
    pub fn default_location() -> Self {
        Self::new(crate::app_dirs::credentials_file())
    }

    fn from_env() -> Option<SessionCredentials> {
        let key = std::env::var(SESSION_KEY_ENV).ok()?;
        let org = std::env::var(ORG_ID_ENV).ok()?;
        if key.trim().is_empty() || org.trim().is_empty() {
            return None;
        }
        Some(SessionCredentials::new(key.trim(), org.trim()))
    }

    fn read_file(&self) -> Option<SessionCredentials> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("cannot read credentials at {}: {e}", self.path.display());
                return None;
            }
        };
        match serde_json::from_slice::<SessionCredentials>(&bytes) {
            Ok(creds) if !creds.session_key.is_empty() && !creds.org_id.is_empty() => Some(creds),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(
                    "ignoring malformed credentials file at {}: {e}",
                    self.path.display()
                );
                None
            }
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Option<SessionCredentials> {
        if self.use_env {
            if let Some(creds) = Self::from_env() {
                return Some(creds);
            }
        }
        self.read_file()
    }

    fn save(&self, credentials: &SessionCredentials) -> Result<()> {
        let json = serde_json::to_vec_pretty(credentials)?;
        crate::store::write_atomic(&self.path, &json)
            .map_err(|e| SyncError::Credentials(format!("cannot save credentials: {e}")))?;
        restrict_permissions(&self.path);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::Credentials(format!(
                "cannot delete credentials at {}: {e}",
                self.path.display()
            ))),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        tracing::warn!("cannot restrict permissions on {}: {e}", path.display());
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &std::path::Path) {}
