// ABOUTME: Credential resolution for SSH connections.
// ABOUTME: Picks private key or password authentication from a ConnectionConfig.

use super::error::{Error, Result};
use crate::config::ConnectionConfig;
use russh::keys::{load_secret_key, ssh_key};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Authentication method resolved from config.
#[derive(Clone)]
pub enum AuthMethod {
    PublicKey(Arc<ssh_key::PrivateKey>),
    Password(String),
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::PublicKey(key) => f
                .debug_tuple("PublicKey")
                .field(&key.algorithm().as_str())
                .finish(),
            AuthMethod::Password(_) => f.write_str("Password(<redacted>)"),
        }
    }
}

/// Resolve which authentication method to use.
///
/// A configured private key takes precedence over a password. Nothing is
/// read from disk unless a key path is set.
pub fn resolve(config: &ConnectionConfig) -> Result<AuthMethod> {
    if let Some(key_path) = config.effective_key_path() {
        if config.effective_password().is_some() {
            tracing::warn!(
                "both a private key and a password are configured for {}; using the key",
                config.host
            );
        }
        let path = expand_home(key_path)?;
        let key = load_secret_key(&path, None).map_err(|e| Error::KeyLoadFailed {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        tracing::debug!("loaded {} key from {}", key.algorithm().as_str(), path.display());
        return Ok(AuthMethod::PublicKey(Arc::new(key)));
    }

    if let Some(password) = config.effective_password() {
        return Ok(AuthMethod::Password(password.to_string()));
    }

    Err(Error::MissingCredentials)
}

/// Expand a leading `~` to the current user's home directory.
pub fn expand_home(path: &Path) -> Result<PathBuf> {
    let Ok(rest) = path.strip_prefix("~") else {
        return Ok(path.to_path_buf());
    };
    let home = dirs::home_dir().ok_or_else(|| Error::HomeDirUnavailable(path.to_path_buf()))?;
    if rest.as_os_str().is_empty() {
        Ok(home)
    } else {
        Ok(home.join(rest))
    }
}
