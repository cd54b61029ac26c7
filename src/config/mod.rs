// ABOUTME: Connection configuration and the sshrun.yml hosts file.
// ABOUTME: Handles YAML parsing, secret resolution, and command-line target overrides.

mod host_key;
mod secret;
mod target;

pub use host_key::HostKeyPolicy;
pub use secret::SecretValue;
pub use target::Target;

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "sshrun.yml";
pub const CONFIG_FILENAME_ALT: &str = "sshrun.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".sshrun/config.yml";

pub const DEFAULT_PORT: u16 = 22;

/// Everything needed to reach and authenticate against one host.
///
/// Exactly one of `private_key_path` and `password` is expected to be set.
/// When both are, the private key wins.
#[derive(Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub private_key_path: Option<PathBuf>,
    pub password: Option<String>,
    pub host_key_policy: HostKeyPolicy,
    /// If None, uses the default ~/.ssh/known_hosts.
    pub known_hosts_path: Option<PathBuf>,
    /// Upper bound for a single command, None for no limit.
    pub command_timeout: Option<Duration>,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            user: user.into(),
            private_key_path: None,
            password: None,
            host_key_policy: HostKeyPolicy::default(),
            known_hosts_path: None,
            command_timeout: None,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn private_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// The key path, unless unset or empty.
    pub fn effective_key_path(&self) -> Option<&Path> {
        self.private_key_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// The password, unless unset or empty.
    pub fn effective_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("private_key_path", &self.private_key_path)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("host_key_policy", &self.host_key_policy)
            .field("known_hosts_path", &self.known_hosts_path)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

/// Login name used when neither the target nor the hosts file names one.
pub fn default_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "root".to_string())
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostEntry {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub private_key: Option<PathBuf>,
    #[serde(default)]
    pub password: Option<SecretValue>,
    #[serde(default)]
    pub host_key: HostKeyPolicy,
    #[serde(default)]
    pub known_hosts: Option<PathBuf>,
    #[serde(default, with = "humantime_serde")]
    pub command_timeout: Option<Duration>,
}

impl HostEntry {
    /// Build a connection config, resolving env-backed secrets.
    pub fn to_connection_config(&self) -> Result<ConnectionConfig> {
        let password = self.password.as_ref().map(SecretValue::resolve).transpose()?;

        Ok(ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone().unwrap_or_else(default_user),
            private_key_path: self.private_key.clone(),
            password,
            host_key_policy: self.host_key.clone(),
            known_hosts_path: self.known_hosts.clone(),
            command_timeout: self.command_timeout,
        })
    }
}

/// Named hosts loaded from sshrun.yml.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostsFile {
    #[serde(default)]
    pub hosts: BTreeMap<String, HostEntry>,
}

impl HostsFile {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                tracing::debug!("loading hosts from {}", path.display());
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    pub fn entry(&self, name: &str) -> Result<&HostEntry> {
        self.hosts
            .get(name)
            .ok_or_else(|| Error::UnknownHost(name.to_string()))
    }

    /// Connection config for a named host, or for an ad-hoc target.
    ///
    /// A target that matches a host name uses that entry; otherwise it is
    /// parsed as `[user@]host[:port]` with default settings.
    pub fn resolve_target(&self, target: &str) -> Result<ConnectionConfig> {
        if let Some(entry) = self.hosts.get(target) {
            return entry.to_connection_config();
        }

        let parsed = Target::parse(target).map_err(Error::InvalidTarget)?;
        Ok(ConnectionConfig::new(
            parsed.host,
            parsed.user.unwrap_or_else(default_user),
        )
        .port(parsed.port.unwrap_or(DEFAULT_PORT)))
    }
}
