// ABOUTME: russh client handler applying the configured host key policy.
// ABOUTME: Supports known_hosts, trust-on-first-use, pinned fingerprints, and an insecure opt-out.

use crate::config::HostKeyPolicy;
use russh::client;
use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::ssh_key::{self, HashAlg};
use std::path::PathBuf;

/// SSH client handler for russh.
pub(crate) struct SshHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    known_hosts_path: Option<PathBuf>,
}

impl SshHandler {
    pub(crate) fn new(
        host: String,
        port: u16,
        policy: HostKeyPolicy,
        known_hosts_path: Option<PathBuf>,
    ) -> Self {
        Self {
            host,
            port,
            policy,
            known_hosts_path,
        }
    }

    fn check(&self, key: &ssh_key::PublicKey) -> Result<bool, russh::keys::Error> {
        match &self.known_hosts_path {
            Some(path) => check_known_hosts_path(&self.host, self.port, key, path),
            None => check_known_hosts(&self.host, self.port, key),
        }
    }

    fn learn(&self, key: &ssh_key::PublicKey) {
        let result = match &self.known_hosts_path {
            Some(path) => learn_known_hosts_path(&self.host, self.port, key, path),
            None => learn_known_hosts(&self.host, self.port, key),
        };
        if let Err(e) = result {
            tracing::warn!("Failed to save host key to known_hosts: {}", e);
        }
    }

    /// Decide whether the server's key is acceptable.
    pub(crate) fn verify(&self, key: &ssh_key::PublicKey) -> bool {
        match &self.policy {
            HostKeyPolicy::AcceptAny => {
                tracing::warn!(
                    "host key verification disabled: accepting {} key for {}:{} unchecked",
                    key.algorithm().as_str(),
                    self.host,
                    self.port
                );
                true
            }
            HostKeyPolicy::Fingerprint(expected) => {
                let actual = key.fingerprint(HashAlg::Sha256).to_string();
                if actual == *expected {
                    true
                } else {
                    tracing::warn!(
                        "host key fingerprint mismatch for {}:{}: expected {}, got {}",
                        self.host,
                        self.port,
                        expected,
                        actual
                    );
                    false
                }
            }
            HostKeyPolicy::KnownHosts => match self.check(key) {
                Ok(true) => true,
                Ok(false) => {
                    tracing::warn!(
                        "host key for {}:{} is not in known_hosts",
                        self.host,
                        self.port
                    );
                    false
                }
                Err(e) => {
                    tracing::warn!("known_hosts check failed for {}: {}", self.host, e);
                    false
                }
            },
            HostKeyPolicy::TrustOnFirstUse => match self.check(key) {
                Ok(true) => true,
                Ok(false) => {
                    tracing::warn!(
                        "Trust-On-First-Use: accepting unknown host key for {}:{}",
                        self.host,
                        self.port
                    );
                    self.learn(key);
                    true
                }
                Err(russh::keys::Error::KeyChanged { .. }) => {
                    tracing::warn!(
                        "host key for {}:{} does not match known_hosts",
                        self.host,
                        self.port
                    );
                    false
                }
                // Unreadable known_hosts: treat as unknown host
                Err(_) => true,
            },
        }
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(self.verify(server_public_key))
    }
}
