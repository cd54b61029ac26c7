// ABOUTME: SSH client handle using russh.
// ABOUTME: Handles connection, authentication, and streamed command execution.

use super::credentials::{self, AuthMethod};
use super::error::{Error, Result};
use super::handler::SshHandler;
use super::session::{ChannelSession, SessionFactory};
use super::stream;
use crate::config::ConnectionConfig;
use async_trait::async_trait;
use russh::client::{self, Config, Handle};
use russh::keys::PrivateKeyWithHashAlg;
use russh::Disconnect;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWrite;

/// Render `host:port`, bracketing IPv6 literals.
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// An established, authenticated SSH connection.
///
/// Each command runs on its own channel, so one client can serve any
/// number of sequential or concurrent runs.
pub struct Client {
    config: ConnectionConfig,
    handle: Handle<SshHandler>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("handle", &"<russh::Handle>")
            .finish()
    }
}

impl Client {
    /// Resolve credentials and connect to the configured host.
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        let auth_method = credentials::resolve(&config)?;
        Self::connect_with(config, auth_method).await
    }

    /// Connect using an already resolved authentication method.
    pub async fn connect_with(config: ConnectionConfig, auth_method: AuthMethod) -> Result<Self> {
        let address = join_host_port(&config.host, config.port);

        // Commands may stay silent for long stretches; keepalives detect a
        // dead peer instead of an inactivity timeout.
        let russh_config = Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(15)),
            ..Default::default()
        };

        let handler = SshHandler::new(
            config.host.clone(),
            config.port,
            config.host_key_policy.clone(),
            config.known_hosts_path.clone(),
        );

        tracing::debug!("connecting to {} as {}", address, config.user);
        let mut handle = client::connect(
            Arc::new(russh_config),
            (config.host.as_str(), config.port),
            handler,
        )
        .await
        .map_err(|e| match e {
            russh::Error::UnknownKey => {
                Error::Connection(format!("host key for {} was rejected", address))
            }
            e if e.to_string().contains("Connection refused") => {
                Error::Connection(format!("connection refused to {}", address))
            }
            e => Error::Connection(format!("{}: {}", address, e)),
        })?;

        if !Self::authenticate(&mut handle, &config.user, auth_method).await? {
            return Err(Error::AuthenticationFailed { user: config.user });
        }
        tracing::debug!("authenticated to {} as {}", address, config.user);

        Ok(Self { config, handle })
    }

    async fn authenticate(
        handle: &mut Handle<SshHandler>,
        user: &str,
        auth_method: AuthMethod,
    ) -> Result<bool> {
        let result = match auth_method {
            AuthMethod::PublicKey(key) => {
                let hash_alg = handle
                    .best_supported_rsa_hash()
                    .await
                    .map_err(Error::Protocol)?
                    .flatten();

                handle
                    .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key, hash_alg))
                    .await
                    .map_err(Error::Protocol)?
            }
            AuthMethod::Password(password) => handle
                .authenticate_password(user, password)
                .await
                .map_err(Error::Protocol)?,
        };

        Ok(result.success())
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Run a command, streaming its stdout line by line into `sink`.
    ///
    /// Uses the configured command timeout, if any.
    pub async fn run<W>(&self, command: &str, sink: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        match self.config.command_timeout {
            Some(limit) => stream::run_with_timeout(self, command, sink, limit).await,
            None => stream::run(self, command, sink).await,
        }
    }

    /// Run a command with a custom timeout.
    pub async fn run_with_timeout<W>(
        &self,
        command: &str,
        sink: &mut W,
        timeout: Duration,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        stream::run_with_timeout(self, command, sink, timeout).await
    }

    /// Disconnect the session.
    pub async fn disconnect(self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(Error::Protocol)?;
        Ok(())
    }
}

#[async_trait]
impl SessionFactory for Client {
    type Session = ChannelSession;

    async fn new_session(&self) -> Result<ChannelSession> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::SessionOpen(e.to_string()))?;
        Ok(ChannelSession::new(channel))
    }
}
