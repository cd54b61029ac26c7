// ABOUTME: Entry point for the sshrun CLI application.
// ABOUTME: Parses arguments, sets up logging, and dispatches to the SSH executors.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use sshrun::config::{ConnectionConfig, HostsFile, default_user};
use sshrun::error::{Error, Result};
use sshrun::output::{Output, OutputMode};
use sshrun::ssh::{Client, LocalSsh, join_host_port};
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mut output = Output::new(OutputMode::from_flags(cli.quiet, cli.json));

    if let Err(e) = run(cli.command, &mut output).await {
        output.error(&e.to_string());
        std::process::exit(e.exit_code());
    }
}

async fn run(command: Commands, output: &mut Output) -> Result<()> {
    match command {
        Commands::Run {
            target,
            config,
            identity,
            password_env,
            host_key,
            known_hosts,
            timeout,
            command,
        } => {
            let hosts = load_hosts(config.as_deref())?;
            let mut conn = hosts.resolve_target(&target)?;

            if let Some(path) = identity {
                conn = conn.private_key_path(path);
            }
            if let Some(var) = password_env {
                let password = std::env::var(&var).map_err(|_| Error::MissingEnvVar(var))?;
                conn = conn.password(password);
            }
            if let Some(policy) = host_key {
                conn = conn.host_key_policy(policy);
            }
            if let Some(path) = known_hosts {
                conn = conn.known_hosts_path(path);
            }
            if let Some(limit) = timeout {
                conn = conn.command_timeout(limit);
            }

            run_remote(conn, &command.join(" "), output).await
        }
        Commands::Local {
            host,
            ssh,
            timeout,
            command,
        } => {
            let mut local = LocalSsh::new(host).program(ssh);
            if let Some(limit) = timeout {
                local = local.command_timeout(limit);
            }
            run_local(&local, &command.join(" "), output).await
        }
        Commands::Hosts { config } => {
            let hosts = match config {
                Some(path) => HostsFile::load(&path)?,
                None => HostsFile::discover(&std::env::current_dir()?)?,
            };
            for (name, entry) in &hosts.hosts {
                let user = entry.user.clone().unwrap_or_else(default_user);
                println!(
                    "{}\t{}@{}\t{}",
                    name,
                    user,
                    join_host_port(&entry.host, entry.port),
                    entry.host_key
                );
            }
            Ok(())
        }
    }
}

/// Load an explicit hosts file, or discover one; none at all is fine.
fn load_hosts(path: Option<&Path>) -> Result<HostsFile> {
    if let Some(path) = path {
        return HostsFile::load(path);
    }
    match HostsFile::discover(&std::env::current_dir()?) {
        Ok(hosts) => Ok(hosts),
        Err(Error::ConfigNotFound(_)) => Ok(HostsFile::default()),
        Err(e) => Err(e),
    }
}

/// Run a command on one host over a built-in SSH session.
async fn run_remote(config: ConnectionConfig, command: &str, output: &mut Output) -> Result<()> {
    let address = join_host_port(&config.host, config.port);
    output.progress(&format!("→ Connecting to {}...", address));

    let client = Client::connect(config).await?;

    output.start_timer();
    let mut stdout = tokio::io::stdout();
    let result = client.run(command, &mut stdout).await;

    // Disconnect failures don't change the command's outcome
    if let Err(e) = client.disconnect().await {
        tracing::warn!("SSH disconnect failed for {}: {}", address, e);
    }

    result?;
    output.success(&format!("✓ Command finished on {}", address));
    Ok(())
}

/// Run a command through the system ssh client.
async fn run_local(local: &LocalSsh, command: &str, output: &mut Output) -> Result<()> {
    output.start_timer();
    let mut stdout = tokio::io::stdout();
    local.run(command, &mut stdout).await?;
    output.success(&format!("✓ Command finished on {}", local.host()));
    Ok(())
}
