// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines the run, local, and hosts subcommands and their arguments.

use clap::{Parser, Subcommand};
use sshrun::config::HostKeyPolicy;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "sshrun")]
#[command(about = "Run a command over SSH and stream its output line by line")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only report errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Report status as JSON lines on stderr
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a command through a built-in SSH session
    Run {
        /// Host name from the hosts file, or [user@]host[:port]
        target: String,

        /// Hosts file (default: sshrun.yml in the current directory)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Private key file
        #[arg(short, long)]
        identity: Option<PathBuf>,

        /// Read the password from this environment variable
        #[arg(long, value_name = "VAR")]
        password_env: Option<String>,

        /// Host key policy: known_hosts, trust_first_use, accept_any, or SHA256:<fingerprint>
        #[arg(long, value_name = "POLICY")]
        host_key: Option<HostKeyPolicy>,

        /// known_hosts file (default: ~/.ssh/known_hosts)
        #[arg(long)]
        known_hosts: Option<PathBuf>,

        /// Give up after this long, e.g. 30s or 5m
        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,

        /// Command to run
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Run a command through the system ssh client
    Local {
        /// Destination passed to ssh
        host: String,

        /// ssh executable to use
        #[arg(long, default_value = "ssh")]
        ssh: String,

        /// Give up after this long, e.g. 30s or 5m
        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,

        /// Command to run
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// List hosts defined in the hosts file
    Hosts {
        /// Hosts file (default: sshrun.yml in the current directory)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(s).map_err(|e| e.to_string())
}
