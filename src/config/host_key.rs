// ABOUTME: Host key verification policy for SSH connections.
// ABOUTME: Strict known_hosts checking by default; accepting any key is an explicit opt-in.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// How the server's host key is verified during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum HostKeyPolicy {
    /// Require the key to be present in known_hosts.
    #[default]
    KnownHosts,
    /// Accept and record unknown hosts; reject changed keys.
    TrustOnFirstUse,
    /// Require the key to match a pinned SHA256 fingerprint ("SHA256:...").
    Fingerprint(String),
    /// Accept any host key. Insecure.
    AcceptAny,
}

impl FromStr for HostKeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "known_hosts" | "strict" => Ok(Self::KnownHosts),
            "trust_first_use" | "tofu" => Ok(Self::TrustOnFirstUse),
            "accept_any" | "insecure" => Ok(Self::AcceptAny),
            _ if s.starts_with("SHA256:") && s.len() > "SHA256:".len() => {
                Ok(Self::Fingerprint(s.to_string()))
            }
            _ => Err(format!(
                "unknown host key policy '{}' (expected known_hosts, trust_first_use, accept_any or SHA256:<fingerprint>)",
                s
            )),
        }
    }
}

impl TryFrom<String> for HostKeyPolicy {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for HostKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KnownHosts => f.write_str("known_hosts"),
            Self::TrustOnFirstUse => f.write_str("trust_first_use"),
            Self::Fingerprint(fp) => f.write_str(fp),
            Self::AcceptAny => f.write_str("accept_any"),
        }
    }
}
