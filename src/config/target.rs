// ABOUTME: Command-line SSH targets.
// ABOUTME: Parses formats like "host", "user@host", "host:port", "user@[::1]:port".

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
}

impl Target {
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("target cannot be empty".to_string());
        }

        let (user, rest) = match s.rsplit_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
            Some(_) => return Err("user cannot be empty".to_string()),
            None => (None, s),
        };

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            // [v6-literal] or [v6-literal]:port
            let (host, after) = bracketed
                .split_once(']')
                .ok_or_else(|| format!("unterminated '[' in {}", rest))?;
            let port = match after {
                "" => None,
                p => Some(parse_port(p.strip_prefix(':').ok_or_else(|| {
                    format!("unexpected characters after ']': {}", after)
                })?)?),
            };
            (host, port)
        } else if rest.matches(':').count() > 1 {
            // Bare IPv6 literal, no port.
            (rest, None)
        } else if let Some((host, port)) = rest.split_once(':') {
            (host, Some(parse_port(port)?))
        } else {
            (rest, None)
        };

        if host.is_empty() {
            return Err("hostname cannot be empty".to_string());
        }

        Ok(Target {
            user,
            host: host.to_string(),
            port,
        })
    }
}

fn parse_port(s: &str) -> Result<u16, String> {
    s.parse::<u16>().map_err(|_| format!("invalid port: {}", s))
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        match self.port {
            Some(port) => f.write_str(&crate::ssh::join_host_port(&self.host, port)),
            None => f.write_str(&self.host),
        }
    }
}
