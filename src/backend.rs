use std::fmt;
use std::str::FromStr;

use log::warn;

use crate::error::BalancerError;

/// A server clients may be redirected to. Two backends are the same server
/// when host and port match.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Backend {
    pub host: String,
    pub port: u16,
}

impl Backend {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Backend {
            host: host.into(),
            port,
        }
    }

    /// Absolute URL of `path` on this backend. `path` must already have its
    /// leading slashes removed.
    pub fn url_for(&self, path: &str) -> String {
        format!("http://{}:{}/{}", self.host, self.port, path)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Backend {
    type Err = BalancerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 2 || parts[0].is_empty() {
            return Err(BalancerError::InvalidBackend(s.to_string()));
        }

        match parts[1].parse::<u16>() {
            Ok(port) if port != 0 => Ok(Backend::new(parts[0], port)),
            _ => Err(BalancerError::InvalidBackend(s.to_string())),
        }
    }
}

/// Parses `host:port` tokens, dropping malformed ones with a warning.
pub fn parse_backends<I, S>(args: I) -> Vec<Backend>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut backends = Vec::new();
    for arg in args {
        match arg.as_ref().parse::<Backend>() {
            Ok(backend) => backends.push(backend),
            Err(e) => {
                warn!("⚠️ {} (expected host:port), it will not be added to the pool", e);
            }
        }
    }
    backends
}
