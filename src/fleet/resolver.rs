//! Hostname resolution for STUN targets.

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::str::FromStr;
use thiserror::Error;

/// Default STUN port.
pub const DEFAULT_STUN_PORT: u16 = 3478;

/// A configured `host[:port]` to be resolved every reconciliation round.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StunTarget {
    pub host: String,
    pub port: u16,
}

impl StunTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for StunTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetParseError {
    #[error("empty STUN server entry")]
    Empty,

    #[error("invalid port in STUN server entry '{0}'")]
    InvalidPort(String),
}

impl FromStr for StunTarget {
    type Err = TargetParseError;

    /// Accepts `host`, `host:port`, `[v6]`, `[v6]:port` and bare IPv6 literals.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TargetParseError::Empty);
        }

        let parse_port = |p: &str| {
            p.parse::<u16>()
                .map_err(|_| TargetParseError::InvalidPort(s.to_string()))
        };

        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| TargetParseError::InvalidPort(s.to_string()))?;
            let port = match tail.strip_prefix(':') {
                Some(p) => parse_port(p)?,
                None if tail.is_empty() => DEFAULT_STUN_PORT,
                None => return Err(TargetParseError::InvalidPort(s.to_string())),
            };
            if host.is_empty() {
                return Err(TargetParseError::Empty);
            }
            return Ok(Self::new(host, port));
        }

        match s.split_once(':') {
            // More than one colon without brackets: a bare IPv6 literal.
            Some((_, rest)) if rest.contains(':') => Ok(Self::new(s, DEFAULT_STUN_PORT)),
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(TargetParseError::Empty);
                }
                Ok(Self::new(host, parse_port(port)?))
            }
            None => Ok(Self::new(s, DEFAULT_STUN_PORT)),
        }
    }
}

/// Parse a comma separated server list, skipping blank entries.
pub fn parse_targets(list: &str) -> Result<Vec<StunTarget>, TargetParseError> {
    list.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(str::parse)
        .collect()
}

/// Resolves a target to the endpoints that should be probed.
pub trait Resolver: Send + Sync + 'static {
    fn resolve(&self, target: &StunTarget)
        -> impl Future<Output = io::Result<Vec<SocketAddr>>> + Send;
}

/// System DNS via `tokio::net::lookup_host`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsResolver;

impl Resolver for DnsResolver {
    async fn resolve(&self, target: &StunTarget) -> io::Result<Vec<SocketAddr>> {
        let addrs = tokio::net::lookup_host((target.host.as_str(), target.port)).await?;
        Ok(addrs.collect())
    }
}
