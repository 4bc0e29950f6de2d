//! Relay configuration.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ServerError;

/// Default maximum session lifetime: 1 hour.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// Default interval between expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Default bound on queued outbound messages per connection.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Default cap on simultaneous connections from one IP.
pub const DEFAULT_MAX_CONN_PER_IP: usize = 16;

/// Default cap on one inbound websocket message (16 MiB).
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// What happens to a session after a successful fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPolicy {
    /// First fetch consumes the session; the code stops resolving.
    #[default]
    SingleUse,
    /// Fetches keep returning the same files until the TTL reclaims them.
    Repeatable,
}

impl FromStr for FetchPolicy {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single-use" | "single" | "once" => Ok(Self::SingleUse),
            "repeatable" | "repeat" => Ok(Self::Repeatable),
            other => Err(ServerError::Config(format!("unknown fetch policy '{other}'"))),
        }
    }
}

/// Runtime settings for the relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the binary listens on.
    pub bind_addr: SocketAddr,
    /// Maximum lifetime of a session, regardless of state.
    pub session_ttl: Duration,
    /// How often the expiry sweep runs.
    pub sweep_interval: Duration,
    /// Outbound queue depth per connection.
    pub queue_depth: usize,
    /// Simultaneous connections accepted from one IP.
    pub max_connections_per_ip: usize,
    /// Largest inbound websocket message accepted.
    pub max_message_bytes: usize,
    /// Fetch policy.
    pub fetch_policy: FetchPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            session_ttl: DEFAULT_SESSION_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            max_connections_per_ip: DEFAULT_MAX_CONN_PER_IP,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            fetch_policy: FetchPolicy::SingleUse,
        }
    }
}

impl RelayConfig {
    /// Defaults overridden by `CODEDROP_*` environment variables.
    ///
    /// Recognized: `CODEDROP_BIND`, `CODEDROP_TTL_SECS`, `CODEDROP_SWEEP_SECS`,
    /// `CODEDROP_FETCH_POLICY`.
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServerError> {
        let mut config = Self::default();

        if let Some(bind) = lookup("CODEDROP_BIND") {
            config.bind_addr = bind
                .parse()
                .map_err(|_| ServerError::Config(format!("invalid CODEDROP_BIND '{bind}'")))?;
        }
        if let Some(ttl) = lookup("CODEDROP_TTL_SECS") {
            config.session_ttl = parse_secs("CODEDROP_TTL_SECS", &ttl)?;
        }
        if let Some(sweep) = lookup("CODEDROP_SWEEP_SECS") {
            config.sweep_interval = parse_secs("CODEDROP_SWEEP_SECS", &sweep)?;
        }
        if let Some(policy) = lookup("CODEDROP_FETCH_POLICY") {
            config.fetch_policy = policy.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the relay cannot run with.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.session_ttl.is_zero() {
            return Err(ServerError::Config("session ttl must be > 0".into()));
        }
        if self.sweep_interval.is_zero() {
            return Err(ServerError::Config("sweep interval must be > 0".into()));
        }
        if self.queue_depth == 0 {
            return Err(ServerError::Config("queue depth must be >= 1".into()));
        }
        if self.max_connections_per_ip == 0 {
            return Err(ServerError::Config("max connections per ip must be >= 1".into()));
        }
        Ok(())
    }

    /// Set the session TTL.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Set the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the fetch policy.
    pub fn with_fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch_policy = policy;
        self
    }

    /// Set the bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<Duration, ServerError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ServerError::Config(format!("invalid {key} '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RelayConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.session_ttl, DEFAULT_SESSION_TTL);
        assert_eq!(config.fetch_policy, FetchPolicy::SingleUse);
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[test]
    fn test_env_overrides() {
        let config = RelayConfig::from_lookup(lookup(&[
            ("CODEDROP_BIND", "127.0.0.1:9000"),
            ("CODEDROP_TTL_SECS", "2"),
            ("CODEDROP_SWEEP_SECS", "1"),
            ("CODEDROP_FETCH_POLICY", "Repeatable"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.session_ttl, Duration::from_secs(2));
        assert_eq!(config.sweep_interval, Duration::from_secs(1));
        assert_eq!(config.fetch_policy, FetchPolicy::Repeatable);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(RelayConfig::from_lookup(lookup(&[("CODEDROP_TTL_SECS", "soon")])).is_err());
        assert!(RelayConfig::from_lookup(lookup(&[("CODEDROP_TTL_SECS", "0")])).is_err());
        assert!(RelayConfig::from_lookup(lookup(&[("CODEDROP_FETCH_POLICY", "twice")])).is_err());
        assert!(RelayConfig::from_lookup(lookup(&[("CODEDROP_BIND", "nowhere")])).is_err());
    }
}
