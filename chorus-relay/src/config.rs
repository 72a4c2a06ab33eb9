use std::net::SocketAddr;
use tracing::warn;

pub const DEFAULT_RELAY_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
        }
    }
}

impl RelayConfig {
    /// Defaults overridden by `CHORUS_RELAY_ADDR`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup("CHORUS_RELAY_ADDR") {
            match raw.trim().parse() {
                Ok(addr) => config.bind_addr = addr,
                Err(e) => warn!("Ignoring CHORUS_RELAY_ADDR={:?}: {}", raw, e),
            }
        }
        config
    }
}
