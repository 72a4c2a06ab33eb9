use chorus_core::IceServerConfig;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Tunables of a voice mesh session.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    pub ice_servers: Vec<IceServerConfig>,
    /// Upper bound for a peer to go from `New` to `Connected`.
    pub negotiation_timeout: Duration,
    /// Fixed delay between a peer failing and the next attempt.
    pub retry_backoff: Duration,
    /// Consecutive failures after which a peer is reported unreachable. `None` retries forever.
    pub max_retry_attempts: Option<u32>,
    /// Period of the supervision and reconciliation pass.
    pub tick_interval: Duration,
    pub publish_attempts: u32,
    pub publish_retry_delay: Duration,
    /// How long a leave waits for queued signals to drain.
    pub publish_flush_timeout: Duration,
    pub event_capacity: usize,
    pub include_loopback_candidates: bool,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServerConfig {
                urls: vec!["stun:stun.l.google.com:19302".to_owned()],
                username: None,
                credential: None,
            }],
            negotiation_timeout: Duration::from_secs(20),
            retry_backoff: Duration::from_secs(3),
            max_retry_attempts: Some(3),
            tick_interval: Duration::from_millis(500),
            publish_attempts: 3,
            publish_retry_delay: Duration::from_millis(200),
            publish_flush_timeout: Duration::from_secs(2),
            event_capacity: 256,
            include_loopback_candidates: false,
        }
    }
}

impl MeshConfig {
    /// Defaults overridden by `CHORUS_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(urls) = lookup("CHORUS_ICE_SERVERS") {
            let urls: Vec<String> = urls
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_owned)
                .collect();
            config.ice_servers = if urls.is_empty() {
                Vec::new()
            } else {
                vec![IceServerConfig {
                    urls,
                    username: lookup("CHORUS_ICE_USERNAME"),
                    credential: lookup("CHORUS_ICE_CREDENTIAL"),
                }]
            };
        }

        if let Some(ms) = parse::<u64>(&lookup, "CHORUS_NEGOTIATION_TIMEOUT_MS") {
            config.negotiation_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64>(&lookup, "CHORUS_RETRY_BACKOFF_MS") {
            config.retry_backoff = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse::<u32>(&lookup, "CHORUS_MAX_RETRY_ATTEMPTS") {
            config.max_retry_attempts = (attempts > 0).then_some(attempts);
        }
        if let Some(ms) = parse::<u64>(&lookup, "CHORUS_TICK_INTERVAL_MS") {
            config.tick_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(include) = parse::<bool>(&lookup, "CHORUS_INCLUDE_LOOPBACK") {
            config.include_loopback_candidates = include;
        }

        config
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid value {:?} for {}", raw, key);
            None
        }
    }
}
