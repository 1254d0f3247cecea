use std::{
    net::{IpAddr, Ipv4Addr},
    time::Duration,
};

use rand::Rng;

use crate::{error::PaxosError, types::NODE_ID_BITS};

pub const DEFAULT_NODE_COUNT: u32 = 9;
pub const DEFAULT_BASE_PORT: u16 = 8000;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_EVENT_BUFFER: usize = 1000;

/// Static shape of a cluster: membership size, addressing and timing.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfig {
    /// Number of nodes; ids run `1..=node_count`.
    pub node_count: u32,
    /// Host every node listens on.
    pub host: IpAddr,
    /// Node `i` listens on `base_port + i`.
    pub base_port: u16,
    /// Upper bound for one request/response exchange with a peer, connect included.
    pub request_timeout: Duration,
    /// Seed for fault-injection randomness. `None` seeds from the OS.
    pub rng_seed: Option<u64>,
    /// Capacity of the event broadcast channel.
    pub event_buffer: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_count: DEFAULT_NODE_COUNT,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            base_port: DEFAULT_BASE_PORT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            rng_seed: None,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl ClusterConfig {
    pub fn builder() -> ClusterConfigBuilder {
        ClusterConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), PaxosError> {
        let max_nodes = (1u32 << NODE_ID_BITS) - 1;
        if self.node_count == 0 || self.node_count > max_nodes {
            return Err(PaxosError::InvalidConfiguration(format!(
                "node_count must be within 1..={max_nodes}, got {}",
                self.node_count
            )));
        }
        if u32::from(self.base_port) + self.node_count > u32::from(u16::MAX) {
            return Err(PaxosError::InvalidConfiguration(format!(
                "base_port {} leaves no room for {} nodes",
                self.base_port, self.node_count
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(PaxosError::InvalidConfiguration(
                "request_timeout must be greater than zero".to_string(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(PaxosError::InvalidConfiguration(
                "event_buffer must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct ClusterConfigBuilder {
    config: ClusterConfig,
}

impl ClusterConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClusterConfig::default(),
        }
    }

    pub fn with_node_count(mut self, node_count: u32) -> Self {
        self.config.node_count = node_count;
        self
    }

    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.config.host = host;
        self
    }

    pub fn with_base_port(mut self, base_port: u16) -> Self {
        self.config.base_port = base_port;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.config.request_timeout = request_timeout;
        self
    }

    /// Fix the fault-injection RNG seed for reproducible runs
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.config.rng_seed = Some(seed);
        self
    }

    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.config.event_buffer = event_buffer;
        self
    }

    /// Nine nodes on localhost from port 8001, five second request timeout
    pub fn local_preset(mut self) -> Self {
        let seed = self.config.rng_seed;
        self.config = ClusterConfig::default();
        self.config.rng_seed = seed;
        self
    }

    /// Nine nodes on localhost with a short request timeout, for tests and demos
    pub fn fast_local_preset(mut self, base_port: u16) -> Self {
        self.config.node_count = DEFAULT_NODE_COUNT;
        self.config.host = IpAddr::V4(Ipv4Addr::LOCALHOST);
        self.config.base_port = base_port;
        self.config.request_timeout = Duration::from_millis(500);
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), PaxosError> {
        self.config.validate()
    }

    /// Build the final ClusterConfig
    pub fn build(self) -> Result<ClusterConfig, PaxosError> {
        self.validate()?;
        Ok(self.config)
    }
}

impl Default for ClusterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// How [`crate::cluster::Cluster::propose_with_retry`] spaces out repeated rounds.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total rounds attempted, the first included.
    pub max_attempts: u32,
    /// Backoff before the first retry.
    pub initial_backoff: Duration,
    /// Ceiling for any single backoff.
    pub max_backoff: Duration,
    /// Growth factor per retry.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Backoff before retry number `retry` (zero-based), with 50%..150% jitter.
    pub fn backoff(&self, retry: u32, rng: &mut impl Rng) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped * rng.random_range(0.5..1.5))
    }

    pub fn validate(&self) -> Result<(), PaxosError> {
        if self.max_attempts == 0 {
            return Err(PaxosError::InvalidConfiguration(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(PaxosError::InvalidConfiguration(format!(
                "multiplier must be a finite value >= 1.0, got {}",
                self.multiplier
            )));
        }
        if self.initial_backoff > self.max_backoff {
            return Err(PaxosError::InvalidConfiguration(
                "initial_backoff exceeds max_backoff".to_string(),
            ));
        }
        Ok(())
    }
}
