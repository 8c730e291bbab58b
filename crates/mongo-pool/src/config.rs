//! Pool configuration.

use std::time::Duration;

use crate::error::PoolError;

/// Historical ratio between the wait queue and the pool size.
const WAIT_QUEUE_MULTIPLE: usize = 5;

/// Configuration for the connection pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections checked out or being established at once.
    pub max_connections: usize,

    /// Number of connections the maintenance task keeps open.
    pub min_connections: usize,

    /// Maximum number of connections being opened and authenticated at once.
    pub max_connecting: usize,

    /// Maximum number of callers allowed to wait for a connection.
    ///
    /// `None` means `max_connections * 5`.
    pub wait_queue_size: Option<usize>,

    /// How long a caller may wait for a connection.
    pub wait_queue_timeout: Duration,

    /// Time between maintenance passes.
    pub maintenance_interval: Duration,

    /// Dormant connections idle for longer than this are closed.
    pub max_idle_time: Option<Duration>,

    /// Whether the server sits behind a load balancer.
    pub load_balanced: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            min_connections: 0,
            max_connecting: 2,
            wait_queue_size: None,
            wait_queue_timeout: Duration::from_secs(120),
            maintenance_interval: Duration::from_secs(60),
            max_idle_time: None,
            load_balanced: false,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: usize) -> Self {
        self.max_connections = count;
        self
    }

    /// Set the minimum number of connections.
    #[must_use]
    pub fn min_connections(mut self, count: usize) -> Self {
        self.min_connections = count;
        self
    }

    /// Set how many connections may be established concurrently.
    #[must_use]
    pub fn max_connecting(mut self, count: usize) -> Self {
        self.max_connecting = count;
        self
    }

    /// Set the wait queue size.
    #[must_use]
    pub fn wait_queue_size(mut self, size: usize) -> Self {
        self.wait_queue_size = Some(size);
        self
    }

    /// Set the connection acquisition timeout.
    #[must_use]
    pub fn wait_queue_timeout(mut self, timeout: Duration) -> Self {
        self.wait_queue_timeout = timeout;
        self
    }

    /// Set the maintenance interval.
    #[must_use]
    pub fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    /// Set the maximum idle time of dormant connections.
    #[must_use]
    pub fn max_idle_time(mut self, idle: Duration) -> Self {
        self.max_idle_time = Some(idle);
        self
    }

    /// Mark the deployment as load balanced.
    #[must_use]
    pub fn load_balanced(mut self, enabled: bool) -> Self {
        self.load_balanced = enabled;
        self
    }

    /// Wait queue size after applying the default.
    #[must_use]
    pub fn effective_wait_queue_size(&self) -> usize {
        self.wait_queue_size
            .unwrap_or_else(|| self.max_connections.saturating_mul(WAIT_QUEUE_MULTIPLE))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_connections == 0 {
            return Err(PoolError::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(PoolError::Config(
                "min_connections cannot be greater than max_connections".into(),
            ));
        }
        if self.max_connecting == 0 {
            return Err(PoolError::Config(
                "max_connecting must be greater than 0".into(),
            ));
        }
        if self.max_connecting > self.max_connections {
            return Err(PoolError::Config(
                "max_connecting cannot be greater than max_connections".into(),
            ));
        }
        if self.effective_wait_queue_size() == 0 {
            return Err(PoolError::Config(
                "wait_queue_size must be greater than 0".into(),
            ));
        }
        if self.wait_queue_timeout.is_zero() {
            return Err(PoolError::Config(
                "wait_queue_timeout must be greater than 0".into(),
            ));
        }
        if self.maintenance_interval.is_zero() {
            return Err(PoolError::Config(
                "maintenance_interval must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
