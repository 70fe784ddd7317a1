//! Configuration for the scene manager
//!
//! Controls echo expiry, the intake worker's sweep cadence, discovery
//! timeouts and listener queue sizes.

use std::time::Duration;

use crate::error::{Result, SceneManagerError};

/// Configuration for the SceneManager
#[derive(Debug, Clone)]
pub struct SceneManagerConfig {
    /// How long an expected echo stays valid after the command was issued
    /// Default: 3 seconds
    pub echo_ttl: Duration,

    /// How often the intake worker sweeps expired echo entries
    /// Default: 500 milliseconds
    pub sweep_interval: Duration,

    /// Upper bound for a single discovery phase
    /// Default: 30 seconds
    pub discovery_phase_timeout: Duration,

    /// Capacity of each listener's notification queue
    /// Default: 256
    pub listener_queue_capacity: usize,

    /// Run scene discovery when the manager starts
    /// Default: false
    pub generate_scenes_on_start: bool,
}

impl Default for SceneManagerConfig {
    fn default() -> Self {
        Self {
            echo_ttl: Duration::from_secs(3),
            sweep_interval: Duration::from_millis(500),
            discovery_phase_timeout: Duration::from_secs(30),
            listener_queue_capacity: 256,
            generate_scenes_on_start: false,
        }
    }
}

impl SceneManagerConfig {
    /// Create a new SceneManagerConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Short timeouts, for tests and local simulations
    pub fn fast() -> Self {
        Self {
            echo_ttl: Duration::from_millis(200),
            sweep_interval: Duration::from_millis(20),
            discovery_phase_timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    /// Long timeouts for slow or congested installations
    pub fn conservative() -> Self {
        Self {
            echo_ttl: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(2),
            discovery_phase_timeout: Duration::from_secs(120),
            listener_queue_capacity: 1024,
            ..Default::default()
        }
    }

    pub fn with_echo_ttl(mut self, ttl: Duration) -> Self {
        self.echo_ttl = ttl;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_discovery_phase_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_phase_timeout = timeout;
        self
    }

    pub fn with_listener_queue_capacity(mut self, capacity: usize) -> Self {
        self.listener_queue_capacity = capacity;
        self
    }

    pub fn with_generate_scenes_on_start(mut self, enabled: bool) -> Self {
        self.generate_scenes_on_start = enabled;
        self
    }

    /// Check that the values can be used together
    pub fn validate(&self) -> Result<()> {
        if self.echo_ttl.is_zero() {
            return Err(SceneManagerError::InvalidConfig(
                "echo_ttl must be greater than zero".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(SceneManagerError::InvalidConfig(
                "sweep_interval must be greater than zero".to_string(),
            ));
        }
        if self.discovery_phase_timeout.is_zero() {
            return Err(SceneManagerError::InvalidConfig(
                "discovery_phase_timeout must be greater than zero".to_string(),
            ));
        }
        if self.listener_queue_capacity == 0 {
            return Err(SceneManagerError::InvalidConfig(
                "listener_queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
