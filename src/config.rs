// Timeouts, topics, runtime configuration
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::control::kinematics::GeometryError;
use crate::control::limiter::InvalidBounds;
use crate::control::{FeedbackMode, LimiterConfig, WheelGeometry};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(500);

// Odometry publish rate (at most once per cycle)
pub const ODOM_PUBLISH_HZ: u64 = 50;

// Zenoh topics
pub const TOPIC_CMD_BASE: &str = "ack6wd/cmd/base"; // commands
pub const TOPIC_CMD_LIMITED: &str = "ack6wd/cmd/base_limited"; // post-limiter echo
pub const TOPIC_FB_BASE: &str = "ack6wd/fb/base"; // wheel/steering feedback
pub const TOPIC_RT_BASE: &str = "ack6wd/rt/base"; // actuation
pub const TOPIC_ODOM: &str = "ack6wd/state/odom"; // pose + velocity estimate
pub const TOPIC_HEALTH: &str = "ack6wd/state/health"; // health status

/// Configuration errors are fatal: the runtime refuses to start.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error("{axis} limiter: {source}")]
    Limiter {
        axis: &'static str,
        source: InvalidBounds,
    },
}

/// Immutable configuration snapshot, taken once at startup and passed by
/// value into the runtime. Loadable from JSON; every field has a default
/// so a partial file works.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub wheels: WheelGeometry,
    pub linear: LimiterConfig,
    pub angular: LimiterConfig,
    pub feedback_mode: FeedbackMode,
    pub velocity_rolling_window_size: usize,
    pub publish_limited_velocity: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            wheels: WheelGeometry::default(),
            linear: LimiterConfig::default(),
            angular: LimiterConfig::default(),
            feedback_mode: FeedbackMode::default(),
            velocity_rolling_window_size: 10,
            publish_limited_velocity: false,
        }
    }
}

impl RuntimeConfig {
    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.wheels.validate()?;
        for (axis, limiter) in [("linear", &self.linear), ("angular", &self.angular)] {
            limiter
                .validate()
                .map_err(|source| ConfigError::Limiter { axis, source })?;
        }
        Ok(())
    }
}
