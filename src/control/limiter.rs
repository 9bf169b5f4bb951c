// Velocity / acceleration / jerk limiting for one command channel.
//
// One SpeedLimiter instance per controlled axis (linear.x, angular.z),
// each with its own independently toggleable bounds. Rate limiting needs
// the two previously applied commands, which the orchestrator keeps in a
// CommandHistory seeded with zero twists.

use serde::Deserialize;

use crate::messages::TwistCommand;

/// Bounds for one command channel. Each pair may be disabled.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    pub has_velocity_limits: bool,
    pub has_acceleration_limits: bool,
    pub has_jerk_limits: bool,
    pub min_velocity: f64,
    pub max_velocity: f64,
    pub min_acceleration: f64,
    pub max_acceleration: f64,
    pub min_jerk: f64,
    pub max_jerk: f64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            has_velocity_limits: false,
            has_acceleration_limits: false,
            has_jerk_limits: false,
            min_velocity: f64::NAN,
            max_velocity: f64::NAN,
            min_acceleration: f64::NAN,
            max_acceleration: f64::NAN,
            min_jerk: f64::NAN,
            max_jerk: f64::NAN,
        }
    }
}

/// An enabled bound pair that is not an ordered finite pair. Fatal to
/// configuration; the clamp stages assume validated bounds.
#[derive(Debug, thiserror::Error)]
#[error("{bound} bounds [{min}, {max}] are not a finite ordered pair")]
pub struct InvalidBounds {
    pub bound: &'static str,
    pub min: f64,
    pub max: f64,
}

impl LimiterConfig {
    pub fn validate(&self) -> Result<(), InvalidBounds> {
        let pairs = [
            (
                "velocity",
                self.has_velocity_limits,
                self.min_velocity,
                self.max_velocity,
            ),
            (
                "acceleration",
                self.has_acceleration_limits,
                self.min_acceleration,
                self.max_acceleration,
            ),
            ("jerk", self.has_jerk_limits, self.min_jerk, self.max_jerk),
        ];
        for (bound, enabled, min, max) in pairs {
            if enabled && !(min.is_finite() && max.is_finite() && min <= max) {
                return Err(InvalidBounds { bound, min, max });
            }
        }
        Ok(())
    }
}

/// Scalar command limiter. Stateless per call given the history.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpeedLimiter {
    cfg: LimiterConfig,
}

impl SpeedLimiter {
    pub fn new(cfg: LimiterConfig) -> Self {
        Self { cfg }
    }

    /// Bound `v` in place given the last two applied commands `v0` (most
    /// recent) and `v1`, and the elapsed time `dt` in seconds.
    ///
    /// Stages run in a fixed order: velocity clamp, acceleration clamp,
    /// jerk clamp. With `dt <= 0` no rate estimate exists, so only the
    /// velocity clamp applies. Returns the limiting factor applied/raw
    /// (1.0 when the raw command is zero), for diagnostics.
    pub fn limit(&self, v: &mut f64, v0: f64, v1: f64, dt: f64) -> f64 {
        let raw = *v;

        self.limit_velocity(v);
        if dt > 0.0 {
            self.limit_acceleration(v, v0, dt);
            self.limit_jerk(v, v0, v1, dt);
        }

        if raw != 0.0 { *v / raw } else { 1.0 }
    }

    fn limit_velocity(&self, v: &mut f64) {
        if self.cfg.has_velocity_limits {
            *v = v.clamp(self.cfg.min_velocity, self.cfg.max_velocity);
        }
    }

    fn limit_acceleration(&self, v: &mut f64, v0: f64, dt: f64) {
        if !self.cfg.has_acceleration_limits {
            return;
        }
        let accel = (*v - v0) / dt;
        if accel < self.cfg.min_acceleration || accel > self.cfg.max_acceleration {
            let accel = accel.clamp(self.cfg.min_acceleration, self.cfg.max_acceleration);
            *v = v0 + accel * dt;
        }
    }

    fn limit_jerk(&self, v: &mut f64, v0: f64, v1: f64, dt: f64) {
        if !self.cfg.has_jerk_limits {
            return;
        }
        let accel = (*v - v0) / dt;
        let prev_accel = (v0 - v1) / dt;
        let jerk = (accel - prev_accel) / dt;
        if jerk < self.cfg.min_jerk || jerk > self.cfg.max_jerk {
            let jerk = jerk.clamp(self.cfg.min_jerk, self.cfg.max_jerk);
            let accel = prev_accel + jerk * dt;
            *v = v0 + accel * dt;
        }
    }
}

/// The two most recent applied body twists, newest last.
///
/// Seeded with zero commands so rate limiting is well defined from the
/// first cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandHistory {
    second_last: TwistCommand,
    last: TwistCommand,
}

impl CommandHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an applied command, evicting the oldest entry.
    pub fn push(&mut self, cmd: TwistCommand) {
        self.second_last = self.last;
        self.last = cmd;
    }

    /// Re-seed with zero commands.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn last(&self) -> TwistCommand {
        self.last
    }

    pub fn second_last(&self) -> TwistCommand {
        self.second_last
    }
}
