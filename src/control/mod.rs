// Motion-control core for the 4WS/6WD base
//
// Provides:
// - Inverse kinematics (body twist -> wheel speeds + steering angles)
// - Velocity/acceleration/jerk command limiting
// - Dead-reckoning odometry (open loop / differential / single-track)

pub mod kinematics;
pub mod limiter;
pub mod odometry;
pub mod rolling_mean;

pub use kinematics::{
    solve, Quadrant, WheelGeometry, WheelSetpoints, RAD_PER_SEC_PER_RPM, RPM_PER_RAD_PER_SEC,
};
pub use limiter::{CommandHistory, LimiterConfig, SpeedLimiter};
pub use odometry::{FeedbackMode, Odometry};
pub use rolling_mean::RollingMeanAccumulator;

/// Per-cycle control errors. The cycle that hits one is aborted and the
/// previous setpoints hold; the next scheduled cycle is the retry.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("turning radius undefined: angular velocity {angular} with zero linear velocity")]
    UndefinedTurningRadius { angular: f64 },

    #[error("non-finite {what} feedback sample on the {side} side")]
    NonFiniteFeedback {
        side: &'static str,
        what: &'static str,
    },

    #[error("feedback carries {got} {what} samples per side, expected {expected}")]
    FeedbackLengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
}
