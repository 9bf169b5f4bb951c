// Dead-reckoning pose estimator.
//
// Integrates either commanded velocities (open loop) or feedback-derived
// velocities (closed loop) into a 2D pose. Two closed-loop paths exist:
// a differential-drive path driven by wheel positions, kept for alternate
// drivetrains, and a single-track (bicycle model) path driven by a
// steering angle and wheel speed, which is the one this 4WS chassis
// exercises. All paths share one integration rule.

use serde::Deserialize;

use super::rolling_mean::RollingMeanAccumulator;

/// Below this |angular| the exact-arc formula divides by near-zero
/// curvature; fall back to midpoint integration.
const ANGULAR_EPSILON: f64 = 1e-6;

/// Which feedback path advances the pose each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackMode {
    /// Integrate the commanded twist verbatim.
    OpenLoop,
    /// Integrate per-wheel position feedback (differential drive math).
    Differential,
    /// Integrate steering-angle + wheel-speed feedback (bicycle model).
    #[default]
    SingleTrack,
}

/// Pose/velocity tracker fed once per control cycle.
///
/// `heading` is an unbounded accumulator: it is never wrapped to ±π,
/// since only its sine and cosine are consumed internally. Consumers
/// reading it raw should expect it to grow across revolutions.
#[derive(Debug, Clone)]
pub struct Odometry {
    timestamp: f64,

    // Pose [m, m, rad].
    x: f64,
    y: f64,
    heading: f64,

    // Smoothed velocity estimate [m/s, rad/s].
    linear: f64,
    angular: f64,

    // Effective wheel geometry [m].
    wheel_separation: f64,
    wheel_base: f64,
    left_wheel_radius: f64,
    right_wheel_radius: f64,

    // Previous wheel positions for the differential path [rad].
    left_wheel_old_pos: f64,
    right_wheel_old_pos: f64,

    velocity_rolling_window_size: usize,
    linear_accumulator: RollingMeanAccumulator,
    angular_accumulator: RollingMeanAccumulator,
}

impl Odometry {
    pub fn new(velocity_rolling_window_size: usize) -> Self {
        Self {
            timestamp: 0.0,
            x: 0.0,
            y: 0.0,
            heading: 0.0,
            linear: 0.0,
            angular: 0.0,
            wheel_separation: 0.0,
            wheel_base: 0.0,
            left_wheel_radius: 0.0,
            right_wheel_radius: 0.0,
            left_wheel_old_pos: 0.0,
            right_wheel_old_pos: 0.0,
            velocity_rolling_window_size,
            linear_accumulator: RollingMeanAccumulator::new(velocity_rolling_window_size),
            angular_accumulator: RollingMeanAccumulator::new(velocity_rolling_window_size),
        }
    }

    /// Latch the time base without touching the pose.
    pub fn init(&mut self, time: f64) {
        self.timestamp = time;
    }

    /// Differential-drive closed-loop update from accumulated wheel
    /// positions in radians. Returns false (no state mutated) when no
    /// time has elapsed.
    pub fn update(&mut self, left_pos: f64, right_pos: f64, time: f64) -> bool {
        let dt = time - self.timestamp;
        if dt <= 0.0 {
            return false;
        }

        let left_wheel_cur_pos = left_pos * self.left_wheel_radius;
        let right_wheel_cur_pos = right_pos * self.right_wheel_radius;

        let left_wheel_est_vel = left_wheel_cur_pos - self.left_wheel_old_pos;
        let right_wheel_est_vel = right_wheel_cur_pos - self.right_wheel_old_pos;

        self.left_wheel_old_pos = left_wheel_cur_pos;
        self.right_wheel_old_pos = right_wheel_cur_pos;

        let linear = (left_wheel_est_vel + right_wheel_est_vel) * 0.5;
        let angular = (right_wheel_est_vel - left_wheel_est_vel) / self.wheel_separation;

        self.integrate(linear, angular);
        self.timestamp = time;

        self.linear_accumulator.accumulate(linear / dt);
        self.angular_accumulator.accumulate(angular / dt);
        self.linear = self.linear_accumulator.mean();
        self.angular = self.angular_accumulator.mean();
        true
    }

    /// Single-track (bicycle model) closed-loop update.
    ///
    /// `angle` is the signed steering angle in radians and `speed` the
    /// signed wheel speed in m/s, both already resolved to the body sign
    /// convention by the caller's quadrant logic. The pose integrates the
    /// raw instantaneous sample; only the exposed velocity estimate is
    /// smoothed.
    pub fn update_from_steering(&mut self, angle: f64, speed: f64, time: f64) -> bool {
        let dt = time - self.timestamp;
        if dt <= 0.0 {
            return false;
        }

        let angular = speed * angle.sin() / self.wheel_base;
        let linear = speed * angle.cos();

        self.linear_accumulator.accumulate(linear);
        self.angular_accumulator.accumulate(angular);
        self.linear = self.linear_accumulator.mean();
        self.angular = self.angular_accumulator.mean();

        self.integrate(linear * dt, angular * dt);
        self.timestamp = time;
        true
    }

    /// Open-loop update: trust the commanded twist verbatim. A negative
    /// dt is a timing anomaly and skips the update; dt = 0 is a no-op
    /// integration.
    pub fn update_open_loop(&mut self, linear: f64, angular: f64, time: f64) {
        let dt = time - self.timestamp;
        if dt < 0.0 {
            return;
        }

        self.linear = linear;
        self.angular = angular;

        self.integrate(linear * dt, angular * dt);
        self.timestamp = time;
    }

    /// Reset pose to the origin and clear the velocity estimate.
    pub fn reset_odometry(&mut self) {
        self.x = 0.0;
        self.y = 0.0;
        self.heading = 0.0;
        self.linear = 0.0;
        self.angular = 0.0;
        self.left_wheel_old_pos = 0.0;
        self.right_wheel_old_pos = 0.0;
        self.reset_accumulators();
    }

    /// Reconfigure geometry. Only valid between cycles.
    pub fn set_wheel_params(
        &mut self,
        wheel_separation: f64,
        wheel_base: f64,
        left_wheel_radius: f64,
        right_wheel_radius: f64,
    ) {
        self.wheel_separation = wheel_separation;
        self.wheel_base = wheel_base;
        self.left_wheel_radius = left_wheel_radius;
        self.right_wheel_radius = right_wheel_radius;
    }

    /// Resize the smoothing windows. Only valid between cycles; drops
    /// the current window contents.
    pub fn set_velocity_rolling_window_size(&mut self, size: usize) {
        self.velocity_rolling_window_size = size.max(1);
        self.reset_accumulators();
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn heading(&self) -> f64 {
        self.heading
    }

    pub fn linear(&self) -> f64 {
        self.linear
    }

    pub fn angular(&self) -> f64 {
        self.angular
    }

    /// Advance the pose by a displacement pair (already multiplied by dt
    /// where the caller integrates velocities).
    fn integrate(&mut self, linear: f64, angular: f64) {
        if angular.abs() < ANGULAR_EPSILON {
            self.integrate_midpoint(linear, angular);
        } else {
            self.integrate_exact(linear, angular);
        }
    }

    /// Second-order midpoint rule; exact when angular is zero and stable
    /// where the arc formula is not.
    fn integrate_midpoint(&mut self, linear: f64, angular: f64) {
        let direction = self.heading + angular * 0.5;
        self.x += linear * direction.cos();
        self.y += linear * direction.sin();
        self.heading += angular;
    }

    /// Exact circular-arc integration for constant (v, w) over the step.
    fn integrate_exact(&mut self, linear: f64, angular: f64) {
        let heading_old = self.heading;
        let r = linear / angular;
        self.heading += angular;
        self.x += r * (self.heading.sin() - heading_old.sin());
        self.y += -r * (self.heading.cos() - heading_old.cos());
    }

    fn reset_accumulators(&mut self) {
        self.linear_accumulator = RollingMeanAccumulator::new(self.velocity_rolling_window_size);
        self.angular_accumulator = RollingMeanAccumulator::new(self.velocity_rolling_window_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn odometry() -> Odometry {
        let mut odom = Odometry::new(10);
        odom.set_wheel_params(0.5, 0.3, 0.1, 0.1);
        odom.init(0.0);
        odom
    }

    #[test]
    fn open_loop_straight_line() {
        let mut odom = odometry();
        for step in 1..=10 {
            odom.update_open_loop(1.0, 0.0, step as f64 * 0.1);
        }
        assert!((odom.x() - 1.0).abs() < 1e-9);
        assert_eq!(odom.y(), 0.0);
        assert_eq!(odom.heading(), 0.0);
        assert_eq!(odom.linear(), 1.0);
        assert_eq!(odom.angular(), 0.0);
    }

    #[test]
    fn open_loop_half_circle_matches_closed_form() {
        // v = 1, w = pi over one second: half circle of radius 1/pi,
        // ending at (0, 2/pi) facing backwards.
        let mut odom = odometry();
        odom.update_open_loop(1.0, PI, 1.0);
        assert!(odom.x().abs() < 1e-12);
        assert!((odom.y() - 2.0 / PI).abs() < 1e-12);
        assert!((odom.heading() - PI).abs() < 1e-12);
    }

    #[test]
    fn open_loop_negative_dt_is_skipped() {
        let mut odom = odometry();
        odom.update_open_loop(1.0, 0.0, 1.0);
        let x = odom.x();
        odom.update_open_loop(1.0, 0.0, 0.5);
        assert_eq!(odom.x(), x);
    }

    #[test]
    fn open_loop_zero_dt_is_noop_integration() {
        let mut odom = odometry();
        odom.update_open_loop(1.0, 0.0, 0.0);
        assert_eq!(odom.x(), 0.0);
        // Velocity estimate still tracks the command verbatim.
        assert_eq!(odom.linear(), 1.0);
    }

    #[test]
    fn differential_update_advances_pose() {
        let mut odom = odometry();
        // Both wheels advance 1 rad on 0.1 m radius: 0.1 m straight.
        assert!(odom.update(1.0, 1.0, 1.0));
        assert!((odom.x() - 0.1).abs() < 1e-12);
        assert_eq!(odom.y(), 0.0);
        assert!((odom.linear() - 0.1).abs() < 1e-12);
        assert_eq!(odom.angular(), 0.0);
    }

    #[test]
    fn differential_update_turns() {
        let mut odom = odometry();
        // Right wheel advances more: CCW rotation.
        assert!(odom.update(1.0, 2.0, 1.0));
        assert!(odom.heading() > 0.0);
        assert!(odom.angular() > 0.0);
    }

    #[test]
    fn differential_update_rejects_non_positive_dt() {
        let mut odom = odometry();
        assert!(odom.update(1.0, 1.0, 1.0));
        let (x, heading) = (odom.x(), odom.heading());
        assert!(!odom.update(2.0, 2.0, 1.0));
        assert!(!odom.update(3.0, 3.0, 0.5));
        assert_eq!(odom.x(), x);
        assert_eq!(odom.heading(), heading);
    }

    #[test]
    fn single_track_straight_sample() {
        let mut odom = odometry();
        assert!(odom.update_from_steering(0.0, 1.0, 1.0));
        assert!((odom.x() - 1.0).abs() < 1e-12);
        assert_eq!(odom.y(), 0.0);
        assert!((odom.linear() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn single_track_estimate_is_smoothed_pose_is_raw() {
        let mut odom = odometry();
        assert!(odom.update_from_steering(0.0, 1.0, 1.0));
        assert!(odom.update_from_steering(0.0, 3.0, 2.0));
        // Estimate is the window mean of [1, 3].
        assert!((odom.linear() - 2.0).abs() < 1e-12);
        // Pose integrated each raw sample: 1*1s + 3*1s.
        assert!((odom.x() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn single_track_turn_uses_bicycle_model() {
        let mut odom = odometry();
        let (angle, speed, dt): (f64, f64, f64) = (0.2, 1.0, 0.5);
        assert!(odom.update_from_steering(angle, speed, dt));
        let expected_angular = speed * angle.sin() / 0.3;
        assert!((odom.angular() - expected_angular).abs() < 1e-12);
        assert!((odom.heading() - expected_angular * dt).abs() < 1e-12);
    }

    #[test]
    fn reset_returns_zero_state() {
        let mut odom = odometry();
        odom.update_open_loop(1.0, 0.5, 1.0);
        odom.update(2.0, 3.0, 2.0);
        odom.reset_odometry();
        assert_eq!(odom.x(), 0.0);
        assert_eq!(odom.y(), 0.0);
        assert_eq!(odom.heading(), 0.0);
        assert_eq!(odom.linear(), 0.0);
        assert_eq!(odom.angular(), 0.0);
    }

    #[test]
    fn heading_is_not_wrapped() {
        let mut odom = odometry();
        for step in 1..=10 {
            odom.update_open_loop(1.0, PI, step as f64);
        }
        // Five full revolutions, accumulated rather than wrapped.
        assert!((odom.heading() - 10.0 * PI).abs() < 1e-9);
    }

    #[test]
    fn near_zero_angular_uses_midpoint_branch() {
        // Just below the epsilon the arc formula would divide by ~0;
        // the midpoint branch must stay finite.
        let mut odom = odometry();
        odom.update_open_loop(1.0, 1e-9, 1.0);
        assert!(odom.x().is_finite());
        assert!((odom.x() - 1.0).abs() < 1e-6);
    }
}
