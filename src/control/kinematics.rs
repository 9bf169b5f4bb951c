// Inverse kinematics for the 4WS/6WD base.
//
// Maps a body-frame twist (forward m/s, yaw rad/s) to per-side drive
// speeds and per-axle steering angles. The chassis has three axles per
// the long axis: a steered front axle, an unsteered middle axle, and a
// rear axle steered opposite the front to tighten the turning circle.
//
// The angle/speed formulas below are derived for the canonical case
// (linear > 0, angular >= 0); a fixed four-quadrant direction table
// resolves the remaining sign combinations.

use std::f64::consts::{FRAC_PI_2, PI};

use serde::Deserialize;

use super::ControlError;

/// Exact rpm <-> rad/s conversion. The drive controllers speak rpm; all
/// internal math is rad/s. Both directions must use the same constant or
/// the odometry picks up a steady-state bias.
pub const RAD_PER_SEC_PER_RPM: f64 = 2.0 * PI / 60.0;
pub const RPM_PER_RAD_PER_SEC: f64 = 60.0 / (2.0 * PI);

/// Chassis geometry and empirical correction factors.
///
/// `base` and `separation` are the longitudinal and lateral reference
/// distances of the chassis; the multipliers are calibration scalars
/// applied on top of the measured values.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WheelGeometry {
    pub wheels_per_side: usize,
    pub base: f64,
    pub separation: f64,
    /// Wheel radius in meters, assumed common to all wheels.
    pub radius: f64,
    pub base_multiplier: f64,
    pub separation_multiplier: f64,
    pub left_radius_multiplier: f64,
    pub right_radius_multiplier: f64,
    pub angular_velocity_compensation: f64,
    pub steering_angle_correction: f64,
}

impl Default for WheelGeometry {
    fn default() -> Self {
        Self {
            wheels_per_side: 2,
            base: 0.3,
            separation: 0.5,
            radius: 0.06,
            base_multiplier: 1.0,
            separation_multiplier: 1.0,
            left_radius_multiplier: 1.0,
            right_radius_multiplier: 1.0,
            angular_velocity_compensation: 1.0,
            steering_angle_correction: 1.0,
        }
    }
}

/// Geometry validation failure. Fatal to configuration.
#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("wheel radius must be positive and finite, got {0}")]
    InvalidRadius(f64),

    #[error("{name} must be positive and finite, got {value}")]
    InvalidDistance { name: &'static str, value: f64 },

    #[error("{name} must be finite and nonzero, got {value}")]
    InvalidMultiplier { name: &'static str, value: f64 },

    #[error("wheels_per_side must be at least 1")]
    NoWheels,
}

impl WheelGeometry {
    /// Check the configuration invariants before the runtime starts.
    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.wheels_per_side == 0 {
            return Err(GeometryError::NoWheels);
        }
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(GeometryError::InvalidRadius(self.radius));
        }
        for (name, value) in [("base", self.base), ("separation", self.separation)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(GeometryError::InvalidDistance { name, value });
            }
        }
        for (name, value) in [
            ("base_multiplier", self.base_multiplier),
            ("separation_multiplier", self.separation_multiplier),
            ("left_radius_multiplier", self.left_radius_multiplier),
            ("right_radius_multiplier", self.right_radius_multiplier),
            (
                "angular_velocity_compensation",
                self.angular_velocity_compensation,
            ),
            ("steering_angle_correction", self.steering_angle_correction),
        ] {
            if !value.is_finite() || value == 0.0 {
                return Err(GeometryError::InvalidMultiplier { name, value });
            }
        }
        Ok(())
    }

    /// Multiplier-applied geometry used by the solver and odometry.
    pub fn effective(&self) -> EffectiveGeometry {
        EffectiveGeometry {
            wheel_base: self.base_multiplier * self.base,
            wheel_separation: self.separation_multiplier * self.separation,
            left_wheel_radius: self.left_radius_multiplier * self.radius,
            right_wheel_radius: self.right_radius_multiplier * self.radius,
            angular_velocity_compensation: self.angular_velocity_compensation,
            steering_angle_correction: self.steering_angle_correction,
        }
    }
}

/// Geometry with all calibration multipliers applied.
#[derive(Debug, Clone, Copy)]
pub struct EffectiveGeometry {
    pub wheel_base: f64,
    pub wheel_separation: f64,
    pub left_wheel_radius: f64,
    pub right_wheel_radius: f64,
    pub angular_velocity_compensation: f64,
    pub steering_angle_correction: f64,
}

/// Sign combination of (linear, angular), laid out as
///
/// ```text
/// 0 | 1
/// -----
/// 3 | 2
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrant {
    /// linear > 0, angular >= 0
    ForwardCcw,
    /// linear > 0, angular < 0
    ForwardCw,
    /// linear < 0 (or 0), angular > 0
    ReverseCcw,
    /// linear < 0 (or 0), angular <= 0
    ReverseCw,
}

impl Quadrant {
    pub fn classify(linear: f64, angular: f64) -> Self {
        if linear > 0.0 {
            if angular >= 0.0 {
                Quadrant::ForwardCcw
            } else {
                Quadrant::ForwardCw
            }
        } else if angular > 0.0 {
            Quadrant::ReverseCcw
        } else {
            Quadrant::ReverseCw
        }
    }

    /// Fixed direction table: [steer_left, steer_right, vel_left, vel_right].
    ///
    /// This encodes the axle-mirroring convention of the chassis; it is a
    /// lookup, not something derived from the geometry.
    fn signs(self) -> [f64; 4] {
        match self {
            Quadrant::ForwardCcw => [1.0, 1.0, 1.0, 1.0],
            Quadrant::ForwardCw => [-1.0, -1.0, 1.0, 1.0],
            Quadrant::ReverseCcw => [-1.0, -1.0, -1.0, -1.0],
            Quadrant::ReverseCw => [1.0, 1.0, -1.0, -1.0],
        }
    }

    /// Quadrants where the canonical left/right quantities swap sides.
    fn crossed(self) -> bool {
        matches!(self, Quadrant::ForwardCw | Quadrant::ReverseCcw)
    }

    /// True for the forward-driving quadrants (drive feedback sign).
    pub fn forward(self) -> bool {
        matches!(self, Quadrant::ForwardCcw | Quadrant::ForwardCw)
    }

    /// True for the counter-clockwise quadrants (steering feedback sign).
    pub fn ccw(self) -> bool {
        matches!(self, Quadrant::ForwardCcw | Quadrant::ReverseCcw)
    }
}

/// Solver output: drive speeds in rad/s (uniform per side, middle axle
/// separate) and steering angles in radians for both steered axles.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelSetpoints {
    pub left_speed: f64,
    pub right_speed: f64,
    pub mid_left_speed: f64,
    pub mid_right_speed: f64,
    pub front_left_angle: f64,
    pub front_right_angle: f64,
    pub rear_left_angle: f64,
    pub rear_right_angle: f64,
}

/// Map a body twist to wheel speeds and steering angles.
///
/// A nonzero `angular` with zero `linear` has no defined turning radius
/// on this geometry and is rejected rather than clamped.
pub fn solve(
    linear: f64,
    angular: f64,
    geometry: &WheelGeometry,
) -> Result<WheelSetpoints, ControlError> {
    let eff = geometry.effective();

    let (angle_left, angle_right, velocity_left, velocity_right, velocity_mid_left, velocity_mid_right);

    if angular == 0.0 {
        velocity_left = (linear / eff.left_wheel_radius).abs();
        velocity_right = (linear / eff.right_wheel_radius).abs();
        velocity_mid_left = velocity_left;
        velocity_mid_right = velocity_right;
        angle_left = 0.0;
        angle_right = 0.0;
    } else if linear != 0.0 {
        let turning_radius = (linear / angular).abs();

        angle_left =
            FRAC_PI_2 - ((2.0 * turning_radius - eff.wheel_base) / eff.wheel_separation).atan();
        angle_right =
            FRAC_PI_2 - ((2.0 * turning_radius + eff.wheel_base) / eff.wheel_separation).atan();

        // Distance from the instantaneous turn center to each steered
        // wheel along its steering axis.
        let left_axis = (eff.wheel_separation / (2.0 * angle_left.sin())).abs();
        let right_axis = (eff.wheel_separation / (2.0 * angle_right.sin())).abs();

        let comp = eff.angular_velocity_compensation;
        velocity_left = (angular * left_axis / eff.left_wheel_radius).abs() * comp;
        velocity_right = (angular * right_axis / eff.right_wheel_radius).abs() * comp;

        // The middle axle is unsteered, so its offset from the turn
        // center is purely longitudinal.
        velocity_mid_left =
            (angular * (turning_radius - eff.wheel_base) / eff.left_wheel_radius).abs() * comp;
        velocity_mid_right =
            (angular * (turning_radius + eff.wheel_base) / eff.right_wheel_radius).abs() * comp;
    } else {
        return Err(ControlError::UndefinedTurningRadius { angular });
    }

    let quadrant = Quadrant::classify(linear, angular);
    let [steer_left_sign, steer_right_sign, vel_left_sign, vel_right_sign] = quadrant.signs();

    // Quadrants 1 and 2 feed the canonical left quantities to the right
    // output and vice versa.
    let (angle_l, angle_r, vel_l, vel_r, vel_mid_l, vel_mid_r) = if quadrant.crossed() {
        (
            angle_right,
            angle_left,
            velocity_right,
            velocity_left,
            velocity_mid_right,
            velocity_mid_left,
        )
    } else {
        (
            angle_left,
            angle_right,
            velocity_left,
            velocity_right,
            velocity_mid_left,
            velocity_mid_right,
        )
    };

    let steering_left = steer_left_sign * angle_l * eff.steering_angle_correction;
    let steering_right = steer_right_sign * angle_r * eff.steering_angle_correction;

    Ok(WheelSetpoints {
        left_speed: vel_left_sign * vel_l,
        right_speed: vel_right_sign * vel_r,
        mid_left_speed: vel_left_sign * vel_mid_l,
        mid_right_speed: vel_right_sign * vel_mid_r,
        // Rear axle steers opposite the front (four-wheel-steer).
        front_left_angle: steering_left,
        front_right_angle: -steering_right,
        rear_left_angle: -steering_left,
        rear_right_angle: steering_right,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_geometry() -> WheelGeometry {
        WheelGeometry {
            wheels_per_side: 2,
            base: 0.3,
            separation: 0.5,
            radius: 0.1,
            ..WheelGeometry::default()
        }
    }

    #[test]
    fn straight_line_drive() {
        let sp = solve(2.0, 0.0, &test_geometry()).unwrap();
        assert_eq!(sp.front_left_angle, 0.0);
        assert_eq!(sp.front_right_angle, 0.0);
        assert_eq!(sp.rear_left_angle, 0.0);
        assert_eq!(sp.rear_right_angle, 0.0);
        assert!((sp.left_speed - 20.0).abs() < 1e-12);
        assert!((sp.right_speed - 20.0).abs() < 1e-12);
        assert!((sp.mid_left_speed - 20.0).abs() < 1e-12);
        assert!((sp.mid_right_speed - 20.0).abs() < 1e-12);
    }

    #[test]
    fn reverse_straight_line_is_negative() {
        let sp = solve(-1.0, 0.0, &test_geometry()).unwrap();
        assert!(sp.left_speed < 0.0);
        assert!(sp.right_speed < 0.0);
        assert_eq!(sp.front_left_angle, 0.0);
    }

    #[test]
    fn zero_linear_nonzero_angular_is_rejected() {
        for angular in [-2.0, -0.1, 1e-9, 0.5, 3.0] {
            let err = solve(0.0, angular, &test_geometry()).unwrap_err();
            assert!(matches!(
                err,
                ControlError::UndefinedTurningRadius { .. }
            ));
        }
    }

    #[test]
    fn zero_twist_is_all_zero() {
        let sp = solve(0.0, 0.0, &test_geometry()).unwrap();
        assert_eq!(sp, WheelSetpoints::default());
    }

    #[test]
    fn forward_left_turn_matches_closed_form() {
        let geom = test_geometry();
        let eff = geom.effective();
        let (linear, angular) = (1.0, 0.5);
        let turning_radius: f64 = 2.0;

        let expected_left =
            FRAC_PI_2 - ((2.0 * turning_radius - eff.wheel_base) / eff.wheel_separation).atan();
        let expected_right =
            FRAC_PI_2 - ((2.0 * turning_radius + eff.wheel_base) / eff.wheel_separation).atan();

        let sp = solve(linear, angular, &geom).unwrap();
        assert!((sp.front_left_angle - expected_left).abs() < 1e-12);
        assert!((sp.front_right_angle + expected_right).abs() < 1e-12);
        // Rear axle mirrors the front.
        assert!((sp.rear_left_angle + expected_left).abs() < 1e-12);
        assert!((sp.rear_right_angle - expected_right).abs() < 1e-12);

        // Inner (left) wheel turns tighter and slower than outer.
        assert!(sp.front_left_angle > -sp.front_right_angle);
        assert!(sp.left_speed < sp.right_speed);
        assert!(sp.left_speed > 0.0);

        let left_axis = (eff.wheel_separation / (2.0 * expected_left.sin())).abs();
        assert!((sp.left_speed - (angular * left_axis / eff.left_wheel_radius)).abs() < 1e-12);

        // Middle axle uses the longitudinal offset only.
        let expected_mid_left = (angular * (turning_radius - eff.wheel_base)).abs()
            / eff.left_wheel_radius;
        assert!((sp.mid_left_speed - expected_mid_left).abs() < 1e-12);
    }

    #[test]
    fn quadrant_three_signs() {
        // linear < 0, angular < 0: steering positive, velocity negative,
        // left quantities stay on the left.
        let sp = solve(-1.0, -1.0, &test_geometry()).unwrap();
        assert!(sp.front_left_angle > 0.0);
        assert!(sp.rear_right_angle > 0.0);
        assert!(sp.left_speed < 0.0);
        assert!(sp.right_speed < 0.0);
        assert!(sp.mid_left_speed < 0.0);
        assert!(sp.mid_right_speed < 0.0);
    }

    #[test]
    fn crossed_quadrants_swap_sides() {
        let geom = test_geometry();
        // Quadrant 0 reference solution.
        let ccw = solve(1.0, 0.5, &geom).unwrap();
        // Quadrant 1 (forward, turning right) mirrors it.
        let cw = solve(1.0, -0.5, &geom).unwrap();

        // Mirrored turn: left outputs take the canonical right values.
        assert!((cw.front_left_angle - ccw.front_right_angle).abs() < 1e-12);
        assert!((cw.left_speed - ccw.right_speed).abs() < 1e-12);
        assert!((cw.right_speed - ccw.left_speed).abs() < 1e-12);
        assert!(cw.front_left_angle < 0.0);
    }

    #[test]
    fn steering_correction_scales_angles_only() {
        let mut geom = test_geometry();
        let base = solve(1.0, 0.5, &geom).unwrap();
        geom.steering_angle_correction = 0.5;
        let scaled = solve(1.0, 0.5, &geom).unwrap();
        assert!((scaled.front_left_angle - 0.5 * base.front_left_angle).abs() < 1e-12);
        assert!((scaled.left_speed - base.left_speed).abs() < 1e-12);
    }

    #[test]
    fn angular_velocity_compensation_scales_turning_speeds() {
        let mut geom = test_geometry();
        geom.angular_velocity_compensation = 1.1;
        let base = solve(1.0, 0.5, &test_geometry()).unwrap();
        let comp = solve(1.0, 0.5, &geom).unwrap();
        assert!((comp.left_speed - 1.1 * base.left_speed).abs() < 1e-12);
        assert!((comp.mid_right_speed - 1.1 * base.mid_right_speed).abs() < 1e-12);
    }

    #[test]
    fn rpm_conversion_is_exact() {
        assert!((RAD_PER_SEC_PER_RPM * RPM_PER_RAD_PER_SEC - 1.0).abs() < 1e-15);
        // 60 rpm is one revolution per second.
        assert!((60.0 * RAD_PER_SEC_PER_RPM - 2.0 * PI).abs() < 1e-12);
    }

    #[test]
    fn geometry_validation() {
        assert!(test_geometry().validate().is_ok());

        let mut geom = test_geometry();
        geom.radius = 0.0;
        assert!(matches!(
            geom.validate(),
            Err(GeometryError::InvalidRadius(_))
        ));

        let mut geom = test_geometry();
        geom.left_radius_multiplier = 0.0;
        assert!(matches!(
            geom.validate(),
            Err(GeometryError::InvalidMultiplier { .. })
        ));

        let mut geom = test_geometry();
        geom.wheels_per_side = 0;
        assert!(matches!(geom.validate(), Err(GeometryError::NoWheels)));

        let mut geom = test_geometry();
        geom.separation = f64::NAN;
        assert!(matches!(
            geom.validate(),
            Err(GeometryError::InvalidDistance { .. })
        ));
    }

    #[test]
    fn quadrant_classification() {
        assert_eq!(Quadrant::classify(1.0, 0.0), Quadrant::ForwardCcw);
        assert_eq!(Quadrant::classify(1.0, -0.1), Quadrant::ForwardCw);
        assert_eq!(Quadrant::classify(-1.0, 0.1), Quadrant::ReverseCcw);
        assert_eq!(Quadrant::classify(-1.0, -0.1), Quadrant::ReverseCw);
        assert!(Quadrant::ForwardCw.forward());
        assert!(!Quadrant::ReverseCw.forward());
        assert!(Quadrant::ReverseCcw.ccw());
        assert!(!Quadrant::ForwardCw.ccw());
    }
}
