// Message types exchanged over Zenoh

use serde::{Deserialize, Serialize};

use crate::control::{WheelSetpoints, RPM_PER_RAD_PER_SEC};

// Command from teleop/scripts -> runtime.
// Forward linear velocity [m/s] and CCW yaw rate [rad/s].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TwistCommand {
    pub linear: f64,
    pub angular: f64,
}

// Actuation output from runtime -> drive hardware node.
// Drive speeds in rpm (the unit the wheel controllers speak), steering
// angles in radians. Side speeds apply to every wheel position on that
// side; the middle axle carries drive only.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct WheelActuation {
    pub left_rpm: f64,
    pub right_rpm: f64,
    pub mid_left_rpm: f64,
    pub mid_right_rpm: f64,
    pub front_left_steering: f64,
    pub front_right_steering: f64,
    pub rear_left_steering: f64,
    pub rear_right_steering: f64,
}

impl From<&WheelSetpoints> for WheelActuation {
    fn from(sp: &WheelSetpoints) -> Self {
        Self {
            left_rpm: sp.left_speed * RPM_PER_RAD_PER_SEC,
            right_rpm: sp.right_speed * RPM_PER_RAD_PER_SEC,
            mid_left_rpm: sp.mid_left_speed * RPM_PER_RAD_PER_SEC,
            mid_right_rpm: sp.mid_right_speed * RPM_PER_RAD_PER_SEC,
            front_left_steering: sp.front_left_angle,
            front_right_steering: sp.front_right_angle,
            rear_left_steering: sp.rear_left_angle,
            rear_right_steering: sp.rear_right_angle,
        }
    }
}

// Per-wheel feedback from the hardware node -> runtime, read-only each
// cycle. Wheel positions in accumulated radians, drive velocities in
// rpm, steering positions in radians; one entry per steered wheel
// position, front-to-rear.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaseFeedback {
    pub left_wheel_position: Vec<f64>,
    pub right_wheel_position: Vec<f64>,
    pub left_wheel_rpm: Vec<f64>,
    pub right_wheel_rpm: Vec<f64>,
    pub left_steering_angle: Vec<f64>,
    pub right_steering_angle: Vec<f64>,
}

// Pose + velocity estimate published for downstream odometry consumers.
// `heading` is an unbounded accumulator (not wrapped to +/-pi).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OdometryState {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub linear: f64,
    pub angular: f64,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    Fault,
}
