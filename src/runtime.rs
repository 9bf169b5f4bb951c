// 50 Hz control loop with watchdog
//
// Each cycle: drain the latest command and feedback, override with a
// brake command if the watchdog tripped, advance odometry, bound the
// command, solve the kinematics, and publish the wheel/steering
// setpoints. A cycle that hits a runtime input error is aborted: nothing
// is published, the previous setpoints hold, and the next scheduled
// cycle is the retry.

use std::time::{Duration, Instant};

use tokio::time::interval;
use tracing::{info, warn};

use crate::config::{
    RuntimeConfig, CMD_TIMEOUT, LOOP_HZ, ODOM_PUBLISH_HZ, TOPIC_CMD_BASE, TOPIC_CMD_LIMITED,
    TOPIC_FB_BASE, TOPIC_HEALTH, TOPIC_ODOM, TOPIC_RT_BASE,
};
use crate::control::kinematics::EffectiveGeometry;
use crate::control::{
    solve, CommandHistory, ControlError, FeedbackMode, Odometry, Quadrant, SpeedLimiter,
    RAD_PER_SEC_PER_RPM,
};
use crate::messages::{BaseFeedback, OdometryState, RuntimeHealth, TwistCommand, WheelActuation};

/// Everything one successful cycle wants published.
#[derive(Debug, Clone)]
pub struct CycleOutput {
    pub actuation: WheelActuation,
    pub limited: Option<TwistCommand>,
    pub odometry: Option<OdometryState>,
}

pub struct Runtime {
    config: RuntimeConfig,
    geometry: EffectiveGeometry,

    // Latest asynchronously delivered inputs. Replaced wholesale on
    // arrival and read once per cycle, so a cycle never sees a
    // half-written value.
    latest_cmd: Option<TwistCommand>,
    cmd_received_at: Instant,
    latest_feedback: Option<BaseFeedback>,

    history: CommandHistory,
    limiter_linear: SpeedLimiter,
    limiter_angular: SpeedLimiter,
    odometry: Odometry,

    health: RuntimeHealth,
    started_at: Instant,
    last_update_at: Option<Instant>,
    next_odom_publish_at: Instant,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        let geometry = config.wheels.effective();
        let mut odometry = Odometry::new(config.velocity_rolling_window_size);
        odometry.set_wheel_params(
            geometry.wheel_separation,
            geometry.wheel_base,
            geometry.left_wheel_radius,
            geometry.right_wheel_radius,
        );

        let now = Instant::now();
        Self {
            limiter_linear: SpeedLimiter::new(config.linear),
            limiter_angular: SpeedLimiter::new(config.angular),
            config,
            geometry,
            latest_cmd: None,
            cmd_received_at: now,
            latest_feedback: None,
            history: CommandHistory::new(),
            odometry,
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
            started_at: now,
            last_update_at: None,
            next_odom_publish_at: now,
        }
    }

    /// Process incoming command
    fn on_command(&mut self, cmd: TwistCommand) {
        info!("Received command: {:?}", &cmd);
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = Instant::now();
    }

    /// Process incoming wheel/steering feedback
    fn on_feedback(&mut self, feedback: BaseFeedback) {
        self.latest_feedback = Some(feedback);
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn odometry(&self) -> &Odometry {
        &self.odometry
    }

    /// Run one control cycle against the wall-clock time `now`, latched
    /// once so the limiter, solver and estimator share a time base.
    fn cycle(&mut self, now: Instant) -> Result<CycleOutput, ControlError> {
        let time = now.saturating_duration_since(self.started_at).as_secs_f64();

        // Watchdog: a stale (or never received) command brakes the base
        // for this cycle without touching the stored command or history.
        let cmd_age = now.saturating_duration_since(self.cmd_received_at);
        let mut cmd = match self.latest_cmd {
            Some(cmd) if cmd_age <= CMD_TIMEOUT => {
                self.health = RuntimeHealth::Ok;
                cmd
            }
            Some(_) => {
                if self.health != RuntimeHealth::CmdStale {
                    warn!("Command stale ({:?} old), braking", cmd_age);
                }
                self.health = RuntimeHealth::CmdStale;
                TwistCommand::default()
            }
            None => {
                self.health = RuntimeHealth::CmdStale;
                TwistCommand::default()
            }
        };

        // Spin-in-place has no turning radius on this geometry; reported,
        // not clamped.
        if cmd.angular != 0.0 && cmd.linear == 0.0 {
            self.health = RuntimeHealth::Fault;
            return Err(ControlError::UndefinedTurningRadius {
                angular: cmd.angular,
            });
        }

        match self.config.feedback_mode {
            FeedbackMode::OpenLoop => {
                self.odometry.update_open_loop(cmd.linear, cmd.angular, time);
            }
            FeedbackMode::Differential => {
                if let Some(feedback) = self.latest_feedback.take() {
                    let (left_pos, right_pos) = reduce_wheel_positions(
                        &feedback,
                        self.config.wheels.wheels_per_side,
                    )
                    .inspect_err(|_| self.health = RuntimeHealth::Fault)?;
                    self.odometry.update(left_pos, right_pos, time);
                }
            }
            FeedbackMode::SingleTrack => {
                if let Some(feedback) = self.latest_feedback.take() {
                    let (angle, speed) = reduce_steering_feedback(
                        &feedback,
                        self.config.wheels.wheels_per_side,
                        &self.geometry,
                    )
                    .inspect_err(|_| self.health = RuntimeHealth::Fault)?;
                    self.odometry.update_from_steering(angle, speed, time);
                }
            }
        }

        let odometry = if now >= self.next_odom_publish_at {
            self.next_odom_publish_at += Duration::from_millis(1000 / ODOM_PUBLISH_HZ);
            Some(OdometryState {
                x: self.odometry.x(),
                y: self.odometry.y(),
                heading: self.odometry.heading(),
                linear: self.odometry.linear(),
                angular: self.odometry.angular(),
            })
        } else {
            None
        };

        let update_dt = self
            .last_update_at
            .map(|t| now.saturating_duration_since(t).as_secs_f64())
            .unwrap_or(0.0);
        self.last_update_at = Some(now);

        let last = self.history.last();
        let second_last = self.history.second_last();
        self.limiter_linear
            .limit(&mut cmd.linear, last.linear, second_last.linear, update_dt);
        self.limiter_angular
            .limit(&mut cmd.angular, last.angular, second_last.angular, update_dt);
        self.history.push(cmd);

        let limited = self.config.publish_limited_velocity.then_some(cmd);

        let setpoints = solve(cmd.linear, cmd.angular, &self.config.wheels)
            .inspect_err(|_| self.health = RuntimeHealth::Fault)?;

        Ok(CycleOutput {
            actuation: WheelActuation::from(&setpoints),
            limited,
            odometry,
        })
    }
}

/// Average per-side wheel positions for the differential odometry path.
fn reduce_wheel_positions(
    feedback: &BaseFeedback,
    wheels_per_side: usize,
) -> Result<(f64, f64), ControlError> {
    for (what, samples) in [
        ("wheel position", &feedback.left_wheel_position),
        ("wheel position", &feedback.right_wheel_position),
    ] {
        if samples.len() != wheels_per_side {
            return Err(ControlError::FeedbackLengthMismatch {
                what,
                expected: wheels_per_side,
                got: samples.len(),
            });
        }
    }

    let mut left_position_mean = 0.0;
    let mut right_position_mean = 0.0;
    for index in 0..wheels_per_side {
        let left = feedback.left_wheel_position[index];
        let right = feedback.right_wheel_position[index];
        if !left.is_finite() {
            return Err(ControlError::NonFiniteFeedback {
                side: "left",
                what: "wheel position",
            });
        }
        if !right.is_finite() {
            return Err(ControlError::NonFiniteFeedback {
                side: "right",
                what: "wheel position",
            });
        }
        left_position_mean += left;
        right_position_mean += right;
    }

    let n = wheels_per_side as f64;
    Ok((left_position_mean / n, right_position_mean / n))
}

/// Reduce per-wheel feedback to one (steering angle, wheel speed) pair
/// for the single-track odometry path.
///
/// The quadrant is classified from the first left wheel's velocity/angle
/// pair and fixes the signs of the reduced magnitudes: speed follows the
/// forward quadrants, angle follows the counter-clockwise ones. The
/// wheel angular rate is scaled by the drive radius so the returned
/// speed is a linear m/s, dimensionally consistent with the solver.
fn reduce_steering_feedback(
    feedback: &BaseFeedback,
    wheels_per_side: usize,
    geometry: &EffectiveGeometry,
) -> Result<(f64, f64), ControlError> {
    for (what, samples) in [
        ("drive velocity", &feedback.left_wheel_rpm),
        ("drive velocity", &feedback.right_wheel_rpm),
        ("steering angle", &feedback.left_steering_angle),
        ("steering angle", &feedback.right_steering_angle),
    ] {
        if samples.len() != wheels_per_side {
            return Err(ControlError::FeedbackLengthMismatch {
                what,
                expected: wheels_per_side,
                got: samples.len(),
            });
        }
    }

    let mut left_velocity_mean = 0.0;
    let mut right_velocity_mean = 0.0;
    let mut left_angle_mean = 0.0;
    let mut right_angle_mean = 0.0;
    let mut quadrant = Quadrant::ForwardCcw;

    for index in 0..wheels_per_side {
        let left_velocity = feedback.left_wheel_rpm[index] * RAD_PER_SEC_PER_RPM;
        let right_velocity = feedback.right_wheel_rpm[index] * RAD_PER_SEC_PER_RPM;
        let left_angle = feedback.left_steering_angle[index];
        let right_angle = feedback.right_steering_angle[index];

        if index == 0 {
            quadrant = Quadrant::classify(left_velocity, left_angle);
        }

        if !left_velocity.is_finite() || !right_velocity.is_finite() {
            return Err(ControlError::NonFiniteFeedback {
                side: if left_velocity.is_finite() { "right" } else { "left" },
                what: "drive velocity",
            });
        }
        if !left_angle.is_finite() || !right_angle.is_finite() {
            return Err(ControlError::NonFiniteFeedback {
                side: if left_angle.is_finite() { "right" } else { "left" },
                what: "steering angle",
            });
        }

        left_velocity_mean += left_velocity.abs();
        right_velocity_mean += right_velocity.abs();
        left_angle_mean += left_angle.abs();
        right_angle_mean += right_angle.abs();
    }

    let n = wheels_per_side as f64;
    left_velocity_mean /= n;
    right_velocity_mean /= n;
    left_angle_mean /= n;
    right_angle_mean /= n;

    let velocity_sign = if quadrant.forward() { 1.0 } else { -1.0 };
    let angle_sign = if quadrant.ccw() { 1.0 } else { -1.0 };

    let wheel_rate = left_velocity_mean.min(right_velocity_mean) * velocity_sign;
    let angle = left_angle_mean.max(right_angle_mean) * angle_sign;

    let drive_radius = 0.5 * (geometry.left_wheel_radius + geometry.right_wheel_radius);
    Ok((angle, wheel_rate * drive_radius))
}

pub async fn run(config: RuntimeConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    config.validate()?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_cmd = session.declare_subscriber(TOPIC_CMD_BASE).await?;
    let sub_feedback = session.declare_subscriber(TOPIC_FB_BASE).await?;
    let pub_actuation = session.declare_publisher(TOPIC_RT_BASE).await?;
    let pub_odometry = session.declare_publisher(TOPIC_ODOM).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;
    let pub_limited = if config.publish_limited_velocity {
        Some(session.declare_publisher(TOPIC_CMD_LIMITED).await?)
    } else {
        None
    };

    let mut runtime = Runtime::new(config);
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout, feedback mode {:?}",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis(),
        runtime.config.feedback_mode
    );
    info!("Subscribed to: {}, {}", TOPIC_CMD_BASE, TOPIC_FB_BASE);
    info!(
        "Publishing to: {}, {}, {}",
        TOPIC_RT_BASE, TOPIC_ODOM, TOPIC_HEALTH
    );

    loop {
        tick.tick().await;

        // 1. Drain all pending inputs (non-blocking), keep latest
        while let Ok(Some(sample)) = sub_cmd.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<TwistCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }
        while let Ok(Some(sample)) = sub_feedback.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<BaseFeedback>(&payload) {
                Ok(feedback) => runtime.on_feedback(feedback),
                Err(e) => warn!("Failed to parse feedback: {}", e),
            }
        }

        // 2. Run the control cycle against one latched clock read
        match runtime.cycle(Instant::now()) {
            Ok(output) => {
                pub_actuation
                    .put(serde_json::to_string(&output.actuation)?)
                    .await?;
                if let (Some(publisher), Some(limited)) = (&pub_limited, output.limited) {
                    publisher.put(serde_json::to_string(&limited)?).await?;
                }
                if let Some(odometry) = output.odometry {
                    pub_odometry.put(serde_json::to_string(&odometry)?).await?;
                }
            }
            // Previous setpoints hold; the next cycle is the retry.
            Err(e) => warn!("Control cycle aborted: {}", e),
        }

        // 3. Publish health
        pub_health
            .put(serde_json::to_string(&runtime.health())?)
            .await?;
    }
}
