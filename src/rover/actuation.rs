/**
 * Differential Drive Actuation
 *
 * Converts (v, w) into wheel angular velocities, wheel velocities into
 * signed duty cycles through the motor calibration, and duty cycles into
 * firmware commands. Writes are fire-and-forget.
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::warn;

use crate::calibration::wheel_duty;
use crate::config::RoverConfig;
use crate::uart::{Command, CommandSink};

/// Tilt servo range (degrees)
pub const TILT_MIN_DEG: f64 = 15.0;
pub const TILT_MAX_DEG: f64 = 100.0;

/// Two-wheel kinematics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffDrive {
    /// Distance between the wheels (m)
    pub wheelbase: f64,
    /// Wheel radius (m)
    pub wheel_radius: f64,
}

impl DiffDrive {
    pub fn new(wheelbase: f64, wheel_radius: f64) -> Self {
        Self { wheelbase, wheel_radius }
    }

    pub fn from_config(config: &RoverConfig) -> Self {
        Self::new(config.wheelbase, config.wheel_radius)
    }

    /// Left and right wheel angular velocity (rad/s)
    pub fn wheel_speeds(&self, v: f64, w: f64) -> (f64, f64) {
        let half_track = self.wheelbase / 2.0;
        let v_left = v - half_track * w;
        let v_right = v + half_track * w;
        (v_left / self.wheel_radius, v_right / self.wheel_radius)
    }

    /// Wheel duty command for (v, w)
    pub fn command(&self, v: f64, w: f64) -> Command {
        let (w_left, w_right) = self.wheel_speeds(v, w);
        Command::WheelSpeeds {
            left: wheel_duty(w_left),
            right: wheel_duty(w_right),
        }
    }
}

/// Tilt angle (rad) to servo degrees, clamped then truncated.
/// NaN parks the servo at the lower stop.
pub fn tilt_degrees(alpha: f64) -> i32 {
    if alpha.is_nan() {
        return TILT_MIN_DEG as i32;
    }
    alpha.to_degrees().clamp(TILT_MIN_DEG, TILT_MAX_DEG) as i32
}

/// Turns motion requests into firmware commands
pub struct Actuator {
    drive: DiffDrive,
    sink: Arc<dyn CommandSink>,
    running: AtomicBool,
}

impl Actuator {
    pub fn new(drive: DiffDrive, sink: Arc<dyn CommandSink>) -> Self {
        Self {
            drive,
            sink,
            running: AtomicBool::new(false),
        }
    }

    pub fn kinematics(&self) -> &DiffDrive {
        &self.drive
    }

    /// Drive with linear velocity `v` (m/s) and angular velocity `w` (rad/s)
    pub fn drive(&self, v: f64, w: f64) -> Command {
        let command = self.drive.command(v, w);
        self.send(&command);
        command
    }

    /// Tilt the camera mount to `alpha` radians
    pub fn tilt(&self, alpha: f64) -> Command {
        let command = Command::Tilt { degrees: tilt_degrees(alpha) };
        self.send(&command);
        command
    }

    /// Enable or disable the motor driver
    pub fn set_running(&self, run: bool) -> Command {
        self.running.store(run, Ordering::SeqCst);
        let command = Command::Setup { run };
        self.send(&command);
        command
    }

    /// Last requested run state
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn send(&self, command: &Command) {
        if let Err(e) = self.sink.send(command) {
            warn!("[actuation] write failed, {:?} lost: {}", command, e);
        }
    }
}
