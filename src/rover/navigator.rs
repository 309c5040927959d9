/**
 * Potential Field Navigator
 *
 * Each control tick:
 * 1. Goal attracts linearly: f_att = -K_ATT * (pos - goal)
 * 2. Every IR obstacle repels with -K_REP * exp(-rho / RHO_0) along its bearing
 * 3. Heading follows the total force; v and w come from the heading error
 * 4. Within ARRIVAL_RADIUS of the goal the rover holds still
 */

use std::f64::consts::{PI, TAU};

use crate::config::NavigatorConfig;
use crate::sensors::SensorReading;
use super::pose::{Pose2D, Vec2};

/// Goal is reached inside this distance (m)
pub const ARRIVAL_RADIUS: f64 = 0.1;

/// Readings at or below this are ignored
const MIN_OBSTACLE_DISTANCE: f64 = 1e-5;

/// Bearing of the first IR sensor and the spacing between sensors (rad)
const IR_BEARING_START: f64 = 30.0 * PI / 180.0;
const IR_BEARING_STEP: f64 = 30.0 * PI / 180.0;

/// Commanded linear (m/s) and angular (rad/s) velocity
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VelocityCommand {
    pub v: f64,
    pub w: f64,
}

/// Bearing of IR sensor `index` in the body frame: +30°, 0°, -30°
pub fn ir_bearing(index: usize) -> f64 {
    IR_BEARING_START - index as f64 * IR_BEARING_STEP
}

/// Wrap an angle into (-PI, PI]
pub fn normalize_angle(mut angle: f64) -> f64 {
    if !angle.is_finite() {
        return angle;
    }
    if angle.abs() > 2.0 * TAU {
        angle %= TAU;
    }
    while angle > PI {
        angle -= TAU;
    }
    while angle <= -PI {
        angle += TAU;
    }
    angle
}

/// Stateless potential field controller
#[derive(Debug, Clone, Copy)]
pub struct PotentialFieldNavigator {
    config: NavigatorConfig,
}

impl PotentialFieldNavigator {
    pub fn new(config: NavigatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.config
    }

    /// Pull toward the goal, grows linearly with distance
    pub fn attraction(&self, pose: &Pose2D, goal: &Vec2) -> Vec2 {
        -(pose.position - *goal) * self.config.k_att
    }

    /// Sum of obstacle pushes, in the body frame
    pub fn repulsion(&self, sensors: &SensorReading) -> Vec2 {
        let mut force = Vec2::default();
        let Some(ir) = sensors.ir else {
            return force;
        };
        if self.config.rho_0 <= 0.0 {
            return force;
        }

        for (i, &rho) in ir.iter().enumerate() {
            if rho <= MIN_OBSTACLE_DISTANCE {
                continue;
            }
            // obstacle at rho along the bearing, pushed along the same unit vector
            let obstacle = Vec2::from_angle(ir_bearing(i)) * rho;
            let factor = -self.config.k_rep * (-rho / self.config.rho_0).exp();
            force = force + obstacle * (factor / rho);
        }
        force
    }

    /// One control tick
    pub fn step(&self, pose: &Pose2D, goal: &Vec2, sensors: &SensorReading) -> VelocityCommand {
        if pose.position.distance(goal) < ARRIVAL_RADIUS {
            return VelocityCommand::default();
        }

        let force = self.attraction(pose, goal) + self.repulsion(sensors);
        let heading_error = normalize_angle(force.angle() - pose.theta);

        let w = (self.config.k_theta * heading_error).clamp(-self.config.w_max, self.config.w_max);
        let v = (self.config.v_max * heading_error.cos()).max(0.0);

        VelocityCommand { v, w }
    }
}
