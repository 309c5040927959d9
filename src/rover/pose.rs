/**
 * Planar geometry shared by the navigator and the pose source
 */

use std::ops::{Add, Mul, Neg, Sub};

/// Planar vector (position, force)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Unit vector at `angle` radians from the x axis
    pub fn from_angle(angle: f64) -> Self {
        Self::new(angle.cos(), angle.sin())
    }

    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn distance(&self, other: &Vec2) -> f64 {
        (*self - *other).norm()
    }

    /// Direction of the vector, `atan2(y, x)`
    pub fn angle(&self) -> f64 {
        self.y.atan2(self.x)
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, k: f64) -> Vec2 {
        Vec2::new(self.x * k, self.y * k)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;
    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

/// Rover position (m) and heading (rad)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pose2D {
    pub position: Vec2,
    pub theta: f64,
}

impl Pose2D {
    pub const fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { position: Vec2::new(x, y), theta }
    }
}

/// Source of the current pose and the navigation goal
pub trait PoseProvider: Send + Sync {
    fn pose(&self) -> Pose2D;
    fn goal(&self) -> Vec2;
}

/// Constant pose and goal, used until a state estimator is wired in
#[derive(Debug, Clone, Copy)]
pub struct FixedPose {
    pub pose: Pose2D,
    pub goal: Vec2,
}

impl Default for FixedPose {
    fn default() -> Self {
        Self {
            pose: Pose2D::new(0.0, 0.0, 0.0),
            goal: Vec2::new(1.0, 1.0),
        }
    }
}

impl PoseProvider for FixedPose {
    fn pose(&self) -> Pose2D {
        self.pose
    }

    fn goal(&self) -> Vec2 {
        self.goal
    }
}
