pub mod actuation;
pub mod executor;
pub mod manager;
pub mod navigator;
pub mod pose;

pub use actuation::{Actuator, DiffDrive};
pub use executor::{ExecutorState, Links, RoverExecutor, CONTROL_PERIOD};
pub use manager::LrnManager;
pub use navigator::{normalize_angle, PotentialFieldNavigator, VelocityCommand};
pub use pose::{FixedPose, Pose2D, PoseProvider, Vec2};
