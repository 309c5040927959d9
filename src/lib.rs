pub mod calibration;
pub mod config;
pub mod error;
pub mod pubsub;
pub mod remote;
pub mod ring_buffer;
pub mod rover;
pub mod sensors;
pub mod uart;

pub use ring_buffer::RingBuffer;

pub use config::{LrnConfig, NavigatorConfig, RemoteConfig, RoverConfig};
pub use error::{Error, Result};

pub use pubsub::{Envelope, EndpointRegistry, PubSocket, SubSocket};

pub use rover::{
    Actuator, DiffDrive,
    LrnManager, RoverExecutor, Links,
    PotentialFieldNavigator, VelocityCommand,
    Pose2D, Vec2, PoseProvider, FixedPose,
};

pub use sensors::{SensorCache, SensorReading};
pub use uart::{Command, Connection, MockTransport, SerialTransport, Transport};
