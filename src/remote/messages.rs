//! Documents exchanged on the remote channel
//!
//! All payloads are JSON. Telemetry goes out on [`SENSORS_TOPIC`]; commands
//! come in on the three command topics. A command missing a field, or with a
//! field of the wrong type, fails to deserialize and is dropped by the caller.

use crate::sensors::{SensorReading, Triple};
use serde::{Deserialize, Serialize};

/// Topic of sensor snapshots
pub const SENSORS_TOPIC: &str = "lunar-rover-sensors";
/// Topic of `{v, w}` drive commands
pub const DRIVE_TOPIC: &str = "motors-commands";
/// Topic of `{alpha}` tilt commands
pub const TILT_TOPIC: &str = "tilt-motor-command";
/// Topic of `{state}` run/stop commands
pub const SETUP_TOPIC: &str = "motors-setup";

/// Topics the command subscriber listens to
pub const COMMAND_TOPICS: [&str; 3] = [DRIVE_TOPIC, TILT_TOPIC, SETUP_TOPIC];

/// Sensor snapshot, absent groups encode as `[null, null, null]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    pub ir: [Option<f64>; 3],
    pub acc: [Option<f64>; 3],
    pub gyro: [Option<f64>; 3],
}

fn group(values: Option<Triple>) -> [Option<f64>; 3] {
    values.map_or([None; 3], |v| v.map(Some))
}

impl From<&SensorReading> for TelemetryMessage {
    fn from(reading: &SensorReading) -> Self {
        Self {
            ir: group(reading.ir),
            acc: group(reading.acc),
            gyro: group(reading.gyro),
        }
    }
}

/// Linear (m/s) and angular (rad/s) velocity request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriveCommand {
    pub v: f64,
    pub w: f64,
}

/// Camera tilt request in radians
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TiltCommand {
    pub alpha: f64,
}

/// Motor run/stop request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupCommand {
    pub state: RunState,
}

/// `state` is either a boolean or a word, where only `"run"` means run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunState {
    Flag(bool),
    Word(String),
}

impl RunState {
    pub fn is_run(&self) -> bool {
        match self {
            RunState::Flag(run) => *run,
            RunState::Word(word) => word == "run",
        }
    }
}
