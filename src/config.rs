//! Configuration for the rover control core
//!
//! Loaded from a JSON document (`nav.json`) with two sections:
//!
//! ```json
//! {
//!   "rover": {
//!     "wheelbase": 0.3,
//!     "wheel_radius": 0.05,
//!     "platform": { "port": "ttyUSB0" },
//!     "remote_api": { "enabled": true, "port": 5555 }
//!   },
//!   "navigator": { "K_ATT": 0.1, "K_REP": 50.0, "RHO_0": 0.3,
//!                  "K_THETA": 2.0, "V_MAX": 0.5, "W_MAX": 1.0 }
//! }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level configuration handed to the manager
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LrnConfig {
    pub rover: RoverConfig,
    #[serde(default)]
    pub navigator: NavigatorConfig,
}

/// Physical rover parameters and links
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoverConfig {
    /// Distance between the wheels (m)
    pub wheelbase: f64,
    /// Wheel radius (m)
    pub wheel_radius: f64,
    /// Serial link to the microcontroller
    pub platform: PlatformConfig,
    /// Telemetry/command bridge, absent means disabled
    #[serde(default, rename = "remote_api")]
    pub remote: Option<RemoteConfig>,
    /// Forward navigator output to the wheels
    #[serde(default)]
    pub autonomous: bool,
}

/// Serial port of the microcontroller
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlatformConfig {
    pub port: String,
}

/// Remote pub/sub bridge. Telemetry is published on `port`, commands arrive on `port + 1`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_enabled")]
    pub enabled: bool,
    #[serde(default = "default_remote_port")]
    pub port: u16,
}

/// Potential field gains and speed limits
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct NavigatorConfig {
    /// Attraction gain
    #[serde(rename = "K_ATT")]
    pub k_att: f64,
    /// Repulsion gain
    #[serde(rename = "K_REP")]
    pub k_rep: f64,
    /// Obstacle influence radius (m)
    #[serde(rename = "RHO_0")]
    pub rho_0: f64,
    /// Heading gain
    #[serde(rename = "K_THETA")]
    pub k_theta: f64,
    /// Max linear speed (m/s)
    #[serde(rename = "V_MAX")]
    pub v_max: f64,
    /// Max angular speed (rad/s)
    #[serde(rename = "W_MAX")]
    pub w_max: f64,
}

fn default_remote_enabled() -> bool {
    true
}

fn default_remote_port() -> u16 {
    5555
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: default_remote_enabled(),
            port: default_remote_port(),
        }
    }
}

impl RemoteConfig {
    /// Port the command subscriber binds to
    pub fn command_port(&self) -> u16 {
        self.port.saturating_add(1)
    }
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            k_att: 0.1,
            k_rep: 50.0,
            rho_0: 0.3,
            k_theta: 2.0,
            v_max: 0.5,
            w_max: 1.0,
        }
    }
}

impl PlatformConfig {
    /// OS path of the serial device.
    ///
    /// Bare names such as `ttyUSB0` are resolved under `/dev/`; on Windows
    /// `COMn` names get the `\\.\` device namespace prefix.
    pub fn device_path(&self) -> String {
        #[cfg(windows)]
        {
            if self.port.starts_with("COM") {
                return format!(r"\\.\{}", self.port);
            }
            self.port.clone()
        }
        #[cfg(not(windows))]
        {
            if self.port.starts_with('/') {
                self.port.clone()
            } else {
                format!("/dev/{}", self.port)
            }
        }
    }
}

impl RoverConfig {
    /// Remote settings if the bridge is switched on
    pub fn enabled_remote(&self) -> Option<RemoteConfig> {
        self.remote.filter(|r| r.enabled)
    }
}

impl LrnConfig {
    /// Load and validate configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: LrnConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Range-check every value the control core divides by or clamps with
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("rover.wheelbase", self.rover.wheelbase),
            ("rover.wheel_radius", self.rover.wheel_radius),
            ("navigator.K_ATT", self.navigator.k_att),
            ("navigator.K_REP", self.navigator.k_rep),
            ("navigator.RHO_0", self.navigator.rho_0),
            ("navigator.K_THETA", self.navigator.k_theta),
            ("navigator.V_MAX", self.navigator.v_max),
            ("navigator.W_MAX", self.navigator.w_max),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::Config(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }

        if self.rover.platform.port.trim().is_empty() {
            return Err(Error::Config("rover.platform.port must not be empty".into()));
        }

        if let Some(remote) = self.rover.remote {
            if remote.port == u16::MAX {
                return Err(Error::Config(format!(
                    "rover.remote_api.port must leave room for the command port, got {}",
                    remote.port
                )));
            }
        }

        Ok(())
    }
}
