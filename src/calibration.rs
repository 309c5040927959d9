//! Sensor and actuator calibration data
//!
//! - IR distance lookup table (raw ADC counts -> millimetres), evaluated in the
//!   same fixed-point arithmetic the firmware uses
//! - BMI323 IMU scale factors
//! - Duty-cycle polynomial fitted from wheel speed measurements

/// One row of the IR lookup table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationEntry {
    /// ADC value where this interval starts
    pub raw_threshold: i64,
    /// Slope to the next row, scaled by 1024
    pub slope: i64,
    /// Distance at `raw_threshold` (mm)
    pub distance_mm: i64,
}

const fn entry(raw_threshold: i64, slope: i64, distance_mm: i64) -> CalibrationEntry {
    CalibrationEntry { raw_threshold, slope, distance_mm }
}

/// Sharp IR sensor table, ascending by `raw_threshold`
pub const IR_TABLE: [CalibrationEntry; 11] = [
    entry(108, 17653, 800),
    entry(113, 7475, 700),
    entry(127, 10129, 600),
    entry(138, 4212, 500),
    entry(162, 2425, 400),
    entry(204, 1281, 300),
    entry(283, 463, 200),
    entry(504, 193, 100),
    entry(557, 190, 90),
    entry(610, 183, 80),
    entry(667, 0, 70),
];

/// Distance reported when the raw value falls below the table
pub const IR_DEFAULT_DISTANCE_M: f64 = 0.8;

/// Accelerometer counts per mg at the ±4 g range
pub const ACCEL_SCALE_4G: f64 = 8.19;

/// Gyroscope counts per °/s at the ±1000 °/s range
pub const GYRO_SCALE_1000DPS: f64 = 32.768;

/// Below this wheel speed (rad/s) the motors produce no torque
pub const DUTY_DEAD_ZONE: f64 = 4.32;

/// Above this wheel speed (rad/s) the duty cycle saturates
pub const DUTY_SATURATION: f64 = 11.84;

/// Largest duty cycle the motor driver accepts
pub const DUTY_MAX: i32 = 255;

// quintic fit, highest degree first
const DUTY_POLY: [f64; 6] = [0.0443, -1.6146, 23.227, -162.59, 561.92, -731.89];

/// Index of the table interval containing `raw`.
///
/// Returns `None` below the first threshold; values at or above the last
/// threshold map to the last row.
pub fn find_interval(raw: i64) -> Option<usize> {
    let last = IR_TABLE.len() - 1;
    if raw < IR_TABLE[0].raw_threshold {
        return None;
    }
    if raw >= IR_TABLE[last].raw_threshold {
        return Some(last);
    }
    IR_TABLE
        .windows(2)
        .position(|pair| raw >= pair[0].raw_threshold && raw < pair[1].raw_threshold)
}

/// Raw IR reading to distance in metres, `None` if below the table
pub fn lookup_distance(raw: i64) -> Option<f64> {
    let row = IR_TABLE[find_interval(raw)?];
    let dx = raw - row.raw_threshold;
    // arithmetic shift, matches the firmware's fixed-point rounding
    let dy = (-row.slope * dx) >> 10;
    Some((row.distance_mm + dy) as f64 / 1000.0)
}

/// Raw IR reading to distance in metres, falling back to the default when off-table
pub fn raw_to_distance(raw: i64) -> f64 {
    lookup_distance(raw).unwrap_or(IR_DEFAULT_DISTANCE_M)
}

/// Raw accelerometer count to g
pub fn accel_to_g(raw: f64) -> f64 {
    raw / ACCEL_SCALE_4G / 1000.0
}

/// Raw gyroscope count to °/s
pub fn gyro_to_dps(raw: f64) -> f64 {
    raw / GYRO_SCALE_1000DPS
}

/// Unclamped duty magnitude for a wheel speed magnitude (rad/s)
pub fn duty_from_omega(omega: f64) -> f64 {
    if omega.abs() < DUTY_DEAD_ZONE {
        return 0.0;
    }
    if omega > DUTY_SATURATION {
        return DUTY_MAX as f64;
    }
    DUTY_POLY.iter().fold(0.0, |acc, &c| acc * omega + c)
}

/// Signed wheel speed (rad/s) to the integer duty cycle sent to the firmware
pub fn wheel_duty(omega: f64) -> i32 {
    let mut duty = duty_from_omega(omega.abs());
    if omega < 0.0 {
        duty = -duty;
    }
    (duty as i32).clamp(-DUTY_MAX, DUTY_MAX)
}
