//! Latest sensor readings and the decoder that feeds them
//!
//! The serial reader thread is the only writer. The control loop and the
//! telemetry path take whole-reading snapshots, so a group (3 IR, 3 acc or
//! 3 gyro values) is always observed either fully old or fully new.

use crate::calibration::{accel_to_g, gyro_to_dps, raw_to_distance};
use crate::remote::TelemetryPublisher;
use crate::uart::protocol::{decode_line, FrameError, SensorGroup};
use log::{debug, warn};
use parking_lot::RwLock;
use std::sync::Arc;

/// Values of one sensor group
pub type Triple = [f64; 3];

/// Last known value of every sensor group, `None` until the first packet
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorReading {
    /// IR distances (m), sensors at +30°, 0°, -30°
    pub ir: Option<Triple>,
    /// Accelerometer (g)
    pub acc: Option<Triple>,
    /// Gyroscope (°/s)
    pub gyro: Option<Triple>,
    /// Ultrasonic distance (m), not reported by the current firmware
    pub ultrasonic: Option<f64>,
}

/// Shared, single-writer sensor cache
#[derive(Debug, Default)]
pub struct SensorCache {
    reading: RwLock<SensorReading>,
}

impl SensorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consistent copy of all groups
    pub fn snapshot(&self) -> SensorReading {
        *self.reading.read()
    }

    /// Convert raw frame values and replace one group atomically.
    ///
    /// A value count other than the group's arity leaves the cache untouched.
    pub fn apply(&self, group: SensorGroup, raw: &[f64]) -> Result<(), FrameError> {
        let raw: Triple = raw.try_into().map_err(|_| FrameError::ArityMismatch {
            group,
            expected: group.arity(),
            actual: raw.len(),
        })?;

        let converted = match group {
            // firmware sends integral ADC counts; truncate like the fixed-point table expects
            SensorGroup::Ir => raw.map(|v| raw_to_distance(v as i64)),
            SensorGroup::Acc => raw.map(accel_to_g),
            SensorGroup::Gyr => raw.map(gyro_to_dps),
        };

        let mut reading = self.reading.write();
        match group {
            SensorGroup::Ir => reading.ir = Some(converted),
            SensorGroup::Acc => reading.acc = Some(converted),
            SensorGroup::Gyr => reading.gyro = Some(converted),
        }
        Ok(())
    }
}

/// Applies received lines to the cache and publishes telemetry after updates
pub struct SensorDecoder {
    cache: Arc<SensorCache>,
    telemetry: Option<TelemetryPublisher>,
}

impl SensorDecoder {
    pub fn new(cache: Arc<SensorCache>, telemetry: Option<TelemetryPublisher>) -> Self {
        Self { cache, telemetry }
    }

    /// Decode one line; returns how many sensor groups were updated
    pub fn handle_line(&self, line: &str) -> usize {
        let mut applied = 0;

        for result in decode_line(line) {
            let outcome = result.and_then(|frame| {
                let group = frame.sensor_group()?;
                self.cache.apply(group, &frame.values)
            });
            match outcome {
                Ok(()) => applied += 1,
                Err(e @ FrameError::Unterminated(_)) => debug!("[sensors] {}", e),
                Err(e) => warn!("[sensors] dropping frame: {}", e),
            }
        }

        if applied > 0 {
            if let Some(telemetry) = &self.telemetry {
                telemetry.publish(&self.cache.snapshot());
            }
        }
        applied
    }

    pub fn cache(&self) -> &Arc<SensorCache> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::{EndpointRegistry, SubSocket};
    use crate::remote::messages::{TelemetryMessage, SENSORS_TOPIC};
    use std::time::Duration;

    fn decoder() -> SensorDecoder {
        SensorDecoder::new(Arc::new(SensorCache::new()), None)
    }

    #[test]
    fn test_starts_empty() {
        let cache = SensorCache::new();
        assert_eq!(cache.snapshot(), SensorReading::default());
    }

    #[test]
    fn test_ir_frame_updates_cache() {
        let decoder = decoder();
        assert_eq!(decoder.handle_line("<ir,3,108,50,700>"), 1);
        let reading = decoder.cache().snapshot();
        assert_eq!(reading.ir, Some([0.8, 0.8, 0.07]));
        assert_eq!(reading.acc, None);
    }

    #[test]
    fn test_imu_frames_are_scaled() {
        let decoder = decoder();
        assert_eq!(decoder.handle_line("<acc,3,0,8190,-8190><gyr,3,32768,0,-327.68>"), 2);
        let reading = decoder.cache().snapshot();
        let acc = reading.acc.unwrap();
        assert!((acc[1] - 1.0).abs() < 1e-12);
        assert!((acc[2] + 1.0).abs() < 1e-12);
        let gyro = reading.gyro.unwrap();
        assert!((gyro[0] - 1000.0).abs() < 1e-9);
        assert!((gyro[2] + 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_count_mismatch_leaves_cache_unchanged() {
        let decoder = decoder();
        decoder.handle_line("<ir,3,200,200,200>");
        let before = decoder.cache().snapshot();
        assert_eq!(decoder.handle_line("<ir,3,108,108>"), 0);
        assert_eq!(decoder.cache().snapshot(), before);
    }

    #[test]
    fn test_wrong_arity_is_rejected_whole() {
        let decoder = decoder();
        assert_eq!(decoder.handle_line("<gyr,2,1,2>"), 0);
        assert_eq!(decoder.handle_line("<acc,4,1,2,3,4>"), 0);
        assert_eq!(decoder.cache().snapshot(), SensorReading::default());
    }

    #[test]
    fn test_unknown_tag_dropped_others_applied() {
        let decoder = decoder();
        assert_eq!(decoder.handle_line("<temp,1,21><ir,3,667,667,667>"), 1);
        assert_eq!(decoder.cache().snapshot().ir, Some([0.07; 3]));
    }

    #[test]
    fn test_last_value_is_kept() {
        let decoder = decoder();
        decoder.handle_line("<ir,3,108,108,108>");
        decoder.handle_line("<acc,3,1,2,3>");
        assert_eq!(decoder.cache().snapshot().ir, Some([0.8; 3]));
    }

    #[test]
    fn test_update_publishes_telemetry() {
        let registry = Arc::new(EndpointRegistry::new());
        let mut telemetry_sub = registry.subscriber(7000);
        telemetry_sub.subscribe(SENSORS_TOPIC).unwrap();

        let telemetry = TelemetryPublisher::new(Arc::new(registry.publisher(7000)));
        let decoder = SensorDecoder::new(Arc::new(SensorCache::new()), Some(telemetry));

        decoder.handle_line("garbage without frames");
        assert!(telemetry_sub.receive(Duration::from_millis(10)).unwrap().is_none());

        decoder.handle_line("<ir,3,108,108,108>");
        let envelope = telemetry_sub.receive(Duration::from_millis(100)).unwrap().unwrap();
        assert_eq!(envelope.topic, SENSORS_TOPIC);
        let message: TelemetryMessage = serde_json::from_slice(&envelope.payload).unwrap();
        assert_eq!(message.ir, [Some(0.8); 3]);
        assert_eq!(message.acc, [None; 3]);
    }
}
