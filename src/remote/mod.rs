//! Remote telemetry/command bridge
//!
//! Telemetry is published after every decoded sensor update. Commands are
//! received on a dedicated thread and dispatched to the [`Actuator`]:
//!
//! | Topic                | Document           | Action                 |
//! |----------------------|--------------------|------------------------|
//! | `motors-commands`    | `{v, w}`           | differential drive     |
//! | `tilt-motor-command` | `{alpha}`          | camera tilt            |
//! | `motors-setup`       | `{state}`          | `<start,100>`/`<stop,0>` |
//!
//! An invalid document is logged and dropped. A receive failure other than
//! a clean shutdown ends the command thread only.

pub mod messages;
pub mod tcp;

pub use tcp::{TcpPublisher, TcpSubscriber};

use crate::error::{Error, Result};
use crate::pubsub::{Envelope, PubSocket, SubSocket};
use crate::rover::Actuator;
use crate::sensors::SensorReading;
use log::{debug, error, info, trace, warn};
use messages::{
    DriveCommand, SetupCommand, TelemetryMessage, TiltCommand, COMMAND_TOPICS, DRIVE_TOPIC,
    SENSORS_TOPIC, SETUP_TOPIC, TILT_TOPIC,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long one receive may block before the stop flag is checked again
pub const RECEIVE_TIMEOUT: Duration = Duration::from_millis(100);

/// Serializes sensor snapshots onto the telemetry topic
#[derive(Clone)]
pub struct TelemetryPublisher {
    sink: Arc<dyn PubSocket>,
}

impl TelemetryPublisher {
    pub fn new(sink: Arc<dyn PubSocket>) -> Self {
        Self { sink }
    }

    /// Best effort, failures are logged
    pub fn publish(&self, reading: &SensorReading) {
        let payload = match serde_json::to_vec(&TelemetryMessage::from(reading)) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("[remote] failed to encode telemetry: {}", e);
                return;
            }
        };
        if let Err(e) = self.sink.publish(SENSORS_TOPIC, &payload) {
            warn!("[remote] failed to publish telemetry: {}", e);
        }
    }
}

/// Apply one command message to the actuator
pub fn dispatch(actuator: &Actuator, envelope: &Envelope) -> Result<()> {
    match envelope.topic.as_str() {
        DRIVE_TOPIC => {
            let cmd: DriveCommand = serde_json::from_slice(&envelope.payload)?;
            trace!("[remote] drive v={} w={}", cmd.v, cmd.w);
            actuator.drive(cmd.v, cmd.w);
        }
        TILT_TOPIC => {
            let cmd: TiltCommand = serde_json::from_slice(&envelope.payload)?;
            trace!("[remote] tilt alpha={}", cmd.alpha);
            actuator.tilt(cmd.alpha);
        }
        SETUP_TOPIC => {
            let cmd: SetupCommand = serde_json::from_slice(&envelope.payload)?;
            trace!("[remote] setup run={}", cmd.state.is_run());
            actuator.set_running(cmd.state.is_run());
        }
        other => return Err(Error::UnknownTopic(other.to_string())),
    }
    Ok(())
}

/// Command subscriber thread
pub struct RemoteChannel {
    handle: Option<JoinHandle<()>>,
}

impl RemoteChannel {
    /// Subscribe `source` to the command topics and start receiving
    pub fn spawn(
        mut source: Box<dyn SubSocket>,
        actuator: Arc<Actuator>,
        stop: Arc<AtomicBool>,
    ) -> Result<Self> {
        for topic in COMMAND_TOPICS {
            source.subscribe(topic)?;
        }

        let handle = thread::Builder::new()
            .name("remote-commands".to_string())
            .spawn(move || command_loop(source, &actuator, &stop))
            .map_err(|e| Error::ThreadSpawn(e.to_string()))?;

        Ok(Self {
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("[remote] command thread panicked");
            }
        }
    }
}

fn command_loop(mut source: Box<dyn SubSocket>, actuator: &Actuator, stop: &AtomicBool) {
    info!("[remote] command thread started");
    while !stop.load(Ordering::SeqCst) {
        match source.receive(RECEIVE_TIMEOUT) {
            Ok(Some(envelope)) => {
                if stop.load(Ordering::SeqCst) {
                    debug!("[remote] stopping, dropping message on {}", envelope.topic);
                    break;
                }
                if let Err(e) = dispatch(actuator, &envelope) {
                    warn!("[remote] dropping message on {}: {}", envelope.topic, e);
                }
            }
            Ok(None) => {}
            Err(Error::ChannelClosed) => {
                debug!("[remote] command channel closed");
                break;
            }
            Err(e) => {
                error!("[remote] failed to receive data, ending: {}", e);
                break;
            }
        }
    }
    info!("[remote] command thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::EndpointRegistry;
    use crate::rover::DiffDrive;
    use crate::uart::{MockTransport, SerialWriter};
    use std::time::Instant;

    fn actuator(mock: &MockTransport) -> Arc<Actuator> {
        let writer = SerialWriter::new(Box::new(mock.clone()));
        Arc::new(Actuator::new(DiffDrive::new(0.3, 0.05), Arc::new(writer)))
    }

    fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    #[test]
    fn test_dispatch_drive() {
        let mock = MockTransport::new();
        let actuator = actuator(&mock);
        dispatch(&actuator, &Envelope::new(DRIVE_TOPIC, br#"{"v":0.4,"w":0}"#)).unwrap();
        assert_eq!(mock.written_lines(), vec!["<ws,2,88,88>"]);
    }

    #[test]
    fn test_dispatch_tilt_and_setup() {
        let mock = MockTransport::new();
        let actuator = actuator(&mock);
        dispatch(&actuator, &Envelope::new(TILT_TOPIC, br#"{"alpha":0.5}"#)).unwrap();
        dispatch(&actuator, &Envelope::new(SETUP_TOPIC, br#"{"state":"run"}"#)).unwrap();
        dispatch(&actuator, &Envelope::new(SETUP_TOPIC, br#"{"state":false}"#)).unwrap();
        assert_eq!(
            mock.written_lines(),
            vec!["<ss,1,28>", "<start,100>", "<stop,0>"]
        );
    }

    #[test]
    fn test_dispatch_rejects_invalid_documents() {
        let mock = MockTransport::new();
        let actuator = actuator(&mock);

        assert!(matches!(
            dispatch(&actuator, &Envelope::new(DRIVE_TOPIC, br#"{"v":1}"#)),
            Err(Error::Json(_))
        ));
        assert!(dispatch(&actuator, &Envelope::new(TILT_TOPIC, br#"{"alpha":"up"}"#)).is_err());
        assert!(dispatch(&actuator, &Envelope::new(SETUP_TOPIC, b"{")).is_err());
        assert!(matches!(
            dispatch(&actuator, &Envelope::new("lights", b"{}")),
            Err(Error::UnknownTopic(_))
        ));
        assert!(mock.written().is_empty());
    }

    #[test]
    fn test_channel_survives_bad_message() {
        let registry = EndpointRegistry::new();
        let mock = MockTransport::new();
        let stop = Arc::new(AtomicBool::new(false));

        let mut channel = RemoteChannel::spawn(
            Box::new(registry.subscriber(5556)),
            actuator(&mock),
            Arc::clone(&stop),
        )
        .unwrap();

        let commands = registry.publisher(5556);
        commands.publish(DRIVE_TOPIC, b"garbage").unwrap();
        commands.publish("unrelated-topic", b"{}").unwrap();
        commands.publish(DRIVE_TOPIC, br#"{"v":0.5,"w":0}"#).unwrap();

        assert!(wait_for(|| !mock.written().is_empty()));
        assert_eq!(mock.written_lines(), vec!["<ws,2,139,139>"]);
        assert!(channel.is_running());

        stop.store(true, Ordering::SeqCst);
        channel.join();
        assert!(!channel.is_running());
    }

    #[test]
    fn test_channel_exits_on_shutdown() {
        let registry = EndpointRegistry::new();
        let mock = MockTransport::new();
        let stop = Arc::new(AtomicBool::new(false));

        let mut channel = RemoteChannel::spawn(
            Box::new(registry.subscriber(5558)),
            actuator(&mock),
            Arc::clone(&stop),
        )
        .unwrap();

        registry.close(5558);
        assert!(wait_for(|| !channel.is_running()));
        channel.join();
    }

    /// Delivers one drive command, raising the stop flag as it does
    struct StopOnReceive {
        stop: Arc<AtomicBool>,
    }

    impl SubSocket for StopOnReceive {
        fn subscribe(&mut self, _topic: &str) -> Result<()> {
            Ok(())
        }

        fn receive(&mut self, _timeout: Duration) -> Result<Option<Envelope>> {
            self.stop.store(true, Ordering::SeqCst);
            Ok(Some(Envelope::new(DRIVE_TOPIC, br#"{"v":0.5,"w":0}"#)))
        }
    }

    #[test]
    fn test_command_after_stop_is_dropped() {
        let mock = MockTransport::new();
        let stop = Arc::new(AtomicBool::new(false));
        let source = StopOnReceive {
            stop: Arc::clone(&stop),
        };

        let mut channel =
            RemoteChannel::spawn(Box::new(source), actuator(&mock), Arc::clone(&stop)).unwrap();
        channel.join();

        assert!(stop.load(Ordering::SeqCst));
        assert!(mock.written().is_empty());
    }

    #[test]
    fn test_telemetry_publisher_uses_sensor_topic() {
        let registry = EndpointRegistry::new();
        let mut sub = registry.subscriber(5560);
        sub.subscribe("").unwrap();

        let telemetry = TelemetryPublisher::new(Arc::new(registry.publisher(5560)));
        telemetry.publish(&SensorReading::default());

        let envelope = sub.receive(Duration::from_millis(100)).unwrap().unwrap();
        assert_eq!(envelope.topic, SENSORS_TOPIC);
        let message: TelemetryMessage = serde_json::from_slice(&envelope.payload).unwrap();
        assert_eq!(message.gyro, [None; 3]);
    }
}
