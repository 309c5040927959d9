/**
 * Rover Executor
 *
 * Owns one running session:
 * 1. Opens the serial link and starts the reader thread
 * 2. Decodes sensor lines into the cache, publishing telemetry if remote is on
 * 3. Runs the navigator every CONTROL_PERIOD on the control thread
 * 4. Runs the remote command thread if remote is on
 *
 * States: Idle -> Running -> Stopping -> Idle
 */

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{error, info, trace, warn};

use crate::config::{LrnConfig, RemoteConfig, RoverConfig};
use crate::error::{Error, Result};
use crate::pubsub::{PubSocket, SubSocket};
use crate::remote::{RemoteChannel, TcpPublisher, TcpSubscriber, TelemetryPublisher};
use crate::sensors::{SensorCache, SensorDecoder, SensorReading};
use crate::uart::{Connection, SerialTransport, Transport};
use super::actuation::{Actuator, DiffDrive};
use super::navigator::PotentialFieldNavigator;
use super::pose::{FixedPose, PoseProvider};

/// Control loop period
pub const CONTROL_PERIOD: Duration = Duration::from_millis(50);

/// Opens the link to the microcontroller
pub type Connector = Arc<dyn Fn(&RoverConfig) -> Result<Box<dyn Transport>> + Send + Sync>;

/// Binds the telemetry publisher and the command subscriber
pub type Binder =
    Arc<dyn Fn(&RemoteConfig) -> Result<(Arc<dyn PubSocket>, Box<dyn SubSocket>)> + Send + Sync>;

/// Everything the executor talks to outside the process
#[derive(Clone)]
pub struct Links {
    pub connector: Connector,
    pub binder: Binder,
    pub pose: Arc<dyn PoseProvider>,
}

impl Links {
    pub fn new(connector: Connector, binder: Binder, pose: Arc<dyn PoseProvider>) -> Self {
        Self { connector, binder, pose }
    }
}

/// Serial port, TCP remote channel, fixed pose and goal
impl Default for Links {
    fn default() -> Self {
        Self::new(Arc::new(open_serial), Arc::new(bind_tcp), Arc::new(FixedPose::default()))
    }
}

impl fmt::Debug for Links {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links").finish_non_exhaustive()
    }
}

fn open_serial(config: &RoverConfig) -> Result<Box<dyn Transport>> {
    let transport = SerialTransport::open(&config.platform.device_path())?;
    Ok(Box::new(transport))
}

fn bind_tcp(remote: &RemoteConfig) -> Result<(Arc<dyn PubSocket>, Box<dyn SubSocket>)> {
    let publisher = TcpPublisher::bind(remote.port)?;
    let subscriber = TcpSubscriber::bind(remote.command_port())?;
    Ok((Arc::new(publisher), Box::new(subscriber)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    Running,
    Stopping,
}

struct Session {
    stop: Arc<AtomicBool>,
    connection: Connection,
    control: Option<JoinHandle<()>>,
    remote: Option<RemoteChannel>,
    cache: Arc<SensorCache>,
    actuator: Arc<Actuator>,
}

/// Runs the navigator against one rover
pub struct RoverExecutor {
    config: LrnConfig,
    links: Links,
    state: ExecutorState,
    session: Option<Session>,
}

impl RoverExecutor {
    pub fn new(config: LrnConfig, links: Links) -> Self {
        Self {
            config,
            links,
            state: ExecutorState::Idle,
            session: None,
        }
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ExecutorState::Running
    }

    pub fn config(&self) -> &LrnConfig {
        &self.config
    }

    /// Latest sensor values of the running session
    pub fn sensors(&self) -> Option<SensorReading> {
        self.session.as_ref().map(|s| s.cache.snapshot())
    }

    pub fn actuator(&self) -> Option<Arc<Actuator>> {
        self.session.as_ref().map(|s| Arc::clone(&s.actuator))
    }

    /// Open the link and start all threads; a no-op if already running
    pub fn start(&mut self) -> Result<()> {
        if self.state == ExecutorState::Running {
            warn!("[executor] already running");
            return Ok(());
        }

        let rover = &self.config.rover;
        let transport = (self.links.connector)(rover)?;

        let remote = match rover.enabled_remote() {
            Some(remote) => {
                let sockets = (self.links.binder)(&remote)?;
                info!("[executor] remote channel on ports {}/{}", remote.port, remote.command_port());
                Some(sockets)
            }
            None => None,
        };
        let (publisher, subscriber) = match remote {
            Some((publisher, subscriber)) => (Some(publisher), Some(subscriber)),
            None => (None, None),
        };

        let cache = Arc::new(SensorCache::new());
        let decoder = SensorDecoder::new(Arc::clone(&cache), publisher.map(TelemetryPublisher::new));
        let connection = Connection::open(transport, move |line| {
            decoder.handle_line(line);
        })?;

        let actuator = Arc::new(Actuator::new(DiffDrive::from_config(rover), Arc::new(connection.writer())));
        let stop = Arc::new(AtomicBool::new(false));

        let mut remote = match subscriber {
            Some(source) => Some(RemoteChannel::spawn(source, Arc::clone(&actuator), Arc::clone(&stop))?),
            None => None,
        };

        let control = match self.spawn_control(&cache, &actuator, &stop) {
            Ok(handle) => handle,
            Err(e) => {
                stop.store(true, Ordering::SeqCst);
                if let Some(channel) = remote.as_mut() {
                    channel.join();
                }
                return Err(e);
            }
        };

        self.session = Some(Session {
            stop,
            connection,
            control: Some(control),
            remote,
            cache,
            actuator,
        });
        self.state = ExecutorState::Running;
        info!("[executor] running (autonomous: {})", rover.autonomous);
        Ok(())
    }

    fn spawn_control(
        &self,
        cache: &Arc<SensorCache>,
        actuator: &Arc<Actuator>,
        stop: &Arc<AtomicBool>,
    ) -> Result<JoinHandle<()>> {
        let navigator = PotentialFieldNavigator::new(self.config.navigator);
        let pose = Arc::clone(&self.links.pose);
        let cache = Arc::clone(cache);
        let actuator = Arc::clone(actuator);
        let stop = Arc::clone(stop);
        let autonomous = self.config.rover.autonomous;

        thread::Builder::new()
            .name("rover-control".to_string())
            .spawn(move || {
                control_loop(&navigator, pose.as_ref(), &cache, &actuator, autonomous, &stop);
            })
            .map_err(|e| Error::ThreadSpawn(e.to_string()))
    }

    /// Stop every thread and close the link; a no-op if idle
    pub fn stop(&mut self) {
        let Some(mut session) = self.session.take() else {
            self.state = ExecutorState::Idle;
            return;
        };
        self.state = ExecutorState::Stopping;

        session.stop.store(true, Ordering::SeqCst);
        session.connection.cancel();

        // remote commands must be quiet before the final zero drive
        if let Some(mut remote) = session.remote.take() {
            remote.join();
        }
        if let Some(handle) = session.control.take() {
            if handle.join().is_err() {
                error!("[executor] control thread panicked");
            }
        }
        session.connection.join();

        self.state = ExecutorState::Idle;
        info!("[executor] stopped");
    }
}

impl Drop for RoverExecutor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn control_loop(
    navigator: &PotentialFieldNavigator,
    pose: &dyn PoseProvider,
    cache: &SensorCache,
    actuator: &Actuator,
    autonomous: bool,
    stop: &AtomicBool,
) {
    info!("[executor] control loop started");
    while !stop.load(Ordering::SeqCst) {
        let reading = cache.snapshot();
        let command = navigator.step(&pose.pose(), &pose.goal(), &reading);

        if autonomous {
            actuator.drive(command.v, command.w);
        } else {
            trace!("[executor] navigator v={:.3} w={:.3}", command.v, command.w);
        }

        thread::sleep(CONTROL_PERIOD);
    }

    if autonomous {
        actuator.drive(0.0, 0.0);
    }
    info!("[executor] control loop stopped");
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pubsub::EndpointRegistry;
    use crate::remote::messages::{DRIVE_TOPIC, SENSORS_TOPIC, SETUP_TOPIC};
    use crate::uart::MockTransport;
    use std::io;
    use std::time::Instant;

    pub(crate) fn test_config(autonomous: bool, remote_port: Option<u16>) -> LrnConfig {
        let remote = remote_port
            .map(|port| format!(r#", "remote_api": {{ "enabled": true, "port": {} }}"#, port))
            .unwrap_or_default();
        LrnConfig::from_json(&format!(
            r#"{{ "rover": {{ "wheelbase": 0.3, "wheel_radius": 0.05,
                   "platform": {{ "port": "ttyUSB0" }},
                   "autonomous": {}{} }} }}"#,
            autonomous, remote
        ))
        .unwrap()
    }

    pub(crate) fn mock_links(mock: &MockTransport, registry: &Arc<EndpointRegistry>) -> Links {
        let mock = mock.clone();
        let registry = Arc::clone(registry);
        Links::new(
            Arc::new(move |_: &RoverConfig| -> Result<Box<dyn Transport>> { Ok(Box::new(mock.clone())) }),
            Arc::new(move |remote: &RemoteConfig| -> Result<(Arc<dyn PubSocket>, Box<dyn SubSocket>)> {
                Ok((
                    Arc::new(registry.publisher(remote.port)),
                    Box::new(registry.subscriber(remote.command_port())),
                ))
            }),
            Arc::new(FixedPose::default()),
        )
    }

    pub(crate) fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
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
    fn test_sensor_lines_reach_cache() {
        let mock = MockTransport::new();
        let registry = Arc::new(EndpointRegistry::new());
        let mut executor = RoverExecutor::new(test_config(false, None), mock_links(&mock, &registry));
        assert_eq!(executor.sensors(), None);

        executor.start().unwrap();
        assert_eq!(executor.state(), ExecutorState::Running);
        mock.inject_read(b"<ir,3,108,108,108>\r\n");
        assert!(wait_for(|| executor.sensors().and_then(|s| s.ir) == Some([0.8; 3])));

        executor.stop();
        assert_eq!(executor.state(), ExecutorState::Idle);
        assert_eq!(executor.sensors(), None);
    }

    #[test]
    fn test_navigator_output_not_driven_by_default() {
        let mock = MockTransport::new();
        let registry = Arc::new(EndpointRegistry::new());
        let mut executor = RoverExecutor::new(test_config(false, None), mock_links(&mock, &registry));

        executor.start().unwrap();
        thread::sleep(CONTROL_PERIOD * 3);
        executor.stop();
        assert!(mock.written().is_empty());
    }

    #[test]
    fn test_autonomous_drives_and_stops_wheels() {
        let mock = MockTransport::new();
        let registry = Arc::new(EndpointRegistry::new());
        let mut executor = RoverExecutor::new(test_config(true, None), mock_links(&mock, &registry));

        executor.start().unwrap();
        assert!(wait_for(|| !mock.written().is_empty()));
        executor.stop();

        let lines = mock.written_lines();
        assert!(lines.iter().all(|l| l.starts_with("<ws,2,")));
        // pose (0,0,0), goal (1,1): right wheel above the dead zone
        assert_ne!(lines[0], "<ws,2,0,0>");
        assert_eq!(lines.last().map(String::as_str), Some("<ws,2,0,0>"));
    }

    #[test]
    fn test_remote_commands_and_telemetry() {
        let mock = MockTransport::new();
        let registry = Arc::new(EndpointRegistry::new());
        let mut telemetry = registry.subscriber(7200);
        telemetry.subscribe(SENSORS_TOPIC).unwrap();

        let mut executor = RoverExecutor::new(test_config(false, Some(7200)), mock_links(&mock, &registry));
        executor.start().unwrap();

        registry.publisher(7201).publish(SETUP_TOPIC, br#"{"state":"run"}"#).unwrap();
        assert!(wait_for(|| mock.written_lines() == vec!["<start,100>"]));
        assert!(executor.actuator().map_or(false, |a| a.is_running()));

        mock.inject_read(b"<gyr,3,0,0,0>\n");
        let envelope = telemetry.receive(Duration::from_secs(2)).unwrap().unwrap();
        assert_eq!(envelope.topic, SENSORS_TOPIC);

        executor.stop();
    }

    #[test]
    fn test_zero_drive_is_last_despite_remote_commands() {
        let mock = MockTransport::new();
        let registry = Arc::new(EndpointRegistry::new());
        let mut executor = RoverExecutor::new(test_config(true, Some(7300)), mock_links(&mock, &registry));
        executor.start().unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        let commands = registry.publisher(7301);
        let driver = thread::spawn(move || {
            while !flag.load(Ordering::SeqCst) {
                commands.publish(DRIVE_TOPIC, br#"{"v":0.5,"w":0}"#).unwrap();
                thread::sleep(Duration::from_millis(1));
            }
        });

        assert!(wait_for(|| mock.written_lines().iter().any(|l| l == "<ws,2,139,139>")));
        executor.stop();
        let written = mock.written_lines();
        assert_eq!(written.last().map(String::as_str), Some("<ws,2,0,0>"));

        thread::sleep(Duration::from_millis(20));
        assert_eq!(mock.written_lines().len(), written.len());

        done.store(true, Ordering::SeqCst);
        driver.join().unwrap();
    }

    #[test]
    fn test_open_failure_is_reported() {
        let registry = Arc::new(EndpointRegistry::new());
        let mut links = mock_links(&MockTransport::new(), &registry);
        links.connector = Arc::new(|_: &RoverConfig| -> Result<Box<dyn Transport>> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such port").into())
        });

        let mut executor = RoverExecutor::new(test_config(false, None), links);
        assert!(matches!(executor.start(), Err(Error::Io(_))));
        assert_eq!(executor.state(), ExecutorState::Idle);
        executor.stop();
    }

    #[test]
    fn test_double_start_and_restart() {
        let mock = MockTransport::new();
        let registry = Arc::new(EndpointRegistry::new());
        let mut executor = RoverExecutor::new(test_config(false, None), mock_links(&mock, &registry));

        executor.stop();
        assert_eq!(executor.state(), ExecutorState::Idle);

        executor.start().unwrap();
        executor.start().unwrap();
        assert!(executor.is_running());

        executor.stop();
        executor.stop();
        assert!(!executor.is_running());

        executor.start().unwrap();
        mock.inject_read(b"<acc,3,0,0,8190>\n");
        assert!(wait_for(|| executor.sensors().and_then(|s| s.acc).is_some()));
        executor.stop();
    }
}
