pub mod mock;
pub mod protocol;
pub mod transport;

pub use mock::MockTransport;
pub use protocol::{Command, Frame, FrameError, LineBuffer, SensorGroup};
pub use transport::{SerialTransport, Transport, SERIAL_BAUD_RATE};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use log::{debug, error, trace};
use parking_lot::Mutex;
use crate::error::{Error, Result};

pub const READ_CHUNK: usize = 256;

//pause after a failed read so a dead port does not spin the reader
const READ_ERROR_PAUSE: Duration = Duration::from_millis(10);

//anything that accepts actuator commands for the firmware
pub trait CommandSink: Send + Sync{
    fn send(&self, command: &Command) -> Result<()>;
}

//write half of the link, shared by the control loop and the remote thread
#[derive(Clone)]
pub struct SerialWriter{
    port: Arc<Mutex<Box<dyn Transport>>>,
}

impl SerialWriter{
    pub fn new(port: Box<dyn Transport>) -> Self{
        SerialWriter{ port: Arc::new(Mutex::new(port)) }
    }

    pub fn write_line(&self, line: &str) -> Result<()>{
        let mut port = self.port.lock();
        port.write_all(line.as_bytes())?;
        port.flush()
    }
}

impl CommandSink for SerialWriter{
    fn send(&self, command: &Command) -> Result<()>{
        let line = command.encode();
        trace!("[serial] tx {}", line.trim_end());
        self.write_line(&line)
    }
}

enum ReadEvent{
    Data(usize),
    Idle,
    Aborted,
    Failed(Error),
}

//serial link with a dedicated reader thread
//every received line is handed to the line handler on the reader thread
pub struct Connection{
    writer: SerialWriter,
    cancel: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl Connection{
    pub fn open<F>(transport: Box<dyn Transport>, on_line: F) -> Result<Self>
    where
        F: FnMut(&str) + Send + 'static,
    {
        let reader_port = transport.try_clone()?;
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_flag = Arc::clone(&cancel);

        let reader = thread::Builder::new()
            .name("serial-reader".to_string())
            .spawn(move ||{
                read_loop(reader_port, cancel_flag, on_line);
            })
            .map_err(|e| Error::ThreadSpawn(e.to_string()))?;

        Ok(Connection{
            writer: SerialWriter::new(transport),
            cancel,
            reader: Some(reader),
        })
    }

    pub fn writer(&self) -> SerialWriter{
        self.writer.clone()
    }

    //the reader sees this at its next wakeup and exits without re-arming
    pub fn cancel(&self){
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn join(&mut self){
        if let Some(handle) = self.reader.take(){
            if handle.join().is_err(){
                error!("[serial] reader thread panicked");
            }
        }
    }

    pub fn close(&mut self){
        self.cancel();
        self.join();
    }

    pub fn is_reading(&self) -> bool{
        self.reader.as_ref().map_or(false, |h| !h.is_finished())
    }
}

impl Drop for Connection{
    fn drop(&mut self){
        self.close();
    }
}

fn next_event(port: &mut dyn Transport, buf: &mut [u8], cancel: &AtomicBool) -> ReadEvent{
    if cancel.load(Ordering::SeqCst){
        return ReadEvent::Aborted;
    }
    match port.read(buf){
        Ok(0) => ReadEvent::Idle,
        Ok(n) => ReadEvent::Data(n),
        Err(e) => ReadEvent::Failed(e),
    }
}

fn read_loop<F: FnMut(&str)>(mut port: Box<dyn Transport>, cancel: Arc<AtomicBool>, mut on_line: F){
    let mut read_buf = [0u8; READ_CHUNK];
    let mut lines = LineBuffer::new();

    debug!("[serial] reader started");
    loop{
        match next_event(port.as_mut(), &mut read_buf, &cancel){
            ReadEvent::Data(n) =>{
                lines.extend(&read_buf[..n]);
                while let Some(line) = lines.next_line(){
                    trace!("[serial] rx {}", line);
                    on_line(&line);
                }
            }
            ReadEvent::Idle => {}
            ReadEvent::Aborted =>{
                trace!("[serial] read aborted");
                break;
            }
            ReadEvent::Failed(e) =>{
                error!("[serial] read error: {}", e);
                thread::sleep(READ_ERROR_PAUSE);
            }
        }
    }
    debug!("[serial] reader stopped");
}
