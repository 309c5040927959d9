//! Minimal publish/subscribe interface and its in-process implementation.
//!
//! The remote channel only needs `publish(topic, bytes)`, `subscribe(topic)`
//! and `receive() -> (topic, bytes)`, so any message queue that can provide
//! those three calls can back it. Two backends exist: the in-process bus in
//! this module and the TCP sockets in `remote::tcp`.

pub mod message;
pub mod topic;
pub mod publisher;
pub mod subscriber;
pub mod registry;

pub use message::Envelope;
pub use topic::{Endpoint, Inbox};
pub use publisher::Publisher;
pub use subscriber::Subscriber;
pub use registry::EndpointRegistry;

use std::time::Duration;
use crate::error::Result;

//sending half
pub trait PubSocket: Send + Sync{
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<()>;
}

//receiving half, topics are prefix filters
//receive returns Ok(None) on timeout and Err(ChannelClosed) on clean shutdown
pub trait SubSocket: Send{
    fn subscribe(&mut self, topic: &str) -> Result<()>;
    fn receive(&mut self, timeout: Duration) -> Result<Option<Envelope>>;
}
