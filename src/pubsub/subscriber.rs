use std::sync::Arc;
use std::time::Duration;
use crate::error::{Error, Result};
use crate::ring_buffer::Wait;
use super::SubSocket;
use super::message::Envelope;
use super::topic::{Endpoint, Inbox};

pub struct Subscriber{
    endpoint: Arc<Endpoint>,
    inbox: Arc<Inbox>,
}

impl Subscriber{
    pub fn new(endpoint: Arc<Endpoint>, capacity: usize) -> Self{
        let inbox = endpoint.attach(capacity);
        Subscriber{ endpoint, inbox }
    }

    pub fn port(&self) -> u16{
        self.endpoint.port()
    }

    pub fn try_recv(&self) -> Option<Envelope>{
        self.inbox.queue().pop()
    }

    pub fn has_pending(&self) -> bool{
        !self.inbox.queue().is_empty()
    }
}

impl SubSocket for Subscriber{
    fn subscribe(&mut self, topic: &str) -> Result<()>{
        self.inbox.add_filter(topic);
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Envelope>>{
        match self.inbox.queue().pop_timeout(timeout){
            Wait::Item(envelope) => Ok(Some(envelope)),
            Wait::TimedOut => Ok(None),
            Wait::Closed => Err(Error::ChannelClosed),
        }
    }
}
