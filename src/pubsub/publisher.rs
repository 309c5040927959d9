use std::sync::Arc;
use log::trace;
use crate::error::Result;
use super::PubSocket;
use super::message::Envelope;
use super::topic::Endpoint;

pub struct Publisher{
    endpoint: Arc<Endpoint>,
}

impl Publisher{
    pub fn new(endpoint: Arc<Endpoint>) -> Self{
        Publisher{ endpoint }
    }

    pub fn port(&self) -> u16{
        self.endpoint.port()
    }
}

impl PubSocket for Publisher{
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<()>{
        let delivered = self.endpoint.publish(&Envelope::new(topic, payload));
        trace!("[bus:{}] {} -> {} subscriber(s)", self.endpoint.port(), topic, delivered);
        Ok(())
    }
}

impl Clone for Publisher{
    fn clone(&self) -> Self{
        Publisher{ endpoint: Arc::clone(&self.endpoint) }
    }
}
