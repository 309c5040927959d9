use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use super::publisher::Publisher;
use super::subscriber::Subscriber;
use super::topic::{Endpoint, INBOX_CAPACITY};

//in-process stand-in for network ports: one endpoint per port number
pub struct EndpointRegistry{
    endpoints: RwLock<HashMap<u16, Arc<Endpoint>>>,
}

impl EndpointRegistry{
    pub fn new() -> Self{
        EndpointRegistry{
            endpoints: RwLock::new(HashMap::new()),
        }
    }

    pub fn endpoint(&self, port: u16) -> Arc<Endpoint>{
        if let Some(existing) = self.endpoints.read().get(&port){
            return Arc::clone(existing);
        }
        let mut endpoints = self.endpoints.write();
        Arc::clone(endpoints.entry(port).or_insert_with(|| Arc::new(Endpoint::new(port))))
    }

    pub fn publisher(&self, port: u16) -> Publisher{
        Publisher::new(self.endpoint(port))
    }

    pub fn subscriber(&self, port: u16) -> Subscriber{
        Subscriber::new(self.endpoint(port), INBOX_CAPACITY)
    }

    //signals shutdown to every subscriber on the port
    pub fn close(&self, port: u16){
        if let Some(endpoint) = self.endpoints.read().get(&port){
            endpoint.close();
        }
    }

    pub fn endpoint_count(&self) -> usize{
        self.endpoints.read().len()
    }
}

impl Default for EndpointRegistry{
    fn default() -> Self{
        Self::new()
    }
}
