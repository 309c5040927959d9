use std::sync::{Arc, Weak};
use parking_lot::Mutex;
use crate::ring_buffer::RingBuffer;
use super::message::Envelope;

pub const INBOX_CAPACITY: usize = 64;

//one subscriber's queue plus its topic filters
pub struct Inbox{
    filters: Mutex<Vec<String>>,
    queue: RingBuffer<Envelope>,
}

impl Inbox{
    pub fn new(capacity: usize) -> Self{
        Inbox{
            filters: Mutex::new(Vec::new()),
            queue: RingBuffer::new(capacity),
        }
    }

    pub fn add_filter(&self, filter: &str){
        let mut filters = self.filters.lock();
        if !filters.iter().any(|f| f == filter){
            filters.push(filter.to_string());
        }
    }

    pub fn accepts(&self, envelope: &Envelope) -> bool{
        self.filters.lock().iter().any(|f| envelope.matches(f))
    }

    pub fn queue(&self) -> &RingBuffer<Envelope>{
        &self.queue
    }
}

//named rendezvous point publishers send to and subscribers attach to
//messages fan out to every attached inbox whose filters match;
//with no matching inbox the message is dropped, like a zmq PUB socket
pub struct Endpoint{
    port: u16,
    inboxes: Mutex<Vec<Weak<Inbox>>>,
}

impl Endpoint{
    pub fn new(port: u16) -> Self{
        Endpoint{
            port,
            inboxes: Mutex::new(Vec::new()),
        }
    }

    pub fn port(&self) -> u16{
        self.port
    }

    pub fn attach(&self, capacity: usize) -> Arc<Inbox>{
        let inbox = Arc::new(Inbox::new(capacity));
        self.inboxes.lock().push(Arc::downgrade(&inbox));
        inbox
    }

    //returns how many inboxes received the message
    pub fn publish(&self, envelope: &Envelope) -> usize{
        let mut inboxes = self.inboxes.lock();
        inboxes.retain(|weak| weak.strong_count() > 0);

        let mut delivered = 0;
        for inbox in inboxes.iter().filter_map(Weak::upgrade){
            if inbox.accepts(envelope){
                inbox.queue().push(envelope.clone());
                delivered += 1;
            }
        }
        delivered
    }

    //shut down every attached inbox
    pub fn close(&self){
        for inbox in self.inboxes.lock().iter().filter_map(Weak::upgrade){
            inbox.queue().close();
        }
    }

    pub fn subscriber_count(&self) -> usize{
        self.inboxes.lock().iter().filter(|weak| weak.strong_count() > 0).count()
    }
}

#[cfg(test)]
mod tests{
    use super::*;

    #[test]
    fn test_fan_out_respects_filters(){
        let endpoint = Endpoint::new(5555);
        let drive = endpoint.attach(8);
        drive.add_filter("motors-commands");
        let all = endpoint.attach(8);
        all.add_filter("");

        assert_eq!(endpoint.publish(&Envelope::new("motors-commands", b"a")), 2);
        assert_eq!(endpoint.publish(&Envelope::new("tilt-motor-command", b"b")), 1);

        assert_eq!(drive.queue().len(), 1);
        assert_eq!(all.queue().len(), 2);
    }

    #[test]
    fn test_no_subscriber_drops_message(){
        let endpoint = Endpoint::new(5555);
        assert_eq!(endpoint.publish(&Envelope::new("x", b"")), 0);
        let inbox = endpoint.attach(8);
        inbox.add_filter("x");
        assert!(inbox.queue().is_empty());
    }

    #[test]
    fn test_dropped_inbox_is_pruned(){
        let endpoint = Endpoint::new(1);
        let inbox = endpoint.attach(8);
        assert_eq!(endpoint.subscriber_count(), 1);
        drop(inbox);
        assert_eq!(endpoint.subscriber_count(), 0);
        assert_eq!(endpoint.publish(&Envelope::new("x", b"")), 0);
    }

    #[test]
    fn test_duplicate_filter_ignored(){
        let inbox = Inbox::new(4);
        inbox.add_filter("a");
        inbox.add_filter("a");
        assert_eq!(inbox.filters.lock().len(), 1);
    }
}
