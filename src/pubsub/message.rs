//one message on the bus: topic frame + payload frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope{
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Envelope{
    pub fn new(topic: &str, payload: &[u8]) -> Self{
        Envelope{
            topic: topic.to_string(),
            payload: payload.to_vec(),
        }
    }

    //prefix match, same rule as a zmq SUB socket filter
    pub fn matches(&self, filter: &str) -> bool{
        self.topic.starts_with(filter)
    }
}
