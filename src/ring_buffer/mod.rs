use std::collections::VecDeque;
use std::time::{Duration, Instant};
use parking_lot::{Condvar, Mutex};

//outcome of a blocking pop
#[derive(Debug, PartialEq)]
pub enum Wait<T>{
    Item(T),
    TimedOut,
    Closed,
}

struct State<T>{
    items: VecDeque<T>,
    closed: bool,
}

//bounded mpmc queue with freshness bias: when full the oldest item is dropped
pub struct RingBuffer<T>{
    state: Mutex<State<T>>,
    ready: Condvar,
    capacity: usize,
}

impl<T> RingBuffer<T>{
    pub fn new(capacity: usize) -> Self{
        assert!(capacity > 0, "RingBuffer capacity must be greater than 0");

        RingBuffer{
            state: Mutex::new(State{
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            ready: Condvar::new(),
            capacity,
        }
    }

    //push item, discards oldest on overflow
    pub fn push(&self, item: T){
        let mut state = self.state.lock();
        if state.items.len() == self.capacity{
            state.items.pop_front();
        }
        state.items.push_back(item);
        drop(state);

        self.ready.notify_one();
    }

    //pop oldest item without waiting
    pub fn pop(&self) -> Option<T>{
        self.state.lock().items.pop_front()
    }

    //pop oldest item, waiting up to timeout for one to arrive
    pub fn pop_timeout(&self, timeout: Duration) -> Wait<T>{
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        loop{
            if let Some(item) = state.items.pop_front(){
                return Wait::Item(item);
            }
            if state.closed{
                return Wait::Closed;
            }
            if self.ready.wait_until(&mut state, deadline).timed_out(){
                return match state.items.pop_front(){
                    Some(item) => Wait::Item(item),
                    None if state.closed => Wait::Closed,
                    None => Wait::TimedOut,
                };
            }
        }
    }

    //wake all waiters, further pops on an empty buffer report Closed
    pub fn close(&self){
        self.state.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn len(&self) -> usize{
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool{
        self.state.lock().items.is_empty()
    }
}

#[cfg(test)]
mod tests{
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_push_pop_fifo(){
        let rb: RingBuffer<i32> = RingBuffer::new(5);
        rb.push(10);
        rb.push(20);
        rb.push(30);

        assert_eq!(rb.pop(), Some(10));
        assert_eq!(rb.pop(), Some(20));
        assert_eq!(rb.pop(), Some(30));
        assert_eq!(rb.pop(), None);
    }

    #[test]
    fn test_overflow_discards_old(){
        let rb: RingBuffer<i32> = RingBuffer::new(3);
        rb.push(1);
        rb.push(2);
        rb.push(3);
        assert_eq!(rb.len(), 3);

        rb.push(4); //drops 1
        assert_eq!(rb.len(), 3);
        assert_eq!(rb.pop(), Some(2));
        assert_eq!(rb.pop(), Some(3));
        assert_eq!(rb.pop(), Some(4));
        assert!(rb.is_empty());
    }

    #[test]
    fn test_pop_timeout_times_out(){
        let rb: RingBuffer<i32> = RingBuffer::new(2);
        assert_eq!(rb.pop_timeout(Duration::from_millis(5)), Wait::TimedOut);
    }

    #[test]
    fn test_pop_timeout_wakes_on_push(){
        let rb = Arc::new(RingBuffer::new(4));
        let producer = Arc::clone(&rb);
        let handle = thread::spawn(move ||{
            thread::sleep(Duration::from_millis(10));
            producer.push(42);
        });
        assert_eq!(rb.pop_timeout(Duration::from_secs(2)), Wait::Item(42));
        handle.join().unwrap();
    }

    #[test]
    fn test_close_releases_waiter(){
        let rb: Arc<RingBuffer<i32>> = Arc::new(RingBuffer::new(4));
        let closer = Arc::clone(&rb);
        let handle = thread::spawn(move ||{
            thread::sleep(Duration::from_millis(10));
            closer.close();
        });
        assert_eq!(rb.pop_timeout(Duration::from_secs(2)), Wait::Closed);
        assert_eq!(rb.pop(), None);
        handle.join().unwrap();
    }

    #[test]
    fn test_close_drains_remaining_first(){
        let rb: RingBuffer<i32> = RingBuffer::new(4);
        rb.push(7);
        rb.close();
        assert_eq!(rb.pop_timeout(Duration::from_millis(1)), Wait::Item(7));
        assert_eq!(rb.pop_timeout(Duration::from_millis(1)), Wait::Closed);
    }
}
