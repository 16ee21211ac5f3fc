use std::collections::LinkedList;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct Inner<T> {
    list: LinkedList<T>,
    closed: bool,
}

/// Bounded, closable producer/consumer container. Every operation moves
/// whole batches by splicing the caller's list with the internal one, so
/// element transfer never copies or allocates.
///
/// The size bound is weak: a push is refused only while the current size
/// is at or above the bound, so a single batch may overshoot the nominal
/// capacity by its own length. Callers detect a no-op by inspecting
/// their own list; only a closed buffer reports `false`.
pub struct BlockingListBuffer<T> {
    inner: Mutex<Inner<T>>,
    cv: Condvar,
    max_size: usize,
}

impl<T> BlockingListBuffer<T> {
    #[inline]
    pub fn new(max_size: usize) -> BlockingListBuffer<T> {
        BlockingListBuffer {
            inner: Mutex::new(Inner {
                list: LinkedList::new(),
                closed: false,
            }),
            cv: Condvar::new(),
            max_size,
        }
    }

    /// Splices the caller's batch in if the bound permits. Never blocks.
    pub fn try_push(&self, other: &mut LinkedList<T>) -> bool {
        let spliced = {
            let mut inner = self.lock();

            if inner.closed {
                return false;
            }

            if inner.list.len() < self.max_size {
                inner.list.append(other);
                true
            } else {
                false
            }
        };

        if spliced {
            self.cv.notify_all();
        }

        true
    }

    /// Splices the buffered elements out if any are present. Never
    /// blocks.
    pub fn try_pop(&self, other: &mut LinkedList<T>) -> bool {
        let spliced = {
            let mut inner = self.lock();

            if inner.closed {
                return false;
            }

            if !inner.list.is_empty() {
                other.append(&mut inner.list);
                true
            } else {
                false
            }
        };

        if spliced {
            self.cv.notify_all();
        }

        true
    }

    /// Splices the caller's batch in, parking the caller while the
    /// buffer is at its bound. Returns `false` only when the buffer
    /// closes, in which case the caller keeps its batch.
    pub fn push(&self, other: &mut LinkedList<T>) -> bool {
        let mut inner = self.lock();

        loop {
            if inner.closed {
                return false;
            }
            if inner.list.len() < self.max_size {
                break;
            }
            inner = self.cv.wait(inner).expect("List buffer mutex poisoned");
        }

        inner.list.append(other);
        drop(inner);

        self.cv.notify_all();
        true
    }

    /// Splices the buffered elements out, parking the caller while the
    /// buffer is empty. Returns `false` only when the buffer closes.
    pub fn pop(&self, other: &mut LinkedList<T>) -> bool {
        let mut inner = self.lock();

        loop {
            if inner.closed {
                return false;
            }
            if !inner.list.is_empty() {
                break;
            }
            inner = self.cv.wait(inner).expect("List buffer mutex poisoned");
        }

        other.append(&mut inner.list);
        drop(inner);

        self.cv.notify_all();
        true
    }

    /// `push` bounded by a timeout. An expired deadline is not an error:
    /// the call reports `true` and the caller finds its batch untouched.
    pub fn push_for(&self, timeout: Duration, other: &mut LinkedList<T>) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();

        loop {
            if inner.closed {
                return false;
            }
            if inner.list.len() < self.max_size {
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                return true;
            }

            inner = self
                .cv
                .wait_timeout(inner, deadline - now)
                .expect("List buffer mutex poisoned")
                .0;
        }

        inner.list.append(other);
        drop(inner);

        self.cv.notify_all();
        true
    }

    /// `pop` bounded by a timeout, with the same no-op semantics as
    /// `push_for`.
    pub fn pop_for(&self, timeout: Duration, other: &mut LinkedList<T>) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();

        loop {
            if inner.closed {
                return false;
            }
            if !inner.list.is_empty() {
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                return true;
            }

            inner = self
                .cv
                .wait_timeout(inner, deadline - now)
                .expect("List buffer mutex poisoned")
                .0;
        }

        other.append(&mut inner.list);
        drop(inner);

        self.cv.notify_all();
        true
    }

    /// Marks the buffer closed and wakes every parked producer and
    /// consumer. Elements still inside are dropped with the buffer.
    pub fn close(&self) {
        {
            let mut inner = self.lock();
            inner.closed = true;
        }

        self.cv.notify_all();
    }

    #[inline]
    fn lock(&self) -> MutexGuard<Inner<T>> {
        self.inner.lock().expect("List buffer mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn batch(items: &[i32]) -> LinkedList<i32> {
        items.iter().cloned().collect()
    }

    fn drained(list: &mut LinkedList<i32>) -> Vec<i32> {
        let mut out = Vec::new();
        while let Some(item) = list.pop_front() {
            out.push(item);
        }
        out
    }

    #[test]
    fn test_try_push_and_try_pop() {
        let buffer = BlockingListBuffer::new(10);

        let mut l1 = batch(&[1, 2, 3, 4]);
        let mut l2 = batch(&[6, 7, 8, 9]);

        assert!(buffer.try_push(&mut l1));
        assert!(l1.is_empty());

        assert!(buffer.try_push(&mut l2));
        assert!(l2.is_empty());

        assert!(buffer.try_pop(&mut l1));
        assert_eq!(drained(&mut l1), vec![1, 2, 3, 4, 6, 7, 8, 9]);
    }

    #[test]
    fn test_try_push_full_buffer_is_a_noop() {
        let buffer = BlockingListBuffer::new(2);

        let mut l1 = batch(&[1, 2, 3]);
        assert!(buffer.try_push(&mut l1));
        assert!(l1.is_empty());

        // At the bound: the call reports fine but moves nothing.
        let mut l2 = batch(&[4, 5]);
        assert!(buffer.try_push(&mut l2));
        assert_eq!(l2.len(), 2);
    }

    #[test]
    fn test_try_pop_empty_buffer_is_a_noop() {
        let buffer = BlockingListBuffer::<i32>::new(2);

        let mut out = LinkedList::new();

        assert!(buffer.try_pop(&mut out));
        assert!(out.is_empty());
    }

    #[test]
    fn test_push_and_pop() {
        let buffer = BlockingListBuffer::new(10);

        let mut l1 = batch(&[1, 2, 3, 4]);
        let mut l2 = batch(&[6, 7, 8, 9]);

        assert!(buffer.push(&mut l1));
        assert!(l1.is_empty());

        assert!(buffer.push(&mut l2));
        assert!(l2.is_empty());

        assert!(buffer.pop(&mut l1));
        assert_eq!(drained(&mut l1), vec![1, 2, 3, 4, 6, 7, 8, 9]);
    }

    #[test]
    fn test_buffer_is_weak_sized() {
        let buffer = BlockingListBuffer::new(1);

        let mut l1 = batch(&[1, 2, 3, 4]);

        assert!(buffer.try_push(&mut l1));
        assert!(l1.is_empty());

        assert!(buffer.try_pop(&mut l1));
        assert_eq!(drained(&mut l1), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_closed_buffer_moves_nothing() {
        let buffer = BlockingListBuffer::new(4);

        buffer.close();

        let mut l1 = batch(&[1, 2]);

        assert!(!buffer.try_push(&mut l1));
        assert_eq!(l1.len(), 2);
        assert!(!buffer.push(&mut l1));
        assert_eq!(l1.len(), 2);
        assert!(!buffer.push_for(Duration::from_millis(10), &mut l1));
        assert_eq!(l1.len(), 2);

        let mut out = LinkedList::new();

        assert!(!buffer.try_pop(&mut out));
        assert!(!buffer.pop(&mut out));
        assert!(!buffer.pop_for(Duration::from_millis(10), &mut out));
        assert!(out.is_empty());
    }

    #[test]
    fn test_push_blocks_until_space_appears() {
        let buffer = Arc::new(BlockingListBuffer::new(1));

        let mut full = batch(&[1]);
        assert!(buffer.try_push(&mut full));

        let consumer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(200));

                let mut out = LinkedList::new();
                assert!(buffer.try_pop(&mut out));
                drained(&mut out)
            })
        };

        let mut l1 = batch(&[2, 3]);

        assert!(buffer.push(&mut l1));
        assert!(l1.is_empty());

        assert_eq!(consumer.join().unwrap(), vec![1]);

        let mut out = LinkedList::new();
        assert!(buffer.try_pop(&mut out));
        assert_eq!(drained(&mut out), vec![2, 3]);
    }

    #[test]
    fn test_pop_blocks_until_elements_appear() {
        let buffer = Arc::new(BlockingListBuffer::new(4));

        let producer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(200));

                let mut batch = batch(&[1, 2, 3]);
                assert!(buffer.push(&mut batch));
            })
        };

        let mut out = LinkedList::new();

        assert!(buffer.pop(&mut out));
        assert_eq!(drained(&mut out), vec![1, 2, 3]);

        producer.join().unwrap();
    }

    #[test]
    fn test_pop_woken_by_close() {
        let buffer = Arc::new(BlockingListBuffer::<i32>::new(4));

        let closer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(200));
                buffer.close();
            })
        };

        let mut out = LinkedList::new();

        assert!(!buffer.pop(&mut out));
        assert!(out.is_empty());

        closer.join().unwrap();
    }

    #[test]
    fn test_push_for_times_out_keeping_the_batch() {
        let buffer = BlockingListBuffer::new(1);

        let mut full = batch(&[1]);
        assert!(buffer.try_push(&mut full));

        let mut l1 = batch(&[2, 3]);
        let started = Instant::now();

        assert!(buffer.push_for(Duration::from_millis(100), &mut l1));
        assert!(started.elapsed() >= Duration::from_millis(100));
        // Timed out without space: the caller keeps its elements.
        assert_eq!(l1.len(), 2);
    }

    #[test]
    fn test_pop_for_times_out_empty() {
        let buffer = BlockingListBuffer::<i32>::new(4);

        let mut out = LinkedList::new();
        let started = Instant::now();

        assert!(buffer.pop_for(Duration::from_millis(100), &mut out));
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(out.is_empty());
    }

    #[test]
    fn test_pop_for_takes_elements_arriving_in_time() {
        let buffer = Arc::new(BlockingListBuffer::new(4));

        let producer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));

                let mut batch = batch(&[7, 8]);
                assert!(buffer.push(&mut batch));
            })
        };

        let mut out = LinkedList::new();

        assert!(buffer.pop_for(Duration::from_secs(5), &mut out));
        // Exactly one splice of the arrived batch.
        assert_eq!(drained(&mut out), vec![7, 8]);

        producer.join().unwrap();
    }
}
