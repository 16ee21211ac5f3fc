use std::cmp::min;

/// A position/limit byte window over a flat backing store, in the
/// classical `position <= limit <= capacity` style. Channels read into
/// and write out of the active window (`position..limit`); `flip`
/// switches a freshly filled buffer into draining mode and `compact`
/// moves an unfinished remainder back to the front.
pub struct ByteBuffer {
    data: Vec<u8>,
    position: usize,
    limit: usize,
}

impl ByteBuffer {
    #[inline]
    pub fn new(capacity: usize) -> ByteBuffer {
        ByteBuffer {
            data: vec![0; capacity],
            position: 0,
            limit: capacity,
        }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn set_position(&mut self, position: usize) -> &mut ByteBuffer {
        if position > self.limit {
            panic!("Attempted to position past the limit");
        }
        self.position = position;
        self
    }

    #[inline]
    pub fn advance(&mut self, increment: usize) -> &mut ByteBuffer {
        let position = self.position + increment;
        self.set_position(position)
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    #[inline]
    pub fn set_limit(&mut self, limit: usize) -> &mut ByteBuffer {
        if limit > self.capacity() {
            panic!("Attempted to limit past the capacity");
        }
        self.limit = limit;
        self
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Grows or shrinks the backing store, clamping limit and position.
    #[inline]
    pub fn set_capacity(&mut self, capacity: usize) -> &mut ByteBuffer {
        self.data.resize(capacity, 0);
        self.limit = min(self.limit, capacity);
        self.position = min(self.position, self.limit);
        self
    }

    /// Bytes left in the active window.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    /// Switches from filling to draining: the data written so far becomes
    /// the active window.
    #[inline]
    pub fn flip(&mut self) -> &mut ByteBuffer {
        self.limit = self.position;
        self.position = 0;
        self
    }

    /// Rewinds the position, keeping the limit.
    #[inline]
    pub fn clear(&mut self) -> &mut ByteBuffer {
        self.position = 0;
        self
    }

    /// Restores the full-capacity window.
    #[inline]
    pub fn reset(&mut self) -> &mut ByteBuffer {
        self.position = 0;
        self.limit = self.capacity();
        self
    }

    /// Moves the unread remainder to the front and opens the rest of the
    /// buffer for filling.
    pub fn compact(&mut self) -> &mut ByteBuffer {
        let remains = self.remaining();

        if remains > 0 {
            let position = self.position;
            self.data.copy_within(position..position + remains, 0);
        }

        self.position = remains;
        self.limit = self.capacity();
        self
    }

    /// The active window.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data[self.position..self.limit]
    }

    /// The active window, writable.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.position..self.limit]
    }

    /// Copies bytes into the window, advancing the position. Returns the
    /// number of bytes that did NOT fit; zero means a complete transfer.
    pub fn put(&mut self, input: &[u8]) -> usize {
        let count = min(input.len(), self.remaining());

        self.data[self.position..self.position + count].copy_from_slice(&input[..count]);
        self.position += count;

        input.len() - count
    }

    /// Copies bytes out of the window, advancing the position. Returns
    /// the number of bytes that could NOT be served; zero means the
    /// output was filled completely.
    pub fn get(&mut self, output: &mut [u8]) -> usize {
        let count = min(output.len(), self.remaining());

        output[..count].copy_from_slice(&self.data[self.position..self.position + count]);
        self.position += count;

        output.len() - count
    }

    /// Reads a single byte, or `None` once the window is exhausted.
    #[inline]
    pub fn get_byte(&mut self) -> Option<u8> {
        if self.remaining() == 0 {
            return None;
        }

        let byte = self.data[self.position];
        self.position += 1;

        Some(byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer() {
        let buffer = ByteBuffer::new(16);

        assert_eq!(buffer.position(), 0);
        assert_eq!(buffer.limit(), 16);
        assert_eq!(buffer.capacity(), 16);
        assert_eq!(buffer.remaining(), 16);
    }

    #[test]
    fn test_put_get_roundtrip() {
        let mut buffer = ByteBuffer::new(16);

        assert_eq!(buffer.put(&[1, 2, 3, 4]), 0);
        assert_eq!(buffer.position(), 4);

        buffer.flip();

        assert_eq!(buffer.position(), 0);
        assert_eq!(buffer.limit(), 4);

        let mut out = [0u8; 4];

        assert_eq!(buffer.get(&mut out), 0);
        assert_eq!(out, [1, 2, 3, 4]);
        assert_eq!(buffer.remaining(), 0);
    }

    #[test]
    fn test_put_reports_overflow() {
        let mut buffer = ByteBuffer::new(4);

        let spill = buffer.put(&[1, 2, 3, 4, 5, 6]);

        assert_eq!(spill, 2);
        assert_eq!(buffer.position(), 4);
        assert_eq!(buffer.remaining(), 0);

        // A full buffer takes nothing further
        assert_eq!(buffer.put(&[7]), 1);
    }

    #[test]
    fn test_get_reports_shortfall() {
        let mut buffer = ByteBuffer::new(8);

        buffer.put(&[1, 2, 3]);
        buffer.flip();

        let mut out = [0u8; 5];

        assert_eq!(buffer.get(&mut out), 2);
        assert_eq!(&out[..3], &[1, 2, 3]);
    }

    #[test]
    fn test_get_byte() {
        let mut buffer = ByteBuffer::new(4);

        buffer.put(&[42]);
        buffer.flip();

        assert_eq!(buffer.get_byte(), Some(42));
        assert_eq!(buffer.get_byte(), None);
    }

    #[test]
    fn test_compact_preserves_remainder() {
        let mut buffer = ByteBuffer::new(8);

        buffer.put(&[1, 2, 3, 4, 5]);
        buffer.flip();

        let mut out = [0u8; 2];
        buffer.get(&mut out);

        buffer.compact();

        assert_eq!(buffer.position(), 3);
        assert_eq!(buffer.limit(), 8);

        buffer.flip();

        let mut out = [0u8; 3];

        assert_eq!(buffer.get(&mut out), 0);
        assert_eq!(out, [3, 4, 5]);
    }

    #[test]
    fn test_compact_of_drained_buffer_resets() {
        let mut buffer = ByteBuffer::new(8);

        buffer.put(&[1, 2]);
        buffer.flip();

        let mut out = [0u8; 2];
        buffer.get(&mut out);

        buffer.compact();

        assert_eq!(buffer.position(), 0);
        assert_eq!(buffer.limit(), 8);
    }

    #[test]
    fn test_reset_and_clear() {
        let mut buffer = ByteBuffer::new(8);

        buffer.put(&[1, 2, 3]);
        buffer.flip();
        buffer.clear();

        assert_eq!(buffer.position(), 0);
        assert_eq!(buffer.limit(), 3);

        buffer.reset();

        assert_eq!(buffer.position(), 0);
        assert_eq!(buffer.limit(), 8);
    }

    #[test]
    #[should_panic(expected = "Attempted to position past the limit")]
    fn test_position_past_limit_fails() {
        let mut buffer = ByteBuffer::new(4);

        buffer.set_position(5);
    }

    #[test]
    #[should_panic(expected = "Attempted to limit past the capacity")]
    fn test_limit_past_capacity_fails() {
        let mut buffer = ByteBuffer::new(4);

        buffer.set_limit(5);
    }
}
