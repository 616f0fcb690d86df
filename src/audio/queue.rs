use crate::error::RelayError;

use super::AudioChunk;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1_000;

/// Fixed-capacity ring of output chunks.
///
/// A full queue rejects new chunks instead of evicting old ones, so audio that
/// is already queued keeps playing in order and the caller sees the overflow.
#[derive(Debug)]
pub struct OutputQueue {
    slots: Vec<Option<AudioChunk>>,
    head: usize,
    tail: usize,
    count: usize,
    generation: u64,
}

impl OutputQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            tail: 0,
            count: 0,
            generation: 0,
        }
    }

    pub fn put(&mut self, chunk: AudioChunk) -> Result<(), RelayError> {
        if self.count == self.capacity() {
            return Err(RelayError::QueueFull {
                capacity: self.capacity(),
            });
        }

        self.slots[self.tail] = Some(chunk);
        self.tail = (self.tail + 1) % self.capacity();
        self.count += 1;
        Ok(())
    }

    pub fn get(&mut self) -> Option<AudioChunk> {
        if self.count == 0 {
            return None;
        }

        let chunk = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.count -= 1;
        chunk
    }

    /// Empties the queue and starts a new generation.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.head = 0;
        self.tail = 0;
        self.count = 0;
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of `clear` calls so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Default for OutputQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(tag: u16) -> AudioChunk {
        AudioChunk::new(tag.to_le_bytes().to_vec()).expect("non-empty chunk")
    }

    fn tag(chunk: &AudioChunk) -> u16 {
        let bytes = chunk.as_bytes();
        u16::from_le_bytes([bytes[0], bytes[1]])
    }

    #[test]
    fn returns_chunks_in_fifo_order() {
        let mut queue = OutputQueue::new(4);
        for value in 0..4 {
            queue.put(chunk(value)).expect("room available");
        }

        assert_eq!(queue.len(), 4);
        for expected in 0..4 {
            assert!(!queue.is_empty());
            let next = queue.get().expect("chunk available");
            assert_eq!(tag(&next), expected);
        }
        assert!(queue.is_empty());
        assert!(queue.get().is_none());
    }

    #[test]
    fn keeps_order_across_wraparound() {
        let mut queue = OutputQueue::new(3);
        let mut expected = Vec::new();
        let mut received = Vec::new();

        for value in 0..10 {
            queue.put(chunk(value)).expect("room available");
            expected.push(value);
            if queue.len() == queue.capacity() {
                received.push(tag(&queue.get().expect("chunk available")));
            }
        }
        while let Some(next) = queue.get() {
            received.push(tag(&next));
        }

        assert_eq!(received, expected);
    }

    #[test]
    fn full_queue_rejects_and_keeps_contents() {
        let mut queue = OutputQueue::default();
        for value in 0..1_000 {
            queue.put(chunk(value)).expect("within capacity");
        }

        let err = queue.put(chunk(1_000)).expect_err("queue is full");
        assert_eq!(err, RelayError::QueueFull { capacity: 1_000 });
        assert_eq!(queue.len(), 1_000);

        for expected in 0..1_000 {
            assert_eq!(tag(&queue.get().expect("chunk retained")), expected);
        }
        assert!(queue.get().is_none());
    }

    #[test]
    fn clear_discards_everything() {
        let mut queue = OutputQueue::new(8);
        for value in 0..5 {
            queue.put(chunk(value)).expect("room available");
        }
        queue.get();

        queue.clear();

        assert!(queue.get().is_none());
        assert!(queue.is_empty());
        assert_eq!(queue.generation(), 1);

        queue.put(chunk(42)).expect("room after clear");
        assert_eq!(tag(&queue.get().expect("chunk after clear")), 42);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut queue = OutputQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.put(chunk(1)).expect("single slot");
        assert!(queue.put(chunk(2)).is_err());
    }
}
