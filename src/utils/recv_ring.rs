use std::collections::TryReserveError;

use crate::utils::Seq8;

/// Largest ring that keeps stale and fresh sequence numbers apart in the
/// 8-bit sequence space.
pub const MAX_RING_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqLocationToRwnd {
    InRecvWindow,
    AlreadyReceived,
    OutOfWindow,
}

/// Fixed-capacity reassembly ring.
///
/// Logical slot `i` holds the packet with sequence number `start + i`. The
/// ring keeps a circular `base` so that delivering the head never moves the
/// remaining slots.
///
/// ```text
///            start
///              |
/// logical    [ 0  1  2  3  4 ]
///              P  .  P  P  .      P = occupied, . = free
/// ```
pub struct RecvRing<T> {
    slots: Vec<Option<T>>,
    base: usize,
    start: Seq8,
    occupied: usize,
}

impl<T> RecvRing<T> {
    fn check_rep(&self) {
        assert!(!self.slots.is_empty());
        assert!(self.slots.len() <= MAX_RING_CAPACITY);
        assert!(self.base < self.slots.len());
        assert!(self.occupied <= self.slots.len());
    }

    /// Allocates `capacity` empty slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is `0` or above [`MAX_RING_CAPACITY`].
    pub fn new(capacity: usize, start: Seq8) -> Result<Self, TryReserveError> {
        assert!(0 < capacity && capacity <= MAX_RING_CAPACITY);
        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity)?;
        slots.resize_with(capacity, || None);
        let this = RecvRing {
            slots,
            base: 0,
            start,
            occupied: 0,
        };
        this.check_rep();
        Ok(this)
    }

    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Sequence number expected at logical slot `0`.
    #[must_use]
    #[inline]
    pub fn start(&self) -> Seq8 {
        self.start
    }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.occupied
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Moves the window to `start`. Only allowed while nothing is buffered.
    pub fn reset_start(&mut self, start: Seq8) {
        assert!(self.is_empty());
        self.start = start;
        self.base = 0;
        self.check_rep();
    }

    #[must_use]
    #[inline]
    pub fn index_of(&self, seq: Seq8) -> usize {
        seq.sub(&self.start)
    }

    #[inline]
    fn physical(&self, index: usize) -> usize {
        (self.base + index) % self.slots.len()
    }

    #[must_use]
    pub fn is_occupied(&self, index: usize) -> bool {
        index < self.capacity() && self.slots[self.physical(index)].is_some()
    }

    #[must_use]
    pub fn location(&self, seq: Seq8) -> SeqLocationToRwnd {
        let index = self.index_of(seq);
        if index >= self.capacity() {
            SeqLocationToRwnd::OutOfWindow
        } else if self.is_occupied(index) {
            SeqLocationToRwnd::AlreadyReceived
        } else {
            SeqLocationToRwnd::InRecvWindow
        }
    }

    /// Stores `v` at the slot of `seq` if that slot is in range and free.
    /// Occupied slots are never overwritten.
    #[must_use]
    pub fn insert(&mut self, seq: Seq8, v: T) -> SeqLocationToRwnd {
        let location = self.location(seq);
        if let SeqLocationToRwnd::InRecvWindow = location {
            let slot = self.physical(self.index_of(seq));
            self.slots[slot] = Some(v);
            self.occupied += 1;
        }
        self.check_rep();
        location
    }

    #[must_use]
    pub fn front(&self) -> Option<&T> {
        self.slots[self.base].as_ref()
    }

    /// Takes the head packet if it is present and slides the window by one.
    #[must_use]
    pub fn pop_front(&mut self) -> Option<T> {
        let v = self.slots[self.base].take()?;
        self.occupied -= 1;
        self.base = self.physical(1);
        self.start.increment();
        self.check_rep();
        Some(v)
    }

    /// Number of contiguous free slots from logical slot `0`.
    #[must_use]
    pub fn leading_free(&self) -> usize {
        (0..self.capacity())
            .take_while(|&i| !self.is_occupied(i))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test1() {
        let mut ring = RecvRing::new(5, Seq8::from_u8(0)).unwrap();

        //         0  1  2  3  4
        // ring   [             ]

        assert!(ring.pop_front().is_none());
        assert_eq!(ring.leading_free(), 5);

        let location = ring.insert(Seq8::from_u8(5), 5);
        assert_eq!(location, SeqLocationToRwnd::OutOfWindow);

        let location = ring.insert(Seq8::from_u8(1), 1);

        //         0  1  2  3  4
        // ring   [   1         ]

        assert_eq!(location, SeqLocationToRwnd::InRecvWindow);
        assert_eq!(ring.leading_free(), 1);
        assert!(ring.pop_front().is_none());

        let location = ring.insert(Seq8::from_u8(1), 1);
        assert_eq!(location, SeqLocationToRwnd::AlreadyReceived);

        let location = ring.insert(Seq8::from_u8(0), 0);

        //         0  1  2  3  4
        // ring   [0  1         ]

        assert_eq!(location, SeqLocationToRwnd::InRecvWindow);
        assert_eq!(ring.leading_free(), 0);
        assert_eq!(ring.pop_front(), Some(0));
        assert_eq!(ring.pop_front(), Some(1));
        assert!(ring.pop_front().is_none());
        assert_eq!(ring.start(), Seq8::from_u8(2));

        //         2  3  4  5  6
        // ring   [             ]

        let location = ring.insert(Seq8::from_u8(1), 1);
        assert_eq!(location, SeqLocationToRwnd::OutOfWindow);

        let location = ring.insert(Seq8::from_u8(6), 6);
        assert_eq!(location, SeqLocationToRwnd::InRecvWindow);
        assert_eq!(ring.leading_free(), 4);
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn wraps_past_255() {
        let mut ring = RecvRing::new(4, Seq8::from_u8(254)).unwrap();
        for seq in [254u8, 255, 0, 1] {
            assert_eq!(
                ring.insert(Seq8::from_u8(seq), seq),
                SeqLocationToRwnd::InRecvWindow
            );
        }
        assert_eq!(
            ring.insert(Seq8::from_u8(2), 2),
            SeqLocationToRwnd::OutOfWindow
        );
        let popped: Vec<u8> = std::iter::from_fn(|| ring.pop_front()).collect();
        assert_eq!(popped, vec![254, 255, 0, 1]);
        assert_eq!(ring.start(), Seq8::from_u8(2));
        assert!(ring.is_empty());
    }

    #[test]
    fn slots_survive_rotation() {
        let mut ring = RecvRing::new(3, Seq8::from_u8(10)).unwrap();
        assert_eq!(
            ring.insert(Seq8::from_u8(10), 'a'),
            SeqLocationToRwnd::InRecvWindow
        );
        assert_eq!(
            ring.insert(Seq8::from_u8(12), 'c'),
            SeqLocationToRwnd::InRecvWindow
        );
        assert_eq!(ring.pop_front(), Some('a'));

        //        11 12 13
        // ring   [   c   ]

        assert!(!ring.is_occupied(0));
        assert!(ring.is_occupied(1));
        assert!(!ring.is_occupied(2));
        assert_eq!(ring.leading_free(), 1);

        // the freed tail slot now belongs to seq 13
        assert_eq!(
            ring.insert(Seq8::from_u8(13), 'd'),
            SeqLocationToRwnd::InRecvWindow
        );
        assert_eq!(
            ring.insert(Seq8::from_u8(11), 'b'),
            SeqLocationToRwnd::InRecvWindow
        );
        let popped: Vec<char> = std::iter::from_fn(|| ring.pop_front()).collect();
        assert_eq!(popped, vec!['b', 'c', 'd']);
    }

    #[test]
    fn stale_seq_is_out_of_window() {
        let ring: RecvRing<()> = RecvRing::new(MAX_RING_CAPACITY, Seq8::from_u8(0)).unwrap();
        // one behind the window start maps to index 255
        assert_eq!(
            ring.location(Seq8::from_u8(255)),
            SeqLocationToRwnd::OutOfWindow
        );
        assert_eq!(
            ring.location(Seq8::from_u8(127)),
            SeqLocationToRwnd::InRecvWindow
        );
        assert_eq!(
            ring.location(Seq8::from_u8(128)),
            SeqLocationToRwnd::OutOfWindow
        );
    }

    #[test]
    fn reset_start_when_empty() {
        let mut ring: RecvRing<u8> = RecvRing::new(2, Seq8::from_u8(0)).unwrap();
        ring.reset_start(Seq8::from_u8(77));
        assert_eq!(ring.start(), Seq8::from_u8(77));
        assert_eq!(
            ring.insert(Seq8::from_u8(78), 1),
            SeqLocationToRwnd::InRecvWindow
        );
    }
}
