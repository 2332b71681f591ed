//! Submitted-but-not-completed counter for one queue.

/// Bounded counter: `0 <= value <= capacity` at all times.
///
/// Violations are logic errors in the submitter; they trip a debug
/// assertion and saturate in release builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inflight {
    value: u32,
    capacity: u32,
}

impl Inflight {
    pub fn new(capacity: u32) -> Self {
        Self { value: 0, capacity }
    }

    #[inline]
    pub fn get(&self) -> u32 {
        self.value
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Free descriptor positions.
    #[inline]
    pub fn room(&self) -> u32 {
        self.capacity - self.value
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.value == 0
    }

    #[inline]
    pub fn add(&mut self, n: u32) {
        debug_assert!(
            self.value + n <= self.capacity,
            "inflight {} + {} exceeds capacity {}",
            self.value,
            n,
            self.capacity
        );
        self.value = (self.value + n).min(self.capacity);
    }

    #[inline]
    pub fn sub(&mut self, n: u32) {
        debug_assert!(n <= self.value, "reaped {} with only {} inflight", n, self.value);
        self.value = self.value.saturating_sub(n);
    }
}
