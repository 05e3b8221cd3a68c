//! Busy-wait delays over a wrapping tick counter
//!
//! The counter is read, an end tick is computed with wrapping arithmetic and
//! the loop spins until the counter reaches or passes it. A reading lower
//! than the one before it means the counter wrapped.

use std::time::Instant;

/// Monotonic counter that wraps at `u32::MAX`
pub trait TickSource {
    /// Current reading
    fn ticks(&self) -> u32;
}

/// Microseconds since creation, wrapping like a device timer
#[derive(Debug, Clone, Copy)]
pub struct MicrosecondTicks {
    origin: Instant,
}

impl Default for MicrosecondTicks {
    fn default() -> Self {
        Self::new()
    }
}

impl MicrosecondTicks {
    /// Start counting now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl TickSource for MicrosecondTicks {
    fn ticks(&self) -> u32 {
        // Truncation is the wrap
        self.origin.elapsed().as_micros() as u32
    }
}

/// Spin until `duration` ticks have passed; returns the counter wraps observed
pub fn busy_wait<S: TickSource + ?Sized>(source: &S, duration: u32) -> u32 {
    let start = source.ticks();
    let end = start.wrapping_add(duration);
    let mut must_wrap = end < start;
    let mut previous = start;
    let mut wraps = 0;
    loop {
        let now = source.ticks();
        if now < previous {
            wraps += 1;
            if !must_wrap {
                // Passed the top of the range, so passed the end as well
                return wraps;
            }
            must_wrap = false;
        }
        previous = now;
        if !must_wrap && now >= end {
            return wraps;
        }
        std::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Scripted(RefCell<std::vec::IntoIter<u32>>);

    impl Scripted {
        fn new(readings: Vec<u32>) -> Self {
            Self(RefCell::new(readings.into_iter()))
        }

        fn remaining(&self) -> usize {
            self.0.borrow().len()
        }
    }

    impl TickSource for Scripted {
        fn ticks(&self) -> u32 {
            self.0.borrow_mut().next().unwrap_or(u32::MAX)
        }
    }

    #[test]
    fn test_waits_until_end() {
        let source = Scripted::new(vec![100, 120, 140, 150, 170]);
        assert_eq!(busy_wait(&source, 50), 0);
        assert_eq!(source.remaining(), 1);
    }

    #[test]
    fn test_end_beyond_wrap() {
        let start = u32::MAX - 10;
        let source = Scripted::new(vec![start, u32::MAX - 2, 3, 8, 12, 99]);
        // end = 9: must see the wrap first, then reach 9
        assert_eq!(busy_wait(&source, 20), 1);
        assert_eq!(source.remaining(), 1);
    }

    #[test]
    fn test_unexpected_wrap_ends_wait() {
        // A slow reader can miss the end entirely and only see the wrap
        let source = Scripted::new(vec![u32::MAX - 100, u32::MAX - 60, 5, 99]);
        assert_eq!(busy_wait(&source, 50), 1);
        assert_eq!(source.remaining(), 1);
    }

    #[test]
    fn test_high_start_does_not_end_early() {
        // Start near the top with an end that wraps: high readings are not "past" the end
        let source = Scripted::new(vec![u32::MAX - 5, u32::MAX - 4, u32::MAX, 0, 4]);
        assert_eq!(busy_wait(&source, 9), 1);
        assert_eq!(source.remaining(), 0);
    }

    #[test]
    fn test_zero_duration() {
        let source = Scripted::new(vec![7, 7, 8]);
        assert_eq!(busy_wait(&source, 0), 0);
        assert_eq!(source.remaining(), 1);
    }

    #[test]
    fn test_microsecond_ticks_advance() {
        let ticks = MicrosecondTicks::new();
        assert_eq!(busy_wait(&ticks, 200), 0);
        assert!(ticks.ticks() >= 200);
    }
}
