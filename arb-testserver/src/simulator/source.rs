use std::{
    ops::RangeInclusive,
    time::{SystemTime, UNIX_EPOCH},
};

use rand::RngExt as _;

/// Source of uniformly distributed integers.
pub trait UniformSource {
    /// Draw an integer from the closed interval `range`.
    fn uniform(&mut self, range: RangeInclusive<i64>) -> i64;
}

impl<R: rand::Rng> UniformSource for R {
    #[inline(always)]
    fn uniform(&mut self, range: RangeInclusive<i64>) -> i64 {
        if range.is_empty() {
            return *range.start();
        }
        self.random_range(range)
    }
}

/// A [`UniformSource`] replaying a fixed list of draw offsets.
///
/// Each draw returns the lower bound of the requested interval
/// plus the next offset, wrapped within the interval width.
/// Once all offsets are used the sequence starts over.
#[derive(Debug, Clone, Default)]
pub struct SequenceSource {
    offsets: Vec<u64>,
    cursor: usize,
}

impl SequenceSource {
    pub fn new(offsets: impl Into<Vec<u64>>) -> Self {
        Self {
            offsets: offsets.into(),
            cursor: 0,
        }
    }

    /// Amount of draws taken so far.
    pub fn draws(&self) -> usize {
        self.cursor
    }

    fn next_offset(&mut self) -> u64 {
        if self.offsets.is_empty() {
            return 0;
        }
        let offset = self.offsets[self.cursor % self.offsets.len()];
        self.cursor += 1;
        offset
    }
}

impl UniformSource for SequenceSource {
    fn uniform(&mut self, range: RangeInclusive<i64>) -> i64 {
        let offset = self.next_offset();
        if range.is_empty() {
            return *range.start();
        }

        let lo = i128::from(*range.start());
        let width = i128::from(*range.end()) - lo + 1;
        (lo + i128::from(offset) % width) as i64
    }
}

/// Wall clock used to timestamp snapshots.
pub trait Clock {
    fn now_epoch_seconds(&self) -> i64;
}

impl<F: Fn() -> i64> Clock for F {
    #[inline(always)]
    fn now_epoch_seconds(&self) -> i64 {
        (self)()
    }
}

#[derive(Debug, Clone, Copy, Default)]
#[non_exhaustive]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_seconds(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default()
    }
}
