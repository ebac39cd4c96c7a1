//! Capture bitmap
//!
//! A bit per block, answering "has this block already been captured in
//! the current snapshot version." The test-and-set is a single atomic
//! `fetch_or`, so many threads committing writes against the same block
//! agree on exactly one winner without taking any lock.

use std::sync::atomic::{AtomicU64, Ordering};

use blocksnap_core::{Error, Result};

const BITS_PER_WORD: u64 = 64;

/// Bit-per-block set sized to one mount session's block count.
pub struct CaptureBitmap {
    words: Vec<AtomicU64>,
    num_blocks: u64,
}

impl CaptureBitmap {
    /// Allocate a bitmap covering `num_blocks` blocks, all clear.
    ///
    /// Allocation failure surfaces as `ResourceExhausted` rather than
    /// aborting — session open rolls back cleanly on it.
    pub fn new(num_blocks: u64) -> Result<Self> {
        let word_count = ((num_blocks + BITS_PER_WORD - 1) / BITS_PER_WORD) as usize;
        let mut words = Vec::new();
        words.try_reserve_exact(word_count).map_err(|_| {
            Error::ResourceExhausted(format!(
                "capture bitmap for {} blocks ({} words)",
                num_blocks, word_count
            ))
        })?;
        words.resize_with(word_count, || AtomicU64::new(0));
        Ok(CaptureBitmap { words, num_blocks })
    }

    /// Atomically mark a block captured.
    ///
    /// Returns the previous value: `true` means the block was already
    /// captured this session and the caller must not persist it again.
    /// Block numbers beyond the session's range (the backing file grew
    /// after the session opened) report `true` so the capture path skips
    /// them instead of indexing out of bounds.
    pub fn test_and_set(&self, block: u64) -> bool {
        if block >= self.num_blocks {
            return true;
        }
        let word = &self.words[(block / BITS_PER_WORD) as usize];
        let mask = 1u64 << (block % BITS_PER_WORD);
        word.fetch_or(mask, Ordering::AcqRel) & mask != 0
    }

    /// Whether a block is marked captured.
    pub fn is_set(&self, block: u64) -> bool {
        if block >= self.num_blocks {
            return true;
        }
        let word = &self.words[(block / BITS_PER_WORD) as usize];
        let mask = 1u64 << (block % BITS_PER_WORD);
        word.load(Ordering::Acquire) & mask != 0
    }

    /// Number of blocks this bitmap covers.
    pub fn num_blocks(&self) -> u64 {
        self.num_blocks
    }
}

impl std::fmt::Debug for CaptureBitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureBitmap")
            .field("num_blocks", &self.num_blocks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};

    #[test]
    fn test_test_and_set_once() {
        let bitmap = CaptureBitmap::new(100).unwrap();
        assert!(!bitmap.test_and_set(5));
        assert!(bitmap.test_and_set(5));
        assert!(bitmap.is_set(5));
        assert!(!bitmap.is_set(6));
    }

    #[test]
    fn test_word_boundaries() {
        let bitmap = CaptureBitmap::new(130).unwrap();
        for block in [0, 63, 64, 127, 128, 129] {
            assert!(!bitmap.test_and_set(block), "block {}", block);
            assert!(bitmap.test_and_set(block), "block {}", block);
        }
    }

    #[test]
    fn test_out_of_range_reports_already_set() {
        let bitmap = CaptureBitmap::new(10).unwrap();
        assert!(bitmap.test_and_set(10));
        assert!(bitmap.test_and_set(1 << 40));
        assert!(bitmap.is_set(10));
    }

    #[test]
    fn test_zero_blocks() {
        let bitmap = CaptureBitmap::new(0).unwrap();
        assert!(bitmap.test_and_set(0));
    }

    #[test]
    fn test_concurrent_single_winner() {
        let bitmap = Arc::new(CaptureBitmap::new(64).unwrap());
        let winners = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let bitmap = Arc::clone(&bitmap);
            let winners = Arc::clone(&winners);
            let barrier = Arc::clone(&barrier);
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                for _ in 0..100 {
                    if !bitmap.test_and_set(7) {
                        winners.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::Relaxed), 1);
    }
}
