//! Size-classed byte buffer pool.
//!
//! Buffers up to 1 KiB are served from lock-free per-class queues; larger
//! requests fall through to a plain allocation.

use crossbeam_queue::ArrayQueue;

/// Buffer capacities served from the pool, ascending.
pub const SIZE_CLASSES: [usize; 20] = [
    16, 32, 48, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 448, 512, 640, 768, 896, 1024,
];

/// Largest pooled buffer size.
pub const MAX_POOLED: usize = 1024;

/// Pool of reusable byte buffers grouped by size class.
pub struct BufPool {
    classes: Vec<ArrayQueue<Vec<u8>>>,
}

impl BufPool {
    /// Create a pool retaining at most `per_class` buffers in each class (minimum 1).
    pub fn new(per_class: usize) -> Self {
        let per_class = per_class.max(1);
        Self {
            classes: SIZE_CLASSES.iter().map(|_| ArrayQueue::new(per_class)).collect(),
        }
    }

    /// A zeroed buffer of exactly `size` bytes.
    ///
    /// Its capacity is the smallest class that fits, so it can be returned
    /// with [`BufPool::put`].
    #[inline]
    pub fn get(&self, size: usize) -> Vec<u8> {
        if size == 0 {
            return Vec::new();
        }
        let Some(idx) = class_for(size) else {
            return vec![0; size];
        };

        let mut buf = self.classes[idx]
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(SIZE_CLASSES[idx]));
        buf.clear();
        buf.resize(size, 0);
        buf
    }

    /// Return a buffer. Kept only if its capacity is exactly a class size
    /// and that class has room; otherwise it is dropped.
    #[inline]
    pub fn put(&self, buf: Vec<u8>) {
        if let Ok(idx) = SIZE_CLASSES.binary_search(&buf.capacity()) {
            // Full class: let the buffer drop.
            let _ = self.classes[idx].push(buf);
        }
    }

    /// Buffers currently retained across all classes.
    pub fn retained(&self) -> usize {
        self.classes.iter().map(ArrayQueue::len).sum()
    }
}

impl Default for BufPool {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Index of the smallest class holding `size` bytes.
fn class_for(size: usize) -> Option<usize> {
    if size > MAX_POOLED {
        return None;
    }
    Some(SIZE_CLASSES.partition_point(|&class| class < size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_exact_length() {
        let pool = BufPool::new(4);
        for size in [1, 16, 17, 100, 513, 1024] {
            let buf = pool.get(size);
            assert_eq!(buf.len(), size);
            assert!(SIZE_CLASSES.contains(&buf.capacity()));
        }
        assert_eq!(pool.get(17).capacity(), 32);
        assert_eq!(pool.get(0).capacity(), 0);
    }

    #[test]
    fn oversized_requests_are_not_pooled() {
        let pool = BufPool::new(4);
        let buf = pool.get(4096);
        assert_eq!(buf.len(), 4096);
        pool.put(buf);
        assert_eq!(pool.retained(), 0);
    }

    #[test]
    fn buffers_are_reused_and_zeroed() {
        let pool = BufPool::new(4);
        let mut buf = pool.get(100);
        buf.fill(7);
        let ptr = buf.as_ptr();
        pool.put(buf);
        assert_eq!(pool.retained(), 1);

        let again = pool.get(110);
        assert_eq!(again.as_ptr(), ptr);
        assert!(again.iter().all(|&b| b == 0));
        assert_eq!(pool.retained(), 0);
    }

    #[test]
    fn foreign_capacities_are_dropped() {
        let pool = BufPool::new(4);
        pool.put(Vec::with_capacity(100));
        assert_eq!(pool.retained(), 0);
    }

    #[test]
    fn retention_is_bounded_per_class() {
        let pool = BufPool::new(2);
        for _ in 0..5 {
            pool.put(Vec::with_capacity(64));
        }
        assert_eq!(pool.retained(), 2);
    }
}
