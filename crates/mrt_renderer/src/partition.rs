//! Row partitioning: fixed bands per worker, or chunks claimed from a cursor.

use std::sync::atomic::{AtomicUsize, Ordering};

use mrt_math::Interval;

/// Rows `[min, max)` owned by worker `index` out of `workers`.
///
/// The first `height % workers` workers take one extra row, so bands
/// differ in size by at most one and tile `[0, height)` exactly. Every
/// rank evaluates this independently and gets the same answer.
pub fn static_rows(index: usize, workers: usize, height: usize) -> Interval<usize> {
    debug_assert!(workers > 0 && index < workers);

    let base = height / workers;
    let remainder = height % workers;

    let start = if index < remainder {
        index * (base + 1)
    } else {
        index * base + remainder
    };
    let len = if index < remainder { base + 1 } else { base };

    Interval::new(start, start + len)
}

/// All static bands in worker order.
pub fn static_partition(height: usize, workers: usize) -> Vec<Interval<usize>> {
    (0..workers)
        .map(|index| static_rows(index, workers, height))
        .collect()
}

/// Shared cursor handing out row chunks to whichever worker asks next.
#[derive(Debug)]
pub struct RowCursor {
    next: AtomicUsize,
    height: usize,
    chunk_rows: usize,
}

impl RowCursor {
    pub fn new(height: usize, chunk_rows: usize) -> Self {
        Self {
            next: AtomicUsize::new(0),
            height,
            // Larger chunks would only push the cursor toward overflow.
            chunk_rows: chunk_rows.clamp(1, height.max(1)),
        }
    }

    /// Claim the next chunk, or `None` once every row is taken.
    ///
    /// A single fetch-and-add reserves the chunk, so no two callers ever
    /// receive the same row.
    pub fn claim(&self) -> Option<Interval<usize>> {
        let start = self.next.fetch_add(self.chunk_rows, Ordering::Relaxed);
        if start >= self.height {
            return None;
        }
        Some(Interval::new(start, (start + self.chunk_rows).min(self.height)))
    }

    /// Index of the chunk that starts at `row`.
    pub fn chunk_index(&self, row: usize) -> usize {
        row / self.chunk_rows
    }

    pub fn chunk_rows(&self) -> usize {
        self.chunk_rows
    }

    /// Number of chunks the image splits into.
    pub fn chunk_count(&self) -> usize {
        self.height.div_ceil(self.chunk_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_static_partition_covers_exactly() {
        for height in 0..64 {
            for workers in 1..20 {
                let bands = static_partition(height, workers);
                assert_eq!(bands.len(), workers);

                // Contiguous, ordered, no gaps or overlaps.
                let mut expected_start = 0;
                for band in &bands {
                    assert_eq!(band.min, expected_start);
                    assert!(band.min <= band.max);
                    expected_start = band.max;
                }
                assert_eq!(expected_start, height);
            }
        }
    }

    #[test]
    fn test_static_partition_sizes() {
        // 10 rows over 4 workers: 3, 3, 2, 2
        let sizes: Vec<usize> = static_partition(10, 4).iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![3, 3, 2, 2]);

        // More workers than rows: leading workers get one row each.
        let sizes: Vec<usize> = static_partition(3, 5).iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![1, 1, 1, 0, 0]);
    }

    #[test]
    fn test_cursor_single_thread() {
        let cursor = RowCursor::new(10, 4);
        assert_eq!(cursor.claim(), Some(Interval::new(0, 4)));
        assert_eq!(cursor.claim(), Some(Interval::new(4, 8)));
        assert_eq!(cursor.claim(), Some(Interval::new(8, 10)));
        assert_eq!(cursor.claim(), None);
        assert_eq!(cursor.claim(), None);
        assert_eq!(cursor.chunk_count(), 3);
        assert_eq!(cursor.chunk_index(8), 2);
    }

    #[test]
    fn test_huge_chunk_is_clamped_to_height() {
        let cursor = RowCursor::new(10, usize::MAX);
        assert_eq!(cursor.chunk_rows(), 10);
        assert_eq!(cursor.chunk_count(), 1);
        assert_eq!(cursor.claim(), Some(Interval::new(0, 10)));
        for _ in 0..100 {
            assert_eq!(cursor.claim(), None);
        }
    }

    #[test]
    fn test_cursor_claims_each_row_once_across_threads() {
        for (height, chunk) in [(1000, 1), (997, 7), (5, 16)] {
            let cursor = RowCursor::new(height, chunk);
            let claimed = Mutex::new(vec![0u32; height]);

            std::thread::scope(|s| {
                for _ in 0..8 {
                    s.spawn(|| {
                        while let Some(band) = cursor.claim() {
                            let mut claimed = claimed.lock().unwrap();
                            for row in band.rows() {
                                claimed[row] += 1;
                            }
                        }
                    });
                }
            });

            assert!(claimed.into_inner().unwrap().iter().all(|&n| n == 1));
        }
    }
}
