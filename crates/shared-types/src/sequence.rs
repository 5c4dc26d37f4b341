//! Monotonic id source shared by a router and the pools it serves.

use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out strictly increasing ids starting at 1.
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    last: AtomicU64,
}

impl SequenceGenerator {
    /// New generator; the first id is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id.
    pub fn next_id(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_ids_increase() {
        let seq = SequenceGenerator::new();
        assert_eq!(seq.next_id(), 1);
        assert_eq!(seq.next_id(), 2);
    }

    #[test]
    fn test_shared_between_threads() {
        let seq = Arc::new(SequenceGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let seq = Arc::clone(&seq);
                std::thread::spawn(move || (0..100).map(|_| seq.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 400);
    }
}
