//! PDCP Reordering Buffer
//!
//! Holds deciphered and verified SDUs keyed by COUNT until they can be
//! delivered in order. All COUNT comparisons are serial (modulo 2^32)
//! relative to RX_DELIV, so the buffer keeps working across COUNT wrap.

use super::header::count_lt;
use crate::LayerError;
use bytes::Bytes;
use std::collections::BTreeMap;
use tracing::warn;

/// Result of a successful insertion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Entry stored
    Stored,
    /// Entry stored after dropping the oldest buffered COUNT to stay within the window
    StoredEvicting(u32),
}

/// SDUs awaiting in-order delivery
#[derive(Debug)]
pub struct ReorderingBuffer {
    entries: BTreeMap<u32, Bytes>,
    capacity: usize,
}

impl ReorderingBuffer {
    /// Create a buffer holding at most `capacity` (window_size) entries
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Store an SDU. Stale (below `rx_deliv`) and already buffered COUNTs are rejected.
    pub fn insert(
        &mut self,
        count: u32,
        sdu: Bytes,
        rx_deliv: u32,
    ) -> Result<InsertOutcome, LayerError> {
        if count_lt(count, rx_deliv) || self.entries.contains_key(&count) {
            return Err(LayerError::DuplicateOrStalePdu { count });
        }

        let mut outcome = InsertOutcome::Stored;
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.oldest(rx_deliv) {
                self.entries.remove(&oldest);
                warn!(
                    "{}",
                    LayerError::ProtocolViolation(format!(
                        "reordering buffer full ({} entries), dropped COUNT {}",
                        self.capacity, oldest
                    ))
                );
                outcome = InsertOutcome::StoredEvicting(oldest);
            }
        }

        self.entries.insert(count, sdu);
        Ok(outcome)
    }

    /// Remove and return the contiguous run starting at `rx_deliv`
    pub fn drain(&mut self, rx_deliv: u32) -> Vec<(u32, Bytes)> {
        let mut out = Vec::new();
        let mut next = rx_deliv;
        while let Some(sdu) = self.entries.remove(&next) {
            out.push((next, sdu));
            next = next.wrapping_add(1);
        }
        out
    }

    /// Remove and return every entry with COUNT below `bound`, in COUNT order
    pub fn drain_before(&mut self, bound: u32, rx_deliv: u32) -> Vec<(u32, Bytes)> {
        let mut counts: Vec<u32> = self
            .entries
            .keys()
            .copied()
            .filter(|&count| count_lt(count, bound))
            .collect();
        counts.sort_by_key(|count| count.wrapping_sub(rx_deliv));

        counts
            .into_iter()
            .filter_map(|count| self.entries.remove(&count).map(|sdu| (count, sdu)))
            .collect()
    }

    /// Lowest buffered COUNT relative to `rx_deliv`
    pub fn oldest(&self, rx_deliv: u32) -> Option<u32> {
        self.entries.keys().copied().min_by_key(|count| count.wrapping_sub(rx_deliv))
    }

    pub fn contains(&self, count: u32) -> bool {
        self.entries.contains_key(&count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop everything, e.g. on reestablishment
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sdu(tag: u32) -> Bytes {
        Bytes::from(tag.to_be_bytes().to_vec())
    }

    #[test]
    fn test_reordered_drain() {
        let mut buffer = ReorderingBuffer::new(2048);
        let rx_deliv = 5000;

        buffer.insert(5002, sdu(5002), rx_deliv).unwrap();
        buffer.insert(5001, sdu(5001), rx_deliv).unwrap();
        assert!(buffer.drain(rx_deliv).is_empty());

        buffer.insert(5000, sdu(5000), rx_deliv).unwrap();
        let delivered: Vec<u32> = buffer.drain(rx_deliv).into_iter().map(|(c, _)| c).collect();
        assert_eq!(delivered, vec![5000, 5001, 5002]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_stops_at_gap() {
        let mut buffer = ReorderingBuffer::new(16);
        for count in [10, 11, 13] {
            buffer.insert(count, sdu(count), 10).unwrap();
        }

        let delivered: Vec<u32> = buffer.drain(10).into_iter().map(|(c, _)| c).collect();
        assert_eq!(delivered, vec![10, 11]);
        assert!(buffer.contains(13));
    }

    #[test]
    fn test_rejects_stale_and_duplicate() {
        let mut buffer = ReorderingBuffer::new(16);
        assert!(matches!(
            buffer.insert(4999, sdu(1), 5000),
            Err(LayerError::DuplicateOrStalePdu { count: 4999 })
        ));

        buffer.insert(5003, sdu(1), 5000).unwrap();
        assert!(matches!(
            buffer.insert(5003, sdu(2), 5000),
            Err(LayerError::DuplicateOrStalePdu { count: 5003 })
        ));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut buffer = ReorderingBuffer::new(2);
        buffer.insert(3, sdu(3), 0).unwrap();
        buffer.insert(2, sdu(2), 0).unwrap();

        let outcome = buffer.insert(5, sdu(5), 0).unwrap();
        assert_eq!(outcome, InsertOutcome::StoredEvicting(2));
        assert_eq!(buffer.len(), 2);
        assert!(!buffer.contains(2));
    }

    #[test]
    fn test_drain_before_in_count_order_across_wrap() {
        let mut buffer = ReorderingBuffer::new(16);
        let rx_deliv = u32::MAX - 2;
        for count in [1u32, u32::MAX, u32::MAX - 1, 4] {
            buffer.insert(count, sdu(count), rx_deliv).unwrap();
        }

        let delivered: Vec<u32> = buffer
            .drain_before(3, rx_deliv)
            .into_iter()
            .map(|(c, _)| c)
            .collect();
        assert_eq!(delivered, vec![u32::MAX - 1, u32::MAX, 1]);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.oldest(rx_deliv), Some(4));
    }
}
