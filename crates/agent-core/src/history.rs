use std::collections::VecDeque;

/// Bounded append-only ring; the oldest entry is evicted first.
#[derive(Debug, Clone)]
pub struct History<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> History<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, returning the evicted one if the ring was full.
    pub fn push(&mut self, entry: T) -> Option<T> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn oldest(&self) -> Option<&T> {
        self.entries.front()
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip)
    }

    pub fn find(&self, mut pred: impl FnMut(&T) -> bool) -> Option<&T> {
        self.entries.iter().rev().find(|e| pred(e))
    }
}

impl<T: Clone> History<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let mut h = History::new(0);
        h.push(1);
        h.push(2);
        assert_eq!(h.to_vec(), vec![2]);
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let mut h = History::new(5);
        for i in 0..5 {
            h.push(i);
        }
        assert_eq!(h.recent(2).copied().collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(h.recent(10).count(), 5);
    }
}
