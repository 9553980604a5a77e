//! Fixed-capacity sorted candidate queue.
//!
//! Keeps the best (smallest-key) `capacity` entries seen so far, in
//! ascending key order. Used by the k-nearest traversal as both result
//! accumulator and pruning bound.

/// A fixed-capacity queue of `(key, value)` pairs sorted by ascending key.
///
/// Pushing into a full queue drops the worst entry when the new key beats
/// it, and is a no-op otherwise. The worst retained key is the
/// branch-and-bound pruning threshold for proximity queries.
///
/// # Example
///
/// ```
/// use cloud_spatial::BoundedQueue;
///
/// let mut queue = BoundedQueue::new(2);
/// queue.push(4.0, 7u32);
/// queue.push(1.0, 3);
/// queue.push(9.0, 5); // worse than both retained entries, dropped
///
/// let ids: Vec<u32> = queue.iter().map(|&(_, id)| id).collect();
/// assert_eq!(ids, vec![3, 7]);
/// ```
#[derive(Debug, Clone)]
pub struct BoundedQueue<T> {
    capacity: usize,
    entries: Vec<(f64, T)>,
}

impl<T> BoundedQueue<T> {
    /// Creates an empty queue holding at most `capacity` entries.
    ///
    /// A zero capacity is legal; such a queue retains nothing.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Inserts an entry, keeping the queue sorted and bounded.
    ///
    /// Returns `true` if the entry was retained.
    pub fn push(&mut self, key: f64, value: T) -> bool {
        if self.capacity == 0 {
            return false;
        }
        if self.entries.len() == self.capacity {
            match self.entries.last() {
                Some(&(worst, _)) if key >= worst => return false,
                _ => {
                    self.entries.pop();
                }
            }
        }
        let pos = self
            .entries
            .partition_point(|&(existing, _)| existing <= key);
        self.entries.insert(pos, (key, value));
        true
    }

    /// Returns the worst retained key, or `None` while the queue is empty.
    #[must_use]
    pub fn worst_key(&self) -> Option<f64> {
        self.entries.last().map(|&(key, _)| key)
    }

    /// Returns `true` once the queue holds `capacity` entries.
    ///
    /// Only a full queue prunes: an unfilled queue must accept any
    /// candidate regardless of key.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entries are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries the queue retains.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates entries in ascending key order.
    pub fn iter(&self) -> std::slice::Iter<'_, (f64, T)> {
        self.entries.iter()
    }

    /// The retained entries in ascending key order.
    #[must_use]
    pub fn as_slice(&self) -> &[(f64, T)] {
        &self.entries
    }

    /// Consumes the queue, returning entries in ascending key order.
    #[must_use]
    pub fn into_sorted_vec(self) -> Vec<(f64, T)> {
        self.entries
    }

    /// Drops all entries, keeping capacity and allocation.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<'a, T> IntoIterator for &'a BoundedQueue<T> {
    type Item = &'a (f64, T);
    type IntoIter = std::slice::Iter<'a, (f64, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_sorted_order() {
        let mut queue = BoundedQueue::new(4);
        queue.push(3.0, 'c');
        queue.push(1.0, 'a');
        queue.push(2.0, 'b');

        let keys: Vec<f64> = queue.iter().map(|&(k, _)| k).collect();
        assert_eq!(keys, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn evicts_worst_when_full() {
        let mut queue = BoundedQueue::new(2);
        assert!(queue.push(5.0, 0u32));
        assert!(queue.push(3.0, 1));
        assert!(queue.is_full());

        // Better than the worst: 5.0 goes.
        assert!(queue.push(4.0, 2));
        assert_eq!(queue.worst_key(), Some(4.0));

        // Worse than the worst: rejected.
        assert!(!queue.push(10.0, 3));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn equal_key_at_capacity_is_rejected() {
        let mut queue = BoundedQueue::new(1);
        queue.push(2.0, 0u32);
        assert!(!queue.push(2.0, 1));
        assert_eq!(queue.into_sorted_vec(), vec![(2.0, 0)]);
    }

    #[test]
    fn zero_capacity_retains_nothing() {
        let mut queue = BoundedQueue::new(0);
        assert!(!queue.push(1.0, 42u32));
        assert!(queue.is_empty());
        assert_eq!(queue.worst_key(), None);
    }

    #[test]
    fn unfilled_queue_never_prunes() {
        let mut queue = BoundedQueue::new(3);
        queue.push(1.0, 0u32);
        assert!(!queue.is_full());
        // Worse key still accepted while below capacity.
        assert!(queue.push(100.0, 1));
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut queue = BoundedQueue::new(2);
        queue.push(1.0, 0u32);
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), 2);
    }
}
