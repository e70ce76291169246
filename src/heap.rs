use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone)]
struct HeapEntry<T> {
    distance: f64,
    index: u64,
    item: T,
}

impl<T> HeapEntry<T> {
    fn key_cmp(&self, distance: f64, index: u64) -> Ordering {
        self.distance
            .total_cmp(&distance)
            .then(self.index.cmp(&index))
    }
}

impl<T> PartialEq for HeapEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.distance.to_bits() == other.distance.to_bits() && self.index == other.index
    }
}

impl<T> Eq for HeapEntry<T> {}

impl<T> PartialOrd for HeapEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for HeapEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key_cmp(other.distance, other.index)
    }
}

/// Max-heap holding at most `capacity` entries with the smallest
/// `(distance, index)` keys seen so far.
///
/// Keys compare by distance, then by object index, so among equal distances
/// the lower index is kept.
#[derive(Debug, Clone)]
pub(crate) struct BoundedMaxHeap<T> {
    capacity: usize,
    heap: BinaryHeap<HeapEntry<T>>,
}

impl<T> BoundedMaxHeap<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            // `capacity` can be huge for "give me everything" queries.
            heap: BinaryHeap::with_capacity(capacity.min(1024) + 1),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    /// Largest admitted distance, or `None` while the heap is not yet full.
    pub fn threshold(&self) -> Option<f64> {
        if self.is_full() {
            self.heap.peek().map(|entry| entry.distance)
        } else {
            None
        }
    }

    /// Admit an entry if the heap has room or the key beats the current worst.
    ///
    /// When full, the worst entry is evicted before the new one is inserted, so
    /// the size never exceeds `capacity`. Returns whether the entry was kept.
    pub fn offer(&mut self, distance: f64, index: u64, item: T) -> bool {
        if self.capacity == 0 {
            return false;
        }
        if self.heap.len() < self.capacity {
            self.heap.push(HeapEntry {
                distance,
                index,
                item,
            });
            return true;
        }
        let beats_worst = self
            .heap
            .peek()
            .is_some_and(|worst| worst.key_cmp(distance, index) == Ordering::Greater);
        if !beats_worst {
            return false;
        }
        self.heap.pop();
        self.heap.push(HeapEntry {
            distance,
            index,
            item,
        });
        true
    }

    /// Drain into `(distance, index, item)` triples, best first.
    pub fn into_sorted_vec(self) -> Vec<(f64, u64, T)> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|entry| (entry.distance, entry.index, entry.item))
            .collect()
    }
}
