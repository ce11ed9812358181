//! Fixed-capacity binary max-heap keyed by priority
//!
//! The scheduler keeps runnable thread ids here so that picking the next
//! thread costs O(log n) instead of a scan over the whole table. Entries of
//! equal priority leave the heap in insertion order: every push is stamped
//! with a sequence number and older stamps rank higher.

use heapless::Vec;
use crate::Priority;

#[derive(Debug, Clone)]
struct Node<T> {
    priority: Priority,
    seq: u64,
    item: T,
}

impl<T> Node<T> {
    /// Heap order: higher priority, then earlier insertion.
    fn outranks(&self, other: &Node<T>) -> bool {
        self.priority > other.priority
            || (self.priority == other.priority && self.seq < other.seq)
    }
}

/// Max-heap of `(priority, item)` pairs with FIFO tie-break.
#[derive(Debug, Clone)]
pub struct PriorityQueue<T, const N: usize> {
    nodes: Vec<Node<T>, N>,
    next_seq: u64,
}

impl<T, const N: usize> PriorityQueue<T, N> {
    pub const fn new() -> Self {
        Self {
            nodes: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.nodes.is_full()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Insert an item; hands it back if the heap is full.
    pub fn push(&mut self, priority: Priority, item: T) -> Result<(), T> {
        let node = Node {
            priority,
            seq: self.next_seq,
            item,
        };
        if let Err(node) = self.nodes.push(node) {
            return Err(node.item);
        }
        self.next_seq = self.next_seq.wrapping_add(1);
        self.sift_up(self.nodes.len() - 1);
        Ok(())
    }

    /// Remove the highest-ranked item.
    pub fn pop(&mut self) -> Option<(Priority, T)> {
        if self.nodes.is_empty() {
            return None;
        }
        let last = self.nodes.len() - 1;
        self.nodes.swap(0, last);
        let node = self.nodes.pop()?;
        self.sift_down(0);
        Some((node.priority, node.item))
    }

    pub fn peek(&self) -> Option<(Priority, &T)> {
        self.nodes.first().map(|n| (n.priority, &n.item))
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Keep only items matching `keep`, then restore the heap property.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&T) -> bool,
    {
        self.nodes.retain(|n| keep(&n.item));
        for i in (0..self.nodes.len() / 2).rev() {
            self.sift_down(i);
        }
    }

    /// Items in heap (not priority) order.
    pub fn iter(&self) -> impl Iterator<Item = (Priority, &T)> {
        self.nodes.iter().map(|n| (n.priority, &n.item))
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if !self.nodes[i].outranks(&self.nodes[parent]) {
                break;
            }
            self.nodes.swap(i, parent);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let len = self.nodes.len();
        loop {
            let left = 2 * i + 1;
            let right = left + 1;
            let mut largest = i;
            if left < len && self.nodes[left].outranks(&self.nodes[largest]) {
                largest = left;
            }
            if right < len && self.nodes[right].outranks(&self.nodes[largest]) {
                largest = right;
            }
            if largest == i {
                break;
            }
            self.nodes.swap(i, largest);
            i = largest;
        }
    }
}

impl<T, const N: usize> Default for PriorityQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
