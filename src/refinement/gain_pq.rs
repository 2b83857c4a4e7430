//! Gain-keyed max-priority queues.
//!
//! Two back-ends behind one enum: a bucket queue indexed by gain, used when
//! the maximum |gain| (bounded by max degree times max edge weight) fits a
//! reasonable bucket range, and a binary max-heap with a handle table for
//! general use. Both support insert, change-key, delete-by-id, and pop-max.
//! Tie order between equal gains differs between the back-ends and is not
//! part of the contract; refinement tolerates it by rolling back to the best
//! seen cut.

use hashbrown::HashMap;

use crate::graph::{Gain, NodeId};

/// Largest gain span the bucket back-end will allocate.
const MAX_BUCKET_SPAN: Gain = 1 << 20;

/// Max-priority queue over `(node, gain)` pairs.
#[derive(Debug)]
pub enum GainQueue {
    Bucket(BucketQueue),
    Heap(MaxHeap),
}

impl GainQueue {
    /// Pick a back-end: bucket when `max_gain_span` is known and small enough,
    /// heap otherwise.
    pub fn new(use_buckets: bool, max_gain_span: Gain) -> Self {
        if use_buckets && max_gain_span > 0 && max_gain_span <= MAX_BUCKET_SPAN {
            GainQueue::Bucket(BucketQueue::new(max_gain_span))
        } else {
            GainQueue::Heap(MaxHeap::new())
        }
    }

    pub fn insert(&mut self, node: NodeId, gain: Gain) {
        match self {
            GainQueue::Bucket(q) => q.insert(node, gain),
            GainQueue::Heap(q) => q.insert(node, gain),
        }
    }

    pub fn change_key(&mut self, node: NodeId, gain: Gain) {
        match self {
            GainQueue::Bucket(q) => q.change_key(node, gain),
            GainQueue::Heap(q) => q.change_key(node, gain),
        }
    }

    pub fn delete(&mut self, node: NodeId) {
        match self {
            GainQueue::Bucket(q) => q.delete(node),
            GainQueue::Heap(q) => q.delete(node),
        }
    }

    pub fn pop_max(&mut self) -> Option<(NodeId, Gain)> {
        match self {
            GainQueue::Bucket(q) => q.pop_max(),
            GainQueue::Heap(q) => q.pop_max(),
        }
    }

    pub fn max_gain(&self) -> Option<Gain> {
        match self {
            GainQueue::Bucket(q) => q.max_gain(),
            GainQueue::Heap(q) => q.max_gain(),
        }
    }

    pub fn contains(&self, node: NodeId) -> bool {
        match self {
            GainQueue::Bucket(q) => q.contains(node),
            GainQueue::Heap(q) => q.contains(node),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        match self {
            GainQueue::Bucket(q) => q.len,
            GainQueue::Heap(q) => q.entries.len(),
        }
    }

    pub fn clear(&mut self) {
        match self {
            GainQueue::Bucket(q) => q.clear(),
            GainQueue::Heap(q) => q.clear(),
        }
    }
}

/// Bucket queue over the gain range `[-span, span]`.
///
/// Pop-max is O(1) amortized with a linear scan for the next occupied
/// bucket; delete-by-id swap-removes inside the bucket, so ties leave in
/// approximately (not strictly) first-in order.
#[derive(Debug)]
pub struct BucketQueue {
    span: Gain,
    buckets: Vec<Vec<NodeId>>,
    // node -> (bucket index, position in bucket)
    handles: HashMap<NodeId, (usize, usize)>,
    max_bucket: usize,
    len: usize,
}

impl BucketQueue {
    pub fn new(span: Gain) -> Self {
        let buckets = vec![Vec::new(); (2 * span + 1) as usize];
        Self {
            span,
            buckets,
            handles: HashMap::new(),
            max_bucket: 0,
            len: 0,
        }
    }

    #[inline]
    fn bucket_of(&self, gain: Gain) -> usize {
        (gain.clamp(-self.span, self.span) + self.span) as usize
    }

    pub fn insert(&mut self, node: NodeId, gain: Gain) {
        debug_assert!(!self.handles.contains_key(&node));
        let b = self.bucket_of(gain);
        self.buckets[b].push(node);
        self.handles.insert(node, (b, self.buckets[b].len() - 1));
        self.max_bucket = self.max_bucket.max(b);
        self.len += 1;
    }

    pub fn change_key(&mut self, node: NodeId, gain: Gain) {
        self.delete(node);
        self.insert(node, gain);
    }

    pub fn delete(&mut self, node: NodeId) {
        let Some((b, pos)) = self.handles.remove(&node) else {
            return;
        };
        self.buckets[b].swap_remove(pos);
        if let Some(&moved) = self.buckets[b].get(pos) {
            self.handles.insert(moved, (b, pos));
        }
        self.len -= 1;
    }

    pub fn pop_max(&mut self) -> Option<(NodeId, Gain)> {
        if self.len == 0 {
            return None;
        }
        while self.buckets[self.max_bucket].is_empty() {
            // len > 0 guarantees an occupied bucket below
            self.max_bucket -= 1;
        }
        let b = self.max_bucket;
        let node = self.buckets[b].swap_remove(0);
        if let Some(&moved) = self.buckets[b].first() {
            self.handles.insert(moved, (b, 0));
        }
        self.handles.remove(&node);
        self.len -= 1;
        Some((node, b as Gain - self.span))
    }

    pub fn max_gain(&self) -> Option<Gain> {
        if self.len == 0 {
            return None;
        }
        let mut b = self.max_bucket;
        while self.buckets[b].is_empty() {
            b -= 1;
        }
        Some(b as Gain - self.span)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.handles.contains_key(&node)
    }

    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.handles.clear();
        self.max_bucket = 0;
        self.len = 0;
    }
}

/// Binary max-heap with a node-to-slot handle table; equal gains leave in
/// insertion order.
#[derive(Debug, Default)]
pub struct MaxHeap {
    // (gain, insertion sequence, node), ordered by gain desc then seq asc
    entries: Vec<(Gain, u64, NodeId)>,
    handles: HashMap<NodeId, usize>,
    next_seq: u64,
}

impl MaxHeap {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn precedes(a: &(Gain, u64, NodeId), b: &(Gain, u64, NodeId)) -> bool {
        a.0 > b.0 || (a.0 == b.0 && a.1 < b.1)
    }

    pub fn insert(&mut self, node: NodeId, gain: Gain) {
        debug_assert!(!self.handles.contains_key(&node));
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push((gain, seq, node));
        let slot = self.entries.len() - 1;
        self.handles.insert(node, slot);
        self.sift_up(slot);
    }

    pub fn change_key(&mut self, node: NodeId, gain: Gain) {
        let Some(&slot) = self.handles.get(&node) else {
            return;
        };
        self.entries[slot].0 = gain;
        self.sift_up(slot);
        if let Some(&slot) = self.handles.get(&node) {
            self.sift_down(slot);
        }
    }

    pub fn delete(&mut self, node: NodeId) {
        let Some(slot) = self.handles.remove(&node) else {
            return;
        };
        let last = self.entries.len() - 1;
        if slot != last {
            self.entries.swap(slot, last);
            self.handles.insert(self.entries[slot].2, slot);
        }
        self.entries.pop();
        if slot < self.entries.len() {
            self.sift_up(slot);
            let moved = self.entries[slot].2;
            if let Some(&s) = self.handles.get(&moved) {
                self.sift_down(s);
            }
        }
    }

    pub fn pop_max(&mut self) -> Option<(NodeId, Gain)> {
        let &(gain, _, node) = self.entries.first()?;
        self.delete(node);
        Some((node, gain))
    }

    pub fn max_gain(&self) -> Option<Gain> {
        self.entries.first().map(|e| e.0)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.handles.contains_key(&node)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.handles.clear();
        self.next_seq = 0;
    }

    fn sift_up(&mut self, mut slot: usize) {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if Self::precedes(&self.entries[slot], &self.entries[parent]) {
                self.entries.swap(slot, parent);
                self.handles.insert(self.entries[slot].2, slot);
                self.handles.insert(self.entries[parent].2, parent);
                slot = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut slot: usize) {
        loop {
            let left = 2 * slot + 1;
            let right = 2 * slot + 2;
            let mut best = slot;
            if left < self.entries.len() && Self::precedes(&self.entries[left], &self.entries[best])
            {
                best = left;
            }
            if right < self.entries.len()
                && Self::precedes(&self.entries[right], &self.entries[best])
            {
                best = right;
            }
            if best == slot {
                break;
            }
            self.entries.swap(slot, best);
            self.handles.insert(self.entries[slot].2, slot);
            self.handles.insert(self.entries[best].2, best);
            slot = best;
        }
    }
}
