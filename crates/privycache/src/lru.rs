//! LRU (Least Recently Used) recency list
//!
//! Uses intrusive linked list over a slab of nodes for O(1) lookup,
//! promotion and eviction. Every node remembers when it was last touched so
//! the owning cache can apply its TTL lazily.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use ahash::RandomState;

/// Node in the LRU doubly-linked list
struct Node<K, V> {
    key: K,
    value: V,
    touched: Instant,
    prev: Option<usize>,
    next: Option<usize>,
}

/// The index referenced a slab slot that holds no node.
///
/// Every path that vacates a slot removes its index entry under the same
/// `&mut self`, so this cannot be observed through the public API. It is
/// returned instead of panicking on the slab lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Dangling;

/// Outcome of a TTL-aware lookup
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Lookup<V> {
    Hit(V),
    Missing,
    Expired,
}

/// LRU list with fixed capacity
pub(crate) struct LruCache<K, V> {
    map: HashMap<K, usize, RandomState>,
    nodes: Vec<Option<Node<K, V>>>,
    head: Option<usize>,
    tail: Option<usize>,
    free_list: Vec<usize>,
    capacity: usize,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a new LRU list with the given capacity.
    ///
    /// Callers validate the capacity; a zero capacity never reaches here.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "Capacity must be greater than 0");

        Self {
            map: HashMap::with_capacity_and_hasher(capacity, RandomState::new()),
            nodes: Vec::with_capacity(capacity),
            head: None,
            tail: None,
            free_list: Vec::new(),
            capacity,
        }
    }

    /// Look up a key, dropping it when it is older than `ttl`.
    ///
    /// A hit refreshes both the recency position and the touch timestamp.
    pub fn get<Q>(&mut self, key: &Q, ttl: Duration, now: Instant) -> Result<Lookup<V>, Dangling>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(&idx) = self.map.get(key) else {
            return Ok(Lookup::Missing);
        };

        let node = self.nodes[idx].as_mut().ok_or(Dangling)?;
        if now.saturating_duration_since(node.touched) > ttl {
            self.remove(key);
            return Ok(Lookup::Expired);
        }

        node.touched = now;
        let value = node.value.clone();
        self.move_to_front(idx);

        Ok(Lookup::Hit(value))
    }

    /// Insert or overwrite a key.
    ///
    /// Returns the key evicted to make room, if any. Overwrites never evict.
    pub fn put(&mut self, key: K, value: V, now: Instant) -> Result<Option<K>, Dangling> {
        if let Some(&idx) = self.map.get(&key) {
            let node = self.nodes[idx].as_mut().ok_or(Dangling)?;
            node.value = value;
            node.touched = now;
            self.move_to_front(idx);
            return Ok(None);
        }

        let evicted = if self.map.len() >= self.capacity {
            self.evict()?
        } else {
            None
        };

        let idx = self.alloc_node();
        self.nodes[idx] = Some(Node {
            key: key.clone(),
            value,
            touched: now,
            prev: None,
            next: self.head,
        });

        if let Some(head_idx) = self.head {
            if let Some(head) = &mut self.nodes[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }

        self.map.insert(key, idx);
        Ok(evicted)
    }

    /// Remove a key from the list
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = self.map.remove(key)?;
        self.unlink(idx);
        self.free_node(idx);
        self.nodes[idx].take().map(|node| node.value)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the list is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.map.clear();
        self.nodes.clear();
        self.free_list.clear();
        self.head = None;
        self.tail = None;
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }

        self.unlink(idx);

        if let Some(node) = &mut self.nodes[idx] {
            node.prev = None;
            node.next = self.head;
        }

        if let Some(head_idx) = self.head {
            if let Some(head) = &mut self.nodes[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = if let Some(node) = &self.nodes[idx] {
            (node.prev, node.next)
        } else {
            return;
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_node) = &mut self.nodes[prev_idx] {
                    prev_node.next = next;
                }
            }
            None => {
                self.head = next;
            }
        }

        match next {
            Some(next_idx) => {
                if let Some(next_node) = &mut self.nodes[next_idx] {
                    next_node.prev = prev;
                }
            }
            None => {
                self.tail = prev;
            }
        }
    }

    fn evict(&mut self) -> Result<Option<K>, Dangling> {
        let Some(tail_idx) = self.tail else {
            return Ok(None);
        };

        // Unlink while the node is still in its slot; unlink reads its neighbours.
        self.unlink(tail_idx);
        let node = self.nodes[tail_idx].take().ok_or(Dangling)?;
        self.map.remove(&node.key);
        self.free_node(tail_idx);

        Ok(Some(node.key))
    }

    fn alloc_node(&mut self) -> usize {
        if let Some(idx) = self.free_list.pop() {
            idx
        } else {
            let idx = self.nodes.len();
            self.nodes.push(None);
            idx
        }
    }

    fn free_node(&mut self, idx: usize) {
        self.free_list.push(idx);
    }

    /// Walk the list and panic if it disagrees with the index.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        assert!(self.map.len() <= self.capacity, "size exceeds capacity");

        let mut seen = 0;
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let node = self.nodes[idx].as_ref().expect("linked slot is vacant");
            assert_eq!(node.prev, prev, "broken back-link at slot {idx}");
            assert_eq!(self.map.get(&node.key), Some(&idx), "index disagrees with list");
            seen += 1;
            prev = Some(idx);
            cursor = node.next;
        }

        assert_eq!(self.tail, prev, "tail is not the last node");
        assert_eq!(seen, self.map.len(), "list and index hold different key sets");
    }
}
