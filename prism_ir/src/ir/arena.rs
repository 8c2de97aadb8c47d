//! Arena storage for IR nodes.
//!
//! The arena provides:
//! - **O(1) allocation**: Append-only slot vector
//! - **Stable ids**: A removed slot becomes a tombstone and its index is never reused
//! - **Fast iteration**: Linear traversal of live items
//! - **Zero-cost IDs**: `Id<T>` is just an index into the arena
//!
//! Removal leaves a hole instead of compacting so that every id handed out
//! during a compilation stays meaningful until the graph is dropped.

use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

// =============================================================================
// Typed ID
// =============================================================================

/// A type-safe identifier for arena-allocated items.
///
/// The generic parameter `T` ensures you can't mix up IDs from different arenas.
/// Traits are implemented manually so `Id<T>` is always Copy/Eq/Hash
/// regardless of what `T` implements.
pub struct Id<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Copy for Id<T> {}

impl<T> Clone for Id<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Id<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    #[inline]
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> std::hash::Hash for Id<T> {
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> Id<T> {
    /// Create a new ID from a raw index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Id {
            index,
            _marker: PhantomData,
        }
    }

    /// Get the raw index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Get the index as usize.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.index as usize
    }
}

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.index)
    }
}

impl<T> std::fmt::Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.index)
    }
}

// =============================================================================
// Arena
// =============================================================================

/// An arena of homogeneous items addressed by [`Id`].
///
/// Slots are never reused: `remove` leaves a tombstone, so a stale id
/// resolves to `None` instead of silently aliasing a newer item.
#[derive(Debug)]
pub struct Arena<T> {
    slots: Vec<Option<T>>,
    live: usize,
}

impl<T> Arena<T> {
    /// Create a new empty arena.
    #[inline]
    pub fn new() -> Self {
        Arena {
            slots: Vec::new(),
            live: 0,
        }
    }

    /// Create a new arena with the given initial capacity.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Arena {
            slots: Vec::with_capacity(capacity),
            live: 0,
        }
    }

    /// Allocate a new item and return its ID.
    #[inline]
    pub fn alloc(&mut self, item: T) -> Id<T> {
        let index = self.slots.len() as u32;
        self.slots.push(Some(item));
        self.live += 1;
        Id::new(index)
    }

    /// Remove an item, leaving a tombstone in its slot.
    pub fn remove(&mut self, id: Id<T>) -> Option<T> {
        let taken = self.slots.get_mut(id.as_usize())?.take();
        if taken.is_some() {
            self.live -= 1;
        }
        taken
    }

    /// Get a reference to a live item by ID.
    #[inline]
    pub fn get(&self, id: Id<T>) -> Option<&T> {
        self.slots.get(id.as_usize()).and_then(Option::as_ref)
    }

    /// Get a mutable reference to a live item by ID.
    #[inline]
    pub fn get_mut(&mut self, id: Id<T>) -> Option<&mut T> {
        self.slots.get_mut(id.as_usize()).and_then(Option::as_mut)
    }

    /// Check whether `id` refers to a live item.
    #[inline]
    pub fn contains(&self, id: Id<T>) -> bool {
        self.get(id).is_some()
    }

    /// Number of live items.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Check if the arena holds no live items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of slots ever allocated, tombstones included.
    #[inline]
    pub fn capacity_used(&self) -> usize {
        self.slots.len()
    }

    /// Iterate over live items with their IDs.
    pub fn iter(&self) -> impl Iterator<Item = (Id<T>, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|item| (Id::new(i as u32), item)))
    }

    /// Iterate over the IDs of live items.
    pub fn ids(&self) -> impl Iterator<Item = Id<T>> + '_ {
        self.iter().map(|(id, _)| id)
    }

    /// Reserve capacity for at least `additional` more items.
    #[inline]
    pub fn reserve(&mut self, additional: usize) {
        self.slots.reserve(additional);
    }

    /// Get the next ID that will be allocated.
    #[inline]
    pub fn next_id(&self) -> Id<T> {
        Id::new(self.slots.len() as u32)
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<Id<T>> for Arena<T> {
    type Output = T;

    #[inline]
    fn index(&self, id: Id<T>) -> &Self::Output {
        match self.get(id) {
            Some(item) => item,
            None => panic!("arena access to removed or foreign id {id}"),
        }
    }
}

impl<T> IndexMut<Id<T>> for Arena<T> {
    #[inline]
    fn index_mut(&mut self, id: Id<T>) -> &mut Self::Output {
        match self.get_mut(id) {
            Some(item) => item,
            None => panic!("arena access to removed or foreign id {id}"),
        }
    }
}

// =============================================================================
// Secondary Map
// =============================================================================

/// A secondary map that associates additional data with arena items.
///
/// Used for side tables (use lists, analysis results) that should not live
/// inside the node itself.
#[derive(Debug, Clone)]
pub struct SecondaryMap<K, V> {
    values: Vec<V>,
    _marker: PhantomData<fn() -> K>,
}

impl<K, V: Default + Clone> SecondaryMap<K, V> {
    /// Create a new empty secondary map.
    pub fn new() -> Self {
        SecondaryMap {
            values: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Create a secondary map pre-sized for an arena of `capacity` slots.
    pub fn with_capacity(capacity: usize) -> Self {
        SecondaryMap {
            values: vec![V::default(); capacity],
            _marker: PhantomData,
        }
    }

    /// Get a value by ID.
    pub fn get(&self, id: Id<K>) -> Option<&V> {
        self.values.get(id.as_usize())
    }

    /// Get a mutable value by ID, growing the map as needed.
    pub fn entry(&mut self, id: Id<K>) -> &mut V {
        let idx = id.as_usize();
        if idx >= self.values.len() {
            self.values.resize(idx + 1, V::default());
        }
        &mut self.values[idx]
    }

    /// Reset the value for `id` to its default.
    pub fn reset(&mut self, id: Id<K>) {
        if let Some(value) = self.values.get_mut(id.as_usize()) {
            *value = V::default();
        }
    }
}

impl<K, V: Default + Clone> Default for SecondaryMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Bit Set
// =============================================================================

/// A compact bit set for visited marks during traversals.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BitSet {
    bits: Vec<u64>,
}

impl BitSet {
    /// Create a new empty bit set.
    pub fn new() -> Self {
        BitSet { bits: Vec::new() }
    }

    /// Create a new bit set with room for `n` bits.
    pub fn with_capacity(n: usize) -> Self {
        BitSet {
            bits: vec![0; n.div_ceil(64)],
        }
    }

    /// Set a bit; returns `true` if it was not already set.
    #[inline]
    pub fn insert(&mut self, index: usize) -> bool {
        let word = index / 64;
        if word >= self.bits.len() {
            self.bits.resize(word + 1, 0);
        }
        let mask = 1u64 << (index % 64);
        let fresh = self.bits[word] & mask == 0;
        self.bits[word] |= mask;
        fresh
    }

    /// Check if a bit is set.
    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.bits
            .get(index / 64)
            .is_some_and(|word| word & (1u64 << (index % 64)) != 0)
    }

    /// Count the number of set bits.
    pub fn count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct TestNode {
        value: i32,
    }

    #[test]
    fn test_arena_alloc() {
        let mut arena: Arena<TestNode> = Arena::new();

        let id1 = arena.alloc(TestNode { value: 10 });
        let id2 = arena.alloc(TestNode { value: 20 });

        assert_eq!(id1.index(), 0);
        assert_eq!(id2.index(), 1);
        assert_eq!(arena[id1].value, 10);

        arena[id2].value = 200;
        assert_eq!(arena[id2].value, 200);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_arena_remove_leaves_tombstone() {
        let mut arena: Arena<TestNode> = Arena::new();
        let a = arena.alloc(TestNode { value: 1 });
        let b = arena.alloc(TestNode { value: 2 });

        assert_eq!(arena.remove(a).map(|n| n.value), Some(1));
        assert!(arena.remove(a).is_none());
        assert!(!arena.contains(a));
        assert!(arena.contains(b));
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.capacity_used(), 2);

        // Removed slots are never reused.
        let c = arena.alloc(TestNode { value: 3 });
        assert_eq!(c.index(), 2);
        let live: Vec<_> = arena.iter().map(|(_, n)| n.value).collect();
        assert_eq!(live, vec![2, 3]);
    }

    #[test]
    fn test_secondary_map_grows() {
        let mut map: SecondaryMap<TestNode, Vec<u32>> = SecondaryMap::new();
        map.entry(Id::new(3)).push(7);
        assert_eq!(map.get(Id::new(3)), Some(&vec![7]));
        assert_eq!(map.get(Id::new(0)), Some(&Vec::new()));
        assert_eq!(map.get(Id::new(9)), None);

        map.reset(Id::new(3));
        assert!(map.get(Id::new(3)).is_some_and(Vec::is_empty));
    }

    #[test]
    fn test_bit_set() {
        let mut set = BitSet::with_capacity(8);
        assert!(set.insert(0));
        assert!(set.insert(100));
        assert!(!set.insert(100));

        assert!(set.contains(0));
        assert!(set.contains(100));
        assert!(!set.contains(65));
        assert_eq!(set.count(), 2);
    }
}
