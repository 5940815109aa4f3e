//! Bidirectional many-to-many index
//!
//! Each relation is stored once as an [`Entry`] that lives on two doubly
//! linked lists at the same time: the list of elements of its bucket and the
//! list of buckets of its element. List heads are not owned by the map; they
//! live in the bucket and element records themselves and are reached through
//! a [`HeadStore`]. That keeps every operation O(1) or O(result) with no
//! per-relation allocation beyond the pooled entry slot.

use crate::foundation::collections::{FreeList, Key, SlotMap};

/// Index of an entry in a multimap; also used as a list head
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(u32);

impl EntryId {
    /// Sentinel for "no entry"
    pub const INVALID: Self = Self(u32::MAX);

    /// Check if this id refers to an entry
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Access to the list heads stored in a key's record
///
/// An unknown key reads as [`EntryId::INVALID`] and ignores writes.
pub trait HeadStore<K> {
    /// Whether `key` names a live record
    fn contains(&self, key: K) -> bool;

    /// Current head for `key`
    fn head(&self, key: K) -> EntryId;

    /// Replace the head for `key`
    fn set_head(&mut self, key: K, head: EntryId);
}

/// Keyed record storage that a [`Heads`] adapter can project a head field out of
pub trait Records<K> {
    /// Record type
    type Record;

    /// Look up a record
    fn record(&self, key: K) -> Option<&Self::Record>;

    /// Look up a record mutably
    fn record_mut(&mut self, key: K) -> Option<&mut Self::Record>;
}

impl<K: Key, V> Records<K> for SlotMap<K, V> {
    type Record = V;

    fn record(&self, key: K) -> Option<&V> {
        self.get(key)
    }

    fn record_mut(&mut self, key: K) -> Option<&mut V> {
        self.get_mut(key)
    }
}

/// Adapter exposing one head field of a record store as a [`HeadStore`]
pub struct Heads<'a, S: ?Sized, R> {
    store: &'a mut S,
    get: fn(&R) -> EntryId,
    set: fn(&mut R, EntryId),
}

impl<'a, S: ?Sized, R> Heads<'a, S, R> {
    /// Wrap `store`, reading and writing heads through `get` and `set`
    pub fn new(store: &'a mut S, get: fn(&R) -> EntryId, set: fn(&mut R, EntryId)) -> Self {
        Self { store, get, set }
    }
}

impl<K, S, R> HeadStore<K> for Heads<'_, S, R>
where
    S: Records<K, Record = R> + ?Sized,
{
    fn contains(&self, key: K) -> bool {
        self.store.record(key).is_some()
    }

    fn head(&self, key: K) -> EntryId {
        self.store.record(key).map_or(EntryId::INVALID, self.get)
    }

    fn set_head(&mut self, key: K, head: EntryId) {
        if let Some(record) = self.store.record_mut(key) {
            (self.set)(record, head);
        }
    }
}

#[derive(Debug, Clone)]
struct Entry<B, E> {
    bucket: B,
    element: E,
    prev_in_bucket: EntryId,
    next_in_bucket: EntryId,
    prev_of_element: EntryId,
    next_of_element: EntryId,
}

/// Many-to-many relation between buckets `B` and elements `E`
///
/// Inserting the same pair twice creates two entries; callers deduplicate.
#[derive(Debug, Clone)]
pub struct BidirectionalMultimap<B, E> {
    entries: FreeList<Entry<B, E>>,
}

impl<B: Copy, E: Copy> Default for BidirectionalMultimap<B, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Copy, E: Copy> BidirectionalMultimap<B, E> {
    /// Create an empty multimap
    pub fn new() -> Self {
        Self { entries: FreeList::new() }
    }

    /// Create an empty multimap with preallocated entry storage
    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: FreeList::with_capacity(capacity) }
    }

    /// Preallocate room for `additional` more relations
    pub fn reserve(&mut self, additional: usize) {
        self.entries.reserve(additional);
    }

    /// Number of stored relations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no relations are stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every relation
    ///
    /// Heads held in records are not touched; callers reset or drop them.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn entry(&self, id: EntryId) -> Option<&Entry<B, E>> {
        if id.is_valid() { self.entries.get(id.index()) } else { None }
    }

    fn entry_mut(&mut self, id: EntryId) -> Option<&mut Entry<B, E>> {
        if id.is_valid() { self.entries.get_mut(id.index()) } else { None }
    }

    /// Relate `bucket` and `element`
    ///
    /// Returns [`EntryId::INVALID`] without inserting if either key is unknown.
    pub fn add_pair<BS, ES>(
        &mut self,
        buckets: &mut BS,
        elements: &mut ES,
        bucket: B,
        element: E,
    ) -> EntryId
    where
        BS: HeadStore<B> + ?Sized,
        ES: HeadStore<E> + ?Sized,
    {
        if !buckets.contains(bucket) || !elements.contains(element) {
            return EntryId::INVALID;
        }

        let bucket_head = buckets.head(bucket);
        let element_head = elements.head(element);
        let Ok(index) = u32::try_from(self.entries.insert(Entry {
            bucket,
            element,
            prev_in_bucket: EntryId::INVALID,
            next_in_bucket: bucket_head,
            prev_of_element: EntryId::INVALID,
            next_of_element: element_head,
        })) else {
            return EntryId::INVALID;
        };
        let id = EntryId(index);

        if let Some(next) = self.entry_mut(bucket_head) {
            next.prev_in_bucket = id;
        }
        if let Some(next) = self.entry_mut(element_head) {
            next.prev_of_element = id;
        }
        buckets.set_head(bucket, id);
        elements.set_head(element, id);
        id
    }

    fn unlink<BS, ES>(&mut self, buckets: &mut BS, elements: &mut ES, id: EntryId)
    where
        BS: HeadStore<B> + ?Sized,
        ES: HeadStore<E> + ?Sized,
    {
        let Some(entry) = self.entries.remove(id.index()) else {
            return;
        };

        match self.entry_mut(entry.prev_in_bucket) {
            Some(prev) => prev.next_in_bucket = entry.next_in_bucket,
            None => buckets.set_head(entry.bucket, entry.next_in_bucket),
        }
        if let Some(next) = self.entry_mut(entry.next_in_bucket) {
            next.prev_in_bucket = entry.prev_in_bucket;
        }

        match self.entry_mut(entry.prev_of_element) {
            Some(prev) => prev.next_of_element = entry.next_of_element,
            None => elements.set_head(entry.element, entry.next_of_element),
        }
        if let Some(next) = self.entry_mut(entry.next_of_element) {
            next.prev_of_element = entry.prev_of_element;
        }
    }

    /// Remove every relation of `bucket`, in both directions
    pub fn remove_bucket<BS, ES>(&mut self, buckets: &mut BS, elements: &mut ES, bucket: B)
    where
        BS: HeadStore<B> + ?Sized,
        ES: HeadStore<E> + ?Sized,
    {
        let mut id = buckets.head(bucket);
        while let Some(entry) = self.entry(id) {
            let next = entry.next_in_bucket;
            self.unlink(buckets, elements, id);
            id = next;
        }
        buckets.set_head(bucket, EntryId::INVALID);
    }

    /// Remove every relation of `element`, in both directions
    pub fn remove_element<BS, ES>(&mut self, buckets: &mut BS, elements: &mut ES, element: E)
    where
        BS: HeadStore<B> + ?Sized,
        ES: HeadStore<E> + ?Sized,
    {
        let mut id = elements.head(element);
        while let Some(entry) = self.entry(id) {
            let next = entry.next_of_element;
            self.unlink(buckets, elements, id);
            id = next;
        }
        elements.set_head(element, EntryId::INVALID);
    }

    /// First entry of a bucket's element list
    pub fn first_in_bucket<BS: HeadStore<B> + ?Sized>(&self, buckets: &BS, bucket: B) -> EntryId {
        buckets.head(bucket)
    }

    /// Entry after `id` in its bucket's element list
    pub fn next_in_bucket(&self, id: EntryId) -> EntryId {
        self.entry(id).map_or(EntryId::INVALID, |e| e.next_in_bucket)
    }

    /// First entry of an element's bucket list
    pub fn first_bucket_of<ES: HeadStore<E> + ?Sized>(&self, elements: &ES, element: E) -> EntryId {
        elements.head(element)
    }

    /// Entry after `id` in its element's bucket list
    pub fn next_bucket_of(&self, id: EntryId) -> EntryId {
        self.entry(id).map_or(EntryId::INVALID, |e| e.next_of_element)
    }

    /// Element of an entry
    pub fn element(&self, id: EntryId) -> Option<E> {
        self.entry(id).map(|e| e.element)
    }

    /// Bucket of an entry
    pub fn bucket(&self, id: EntryId) -> Option<B> {
        self.entry(id).map(|e| e.bucket)
    }

    /// Iterate the elements of the bucket whose list starts at `head`
    pub fn elements_in(&self, head: EntryId) -> ElementsIter<'_, B, E> {
        ElementsIter { map: self, current: head }
    }

    /// Iterate the buckets of the element whose list starts at `head`
    pub fn buckets_of(&self, head: EntryId) -> BucketsIter<'_, B, E> {
        BucketsIter { map: self, current: head }
    }
}

/// Iterator over the elements of one bucket
pub struct ElementsIter<'a, B, E> {
    map: &'a BidirectionalMultimap<B, E>,
    current: EntryId,
}

impl<B: Copy, E: Copy> Iterator for ElementsIter<'_, B, E> {
    type Item = E;

    fn next(&mut self) -> Option<E> {
        let entry = self.map.entry(self.current)?;
        self.current = entry.next_in_bucket;
        Some(entry.element)
    }
}

/// Iterator over the buckets of one element
pub struct BucketsIter<'a, B, E> {
    map: &'a BidirectionalMultimap<B, E>,
    current: EntryId,
}

impl<B: Copy, E: Copy> Iterator for BucketsIter<'_, B, E> {
    type Item = B;

    fn next(&mut self) -> Option<B> {
        let entry = self.map.entry(self.current)?;
        self.current = entry.next_of_element;
        Some(entry.bucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Dense head table indexed by key
    struct DenseHeads(Vec<EntryId>);

    impl DenseHeads {
        fn new(count: usize) -> Self {
            Self(vec![EntryId::INVALID; count])
        }
    }

    impl HeadStore<usize> for DenseHeads {
        fn contains(&self, key: usize) -> bool {
            key < self.0.len()
        }

        fn head(&self, key: usize) -> EntryId {
            self.0.get(key).copied().unwrap_or(EntryId::INVALID)
        }

        fn set_head(&mut self, key: usize, head: EntryId) {
            if let Some(slot) = self.0.get_mut(key) {
                *slot = head;
            }
        }
    }

    fn sorted<I: Iterator<Item = usize>>(iter: I) -> Vec<usize> {
        let mut v: Vec<usize> = iter.collect();
        v.sort_unstable();
        v
    }

    #[test]
    fn test_pairs_visible_from_both_sides() {
        let mut map = BidirectionalMultimap::new();
        let mut buckets = DenseHeads::new(4);
        let mut elements = DenseHeads::new(4);

        for (b, e) in [(0, 1), (0, 2), (1, 1), (3, 1)] {
            assert!(map.add_pair(&mut buckets, &mut elements, b, e).is_valid());
        }

        assert_eq!(sorted(map.elements_in(buckets.head(0))), vec![1, 2]);
        assert_eq!(sorted(map.buckets_of(elements.head(1))), vec![0, 1, 3]);
        assert_eq!(sorted(map.buckets_of(elements.head(2))), vec![0]);
        assert_eq!(map.elements_in(buckets.head(2)).count(), 0);
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn test_remove_bucket_clears_both_directions() {
        let mut map = BidirectionalMultimap::new();
        let mut buckets = DenseHeads::new(3);
        let mut elements = DenseHeads::new(3);

        for (b, e) in [(0, 0), (0, 1), (1, 1), (2, 0)] {
            map.add_pair(&mut buckets, &mut elements, b, e);
        }

        map.remove_bucket(&mut buckets, &mut elements, 0);

        assert!(!buckets.head(0).is_valid());
        assert_eq!(sorted(map.buckets_of(elements.head(0))), vec![2]);
        assert_eq!(sorted(map.buckets_of(elements.head(1))), vec![1]);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_remove_element_clears_both_directions() {
        let mut map = BidirectionalMultimap::new();
        let mut buckets = DenseHeads::new(3);
        let mut elements = DenseHeads::new(3);

        for (b, e) in [(0, 0), (1, 0), (2, 0), (1, 2)] {
            map.add_pair(&mut buckets, &mut elements, b, e);
        }

        map.remove_element(&mut buckets, &mut elements, 0);

        assert!(!elements.head(0).is_valid());
        assert_eq!(map.elements_in(buckets.head(0)).count(), 0);
        assert_eq!(sorted(map.elements_in(buckets.head(1))), vec![2]);
        assert_eq!(map.elements_in(buckets.head(2)).count(), 0);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_unknown_keys_are_noops() {
        let mut map: BidirectionalMultimap<usize, usize> = BidirectionalMultimap::new();
        let mut buckets = DenseHeads::new(1);
        let mut elements = DenseHeads::new(1);

        assert_eq!(map.add_pair(&mut buckets, &mut elements, 5, 0), EntryId::INVALID);
        assert!(map.is_empty());

        map.remove_bucket(&mut buckets, &mut elements, 9);
        map.remove_element(&mut buckets, &mut elements, 9);
        assert_eq!(map.first_in_bucket(&buckets, 9), EntryId::INVALID);
        assert_eq!(map.next_in_bucket(EntryId::INVALID), EntryId::INVALID);
        assert_eq!(map.element(EntryId::INVALID), None);
    }

    #[test]
    fn test_manual_walk_and_slot_reuse() {
        let mut map = BidirectionalMultimap::new();
        let mut buckets = DenseHeads::new(2);
        let mut elements = DenseHeads::new(2);

        map.add_pair(&mut buckets, &mut elements, 0, 0);
        map.add_pair(&mut buckets, &mut elements, 0, 1);

        let mut seen = Vec::new();
        let mut id = map.first_in_bucket(&buckets, 0);
        while id.is_valid() {
            seen.push(map.element(id));
            assert_eq!(map.bucket(id), Some(0));
            id = map.next_in_bucket(id);
        }
        assert_eq!(seen.len(), 2);

        map.remove_element(&mut buckets, &mut elements, 1);
        let reused = map.add_pair(&mut buckets, &mut elements, 1, 1);
        assert!(reused.is_valid());
        assert_eq!(map.len(), 2);
        assert_eq!(map.first_bucket_of(&elements, 1), reused);
        assert_eq!(map.next_bucket_of(reused), EntryId::INVALID);
    }

    #[test]
    fn test_slotmap_records_as_heads() {
        crate::foundation::collections::new_key_type! { struct TestKey; }
        struct Rec {
            head: EntryId,
        }

        let mut left: SlotMap<TestKey, Rec> = SlotMap::with_key();
        let mut right = DenseHeads::new(1);
        let a = left.insert(Rec { head: EntryId::INVALID });
        let mut map = BidirectionalMultimap::new();

        {
            let mut heads = Heads::new(&mut left, |r: &Rec| r.head, |r: &mut Rec, h| r.head = h);
            map.add_pair(&mut heads, &mut right, a, 0);
        }
        assert!(left[a].head.is_valid());
        assert_eq!(map.elements_in(left[a].head).collect::<Vec<_>>(), vec![0]);
    }
}
