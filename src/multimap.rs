use core::borrow::Borrow;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;

use crate::hasher::DefaultHashBuilder;
use crate::map::Iter;
use crate::map::IterMut;
use crate::table::RobinHoodTable;

/// A hash map that can hold several entries with the same key.
///
/// Entries with equal keys are not grouped together; [`equal_range`] walks the
/// probe sequence of a key and yields each of them.
///
/// [`equal_range`]: RobinHoodMultimap::equal_range
///
/// # Examples
///
/// ```rust
/// use robin_ring::RobinHoodMultimap;
///
/// let mut authors: RobinHoodMultimap<&str, &str> = RobinHoodMultimap::new();
/// authors.insert("Pratchett", "Mort");
/// authors.insert("Pratchett", "Sourcery");
/// authors.insert("Austen", "Emma");
///
/// assert_eq!(authors.count("Pratchett"), 2);
///
/// let mut books: Vec<_> = authors.equal_range("Pratchett").map(|(_, b)| *b).collect();
/// books.sort();
/// assert_eq!(books, ["Mort", "Sourcery"]);
///
/// assert_eq!(authors.remove("Pratchett"), 2);
/// assert_eq!(authors.len(), 1);
/// ```
#[derive(Clone)]
pub struct RobinHoodMultimap<K, V, S = DefaultHashBuilder, const LOAD_FACTOR: usize = 80> {
    table: RobinHoodTable<(K, V), LOAD_FACTOR>,
    hash_builder: S,
}

impl<K, V, S, const LOAD_FACTOR: usize> Debug for RobinHoodMultimap<K, V, S, LOAD_FACTOR>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S, const LOAD_FACTOR: usize> RobinHoodMultimap<K, V, S, LOAD_FACTOR> {
    /// Creates an empty multimap that will hash keys with `hash_builder`.
    pub const fn with_hasher(hash_builder: S) -> Self {
        Self {
            table: RobinHoodTable::new(),
            hash_builder,
        }
    }

    /// Creates an empty multimap with room for at least `capacity` entries.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            table: RobinHoodTable::with_capacity(capacity),
            hash_builder,
        }
    }

    /// Returns the multimap's hash builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns the total number of entries, counting every duplicate.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the multimap contains no entries.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of entries the multimap can hold before it grows.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Removes every entry. The allocation is kept.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Ensures the multimap can hold `n` entries in total without growing.
    pub fn reserve(&mut self, n: usize) {
        self.table.reserve(n);
    }

    /// Resizes to the smallest table that holds `max(n, len())` entries.
    pub fn rehash(&mut self, n: usize) {
        self.table.rehash(n);
    }

    /// Shrinks the multimap as far as its contents allow.
    pub fn shrink_to_fit(&mut self) {
        self.table.shrink_to_fit();
    }

    /// Exchanges the contents of two multimaps.
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(self, other);
    }

    /// Returns an iterator over every entry, in arbitrary order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator yielding each key with a mutable reference to its
    /// value.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            inner: self.table.iter_mut(),
        }
    }

    /// Removes every entry, yielding them through an iterator.
    pub fn drain(&mut self) -> crate::map::Drain<'_, K, V, LOAD_FACTOR> {
        crate::map::Drain {
            inner: self.table.drain(),
        }
    }

    /// Keeps only the entries for which `f` returns `true`.
    pub fn retain(&mut self, mut f: impl FnMut(&K, &mut V) -> bool) {
        self.table.retain(|(k, v)| f(k, v));
    }
}

impl<K, V, S, const LOAD_FACTOR: usize> RobinHoodMultimap<K, V, S, LOAD_FACTOR>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Adds an entry. Existing entries with the same key are kept.
    ///
    /// Returns a mutable reference to the new value.
    pub fn insert(&mut self, key: K, value: V) -> &mut V {
        let hash = self.hash_builder.hash_one(&key);
        &mut self.table.insert_multi(hash, (key, value)).1
    }

    /// Returns the number of entries stored under `key`.
    pub fn count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table.count(hash, |(k, _)| k.borrow() == key)
    }

    /// Returns an iterator over every entry stored under `key`.
    pub fn equal_range<'a, Q>(&'a self, key: &'a Q) -> impl Iterator<Item = (&'a K, &'a V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table
            .equal_range(hash, move |(k, _)| k.borrow() == key)
            .map(|(k, v)| (k, v))
    }

    /// Returns one of the values stored under `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table.find(hash, |(k, _)| k.borrow() == key).map(|(_, v)| v)
    }

    /// Returns a mutable reference to one of the values stored under `key`.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table
            .find_mut(hash, |(k, _)| k.borrow() == key)
            .map(|(_, v)| v)
    }

    /// Returns `true` if at least one entry is stored under `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Removes every entry stored under `key`, returning how many were
    /// removed.
    pub fn remove<Q>(&mut self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table.remove_all(hash, |(k, _)| k.borrow() == key)
    }

    /// Removes a single entry stored under `key` and returns its value.
    pub fn remove_one<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table
            .remove(hash, |(k, _)| k.borrow() == key)
            .map(|(_, v)| v)
    }
}

impl<K, V, S, const LOAD_FACTOR: usize> RobinHoodMultimap<K, V, S, LOAD_FACTOR>
where
    S: Default,
{
    /// Creates an empty multimap using the default hash builder.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates an empty multimap with room for at least `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<K, V, S, const LOAD_FACTOR: usize> Default for RobinHoodMultimap<K, V, S, LOAD_FACTOR>
where
    S: Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S, const LOAD_FACTOR: usize> PartialEq for RobinHoodMultimap<K, V, S, LOAD_FACTOR>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
{
    /// Two multimaps are equal when every `(key, value)` pair occurs the same
    /// number of times in both.
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }

        self.iter().all(|(key, value)| {
            let same = |(k, v): &(K, V)| k == key && v == value;
            let hash = self.hash_builder.hash_one(key);
            let other_hash = other.hash_builder.hash_one(key);
            self.table.count(hash, same) == other.table.count(other_hash, same)
        })
    }
}

impl<K, V, S, const LOAD_FACTOR: usize> Eq for RobinHoodMultimap<K, V, S, LOAD_FACTOR>
where
    K: Hash + Eq,
    V: Eq,
    S: BuildHasher,
{
}

impl<K, V, S, const LOAD_FACTOR: usize> FromIterator<(K, V)>
    for RobinHoodMultimap<K, V, S, LOAD_FACTOR>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<K, V, S, const LOAD_FACTOR: usize> Extend<(K, V)> for RobinHoodMultimap<K, V, S, LOAD_FACTOR>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        self.reserve(self.len() + iter.size_hint().0);
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<'a, K, V, S, const LOAD_FACTOR: usize> IntoIterator
    for &'a RobinHoodMultimap<K, V, S, LOAD_FACTOR>
{
    type IntoIter = Iter<'a, K, V>;
    type Item = (&'a K, &'a V);

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
