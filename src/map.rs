use core::borrow::Borrow;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::ops::Index;

use crate::error::KeyNotFound;
use crate::hasher::DefaultHashBuilder;
use crate::table::Entry as TableEntry;
use crate::table::RobinHoodTable;

/// A hash map with unique keys, stored in a [`RobinHoodTable`].
///
/// `RobinHoodMap<K, V, S, LOAD_FACTOR>` stores `(K, V)` pairs inline in the
/// table's slots and hashes keys with the builder `S`. Each slot also carries
/// the key's 64-bit hash, so growing the map never re-hashes keys.
///
/// `LOAD_FACTOR` is the percentage of slots that may be filled before the map
/// grows (`10..=100`, default 80).
///
/// # Examples
///
/// ```rust
/// use robin_ring::RobinHoodMap;
///
/// let mut scores: RobinHoodMap<&str, u32> = RobinHoodMap::new();
/// scores.insert("alice", 10);
/// scores.insert("bob", 7);
/// *scores.entry("alice").or_insert(0) += 5;
///
/// assert_eq!(scores["alice"], 15);
/// assert_eq!(scores.get("carol"), None);
/// ```
#[derive(Clone)]
pub struct RobinHoodMap<K, V, S = DefaultHashBuilder, const LOAD_FACTOR: usize = 80> {
    table: RobinHoodTable<(K, V), LOAD_FACTOR>,
    hash_builder: S,
}

impl<K, V, S, const LOAD_FACTOR: usize> Debug for RobinHoodMap<K, V, S, LOAD_FACTOR>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in self.iter() {
            map.entry(k, v);
        }
        map.finish()
    }
}

impl<K, V, S, const LOAD_FACTOR: usize> RobinHoodMap<K, V, S, LOAD_FACTOR> {
    /// Creates an empty map that will hash keys with `hash_builder`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use robin_ring::RobinHoodMap;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    /// #
    /// let map: RobinHoodMap<i32, String, _> = RobinHoodMap::with_hasher(SimpleHasher);
    /// assert!(map.is_empty());
    /// ```
    pub const fn with_hasher(hash_builder: S) -> Self {
        Self {
            table: RobinHoodTable::new(),
            hash_builder,
        }
    }

    /// Creates an empty map with room for at least `capacity` entries.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            table: RobinHoodTable::with_capacity(capacity),
            hash_builder,
        }
    }

    /// Returns the map's hash builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns the number of entries in the map.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map contains no entries.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of entries the map can hold before it grows.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Removes every entry. The allocation is kept.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Ensures the map can hold `n` entries in total without growing.
    ///
    /// Unlike `std`'s `reserve`, `n` counts all entries, not additional ones.
    pub fn reserve(&mut self, n: usize) {
        self.table.reserve(n);
    }

    /// Resizes the map to the smallest table that holds `max(n, len())`
    /// entries.
    pub fn rehash(&mut self, n: usize) {
        self.table.rehash(n);
    }

    /// Shrinks the map as far as its contents allow. An empty map releases its
    /// memory.
    pub fn shrink_to_fit(&mut self) {
        self.table.shrink_to_fit();
    }

    /// Exchanges the contents (and hashers) of two maps.
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(self, other);
    }

    /// Returns an iterator over the entries of the map, in arbitrary order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_ring::RobinHoodMap;
    /// let mut map: RobinHoodMap<i32, &str> = RobinHoodMap::new();
    /// map.insert(1, "a");
    /// map.insert(2, "b");
    ///
    /// let mut pairs: Vec<_> = map.iter().collect();
    /// pairs.sort();
    /// assert_eq!(pairs, [(&1, &"a"), (&2, &"b")]);
    /// ```
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

    /// Returns an iterator over the keys of the map.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over the values of the map.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Returns an iterator over mutable references to the values of the map.
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            inner: self.iter_mut(),
        }
    }

    /// Removes every entry, yielding them through an iterator.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_ring::RobinHoodMap;
    /// let mut map: RobinHoodMap<i32, &str> = RobinHoodMap::new();
    /// map.insert(1, "a");
    /// map.insert(2, "b");
    ///
    /// let pairs: Vec<_> = map.drain().collect();
    /// assert!(map.is_empty());
    /// assert_eq!(pairs.len(), 2);
    /// ```
    pub fn drain(&mut self) -> Drain<'_, K, V, LOAD_FACTOR> {
        Drain {
            inner: self.table.drain(),
        }
    }

    /// Keeps only the entries for which `f` returns `true`.
    pub fn retain(&mut self, mut f: impl FnMut(&K, &mut V) -> bool) {
        self.table.retain(|(k, v)| f(k, v));
    }
}

impl<K, V, S, const LOAD_FACTOR: usize> RobinHoodMap<K, V, S, LOAD_FACTOR>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Inserts a key-value pair.
    ///
    /// If the key was already present its value is replaced and the old value
    /// returned; the stored key is left untouched.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_ring::RobinHoodMap;
    /// let mut map: RobinHoodMap<i32, &str> = RobinHoodMap::new();
    /// assert_eq!(map.insert(37, "a"), None);
    /// assert_eq!(map.insert(37, "b"), Some("a"));
    /// assert_eq!(map[&37], "b");
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let hash = self.hash_builder.hash_one(&key);
        match self.table.entry(hash, |(k, _)| k == &key) {
            TableEntry::Occupied(mut entry) => {
                Some(core::mem::replace(&mut entry.get_mut().1, value))
            }
            TableEntry::Vacant(entry) => {
                entry.insert((key, value));
                None
            }
        }
    }

    /// Inserts the value produced by `make` if `key` is absent.
    ///
    /// `make` runs only when an insertion happens. Returns a reference to the
    /// value now stored under `key` and whether it was inserted.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_ring::RobinHoodMap;
    /// let mut map: RobinHoodMap<&str, Vec<u8>> = RobinHoodMap::new();
    /// let (value, inserted) = map.try_emplace("k", || vec![1, 2]);
    /// assert!(inserted);
    /// value.push(3);
    ///
    /// let (value, inserted) = map.try_emplace("k", || unreachable!());
    /// assert!(!inserted);
    /// assert_eq!(value, &[1, 2, 3]);
    /// ```
    pub fn try_emplace(&mut self, key: K, make: impl FnOnce() -> V) -> (&mut V, bool) {
        let hash = self.hash_builder.hash_one(&key);
        match self.table.entry(hash, |(k, _)| k == &key) {
            TableEntry::Occupied(entry) => (&mut entry.into_mut().1, false),
            TableEntry::Vacant(entry) => (&mut entry.insert((key, make())).1, true),
        }
    }

    /// Returns the value stored under `key`, inserting `V::default()` first if
    /// the key is absent.
    pub fn get_or_default(&mut self, key: K) -> &mut V
    where
        V: Default,
    {
        self.entry(key).or_default()
    }

    /// Returns a reference to the value stored under `key`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_ring::RobinHoodMap;
    /// let mut map: RobinHoodMap<String, i32> = RobinHoodMap::new();
    /// map.insert("one".to_string(), 1);
    /// assert_eq!(map.get("one"), Some(&1));
    /// assert_eq!(map.get("two"), None);
    /// ```
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).map(|(_, v)| v)
    }

    /// Returns the stored key and its value.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table
            .find(hash, |(k, _)| k.borrow() == key)
            .map(|(k, v)| (k, v))
    }

    /// Returns a mutable reference to the value stored under `key`.
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

    /// Bounds-checked access: like [`get`](Self::get), but a missing key is
    /// reported as [`KeyNotFound`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_ring::KeyNotFound;
    /// # use robin_ring::RobinHoodMap;
    /// let mut map: RobinHoodMap<u32, u32> = RobinHoodMap::new();
    /// map.insert(1, 10);
    /// assert_eq!(map.at(&1), Ok(&10));
    /// assert_eq!(map.at(&2), Err(KeyNotFound));
    /// ```
    pub fn at<Q>(&self, key: &Q) -> Result<&V, KeyNotFound>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).ok_or(KeyNotFound)
    }

    /// Bounds-checked mutable access. See [`at`](Self::at).
    pub fn at_mut<Q>(&mut self, key: &Q) -> Result<&mut V, KeyNotFound>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_mut(key).ok_or(KeyNotFound)
    }

    /// Returns `true` if the map contains `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Returns the number of entries stored under `key`: always 0 or 1.
    pub fn count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.contains_key(key) as usize
    }

    /// Removes `key` from the map, returning its value if it was present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_ring::RobinHoodMap;
    /// let mut map: RobinHoodMap<i32, &str> = RobinHoodMap::new();
    /// map.insert(1, "a");
    /// assert_eq!(map.remove(&1), Some("a"));
    /// assert_eq!(map.remove(&1), None);
    /// ```
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes `key` from the map, returning the stored key and value.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(key);
        self.table.remove(hash, |(k, _)| k.borrow() == key)
    }

    /// Gets the entry for `key` for in-place manipulation.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_ring::RobinHoodMap;
    /// let mut counts: RobinHoodMap<char, usize> = RobinHoodMap::new();
    /// for c in "hello".chars() {
    ///     counts.entry(c).and_modify(|n| *n += 1).or_insert(1);
    /// }
    /// assert_eq!(counts[&'l'], 2);
    /// assert_eq!(counts[&'h'], 1);
    /// ```
    pub fn entry(&mut self, key: K) -> Entry<'_, K, V, LOAD_FACTOR> {
        let hash = self.hash_builder.hash_one(&key);
        match self.table.entry(hash, |(k, _)| k == &key) {
            TableEntry::Occupied(entry) => Entry::Occupied(OccupiedEntry { entry }),
            TableEntry::Vacant(entry) => Entry::Vacant(VacantEntry { entry, key }),
        }
    }
}

impl<K, V, S, const LOAD_FACTOR: usize> RobinHoodMap<K, V, S, LOAD_FACTOR>
where
    S: Default,
{
    /// Creates an empty map using the default hash builder. Nothing is
    /// allocated until the first insertion.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates an empty map with room for at least `capacity` entries, using
    /// the default hash builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_ring::RobinHoodMap;
    /// let map: RobinHoodMap<i32, String> = RobinHoodMap::with_capacity(100);
    /// assert!(map.capacity() >= 100);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<K, V, S, const LOAD_FACTOR: usize> Default for RobinHoodMap<K, V, S, LOAD_FACTOR>
where
    S: Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S, const LOAD_FACTOR: usize> PartialEq for RobinHoodMap<K, V, S, LOAD_FACTOR>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
{
    /// Two maps are equal when they hold the same keys mapped to equal values,
    /// regardless of slot order.
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K, V, S, const LOAD_FACTOR: usize> Eq for RobinHoodMap<K, V, S, LOAD_FACTOR>
where
    K: Hash + Eq,
    V: Eq,
    S: BuildHasher,
{
}

impl<K, Q, V, S, const LOAD_FACTOR: usize> Index<&Q> for RobinHoodMap<K, V, S, LOAD_FACTOR>
where
    K: Hash + Eq + Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    S: BuildHasher,
{
    type Output = V;

    /// # Panics
    ///
    /// Panics if the key is not present.
    fn index(&self, key: &Q) -> &V {
        self.get(key).expect("key not found in map")
    }
}

impl<K, V, S, const LOAD_FACTOR: usize> FromIterator<(K, V)> for RobinHoodMap<K, V, S, LOAD_FACTOR>
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

impl<K, V, S, const LOAD_FACTOR: usize> Extend<(K, V)> for RobinHoodMap<K, V, S, LOAD_FACTOR>
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

impl<'a, K, V, S, const LOAD_FACTOR: usize> IntoIterator for &'a RobinHoodMap<K, V, S, LOAD_FACTOR> {
    type IntoIter = Iter<'a, K, V>;
    type Item = (&'a K, &'a V);

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, S, const LOAD_FACTOR: usize> IntoIterator
    for &'a mut RobinHoodMap<K, V, S, LOAD_FACTOR>
{
    type IntoIter = IterMut<'a, K, V>;
    type Item = (&'a K, &'a mut V);

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

/// A view into a single entry in the map, which may either be vacant or
/// occupied.
///
/// This enum is constructed from the [`entry`] method on [`RobinHoodMap`].
///
/// [`entry`]: RobinHoodMap::entry
pub enum Entry<'a, K, V, const LOAD_FACTOR: usize = 80> {
    /// A vacant entry.
    Vacant(VacantEntry<'a, K, V, LOAD_FACTOR>),
    /// An occupied entry.
    Occupied(OccupiedEntry<'a, K, V, LOAD_FACTOR>),
}

impl<'a, K, V, const LOAD_FACTOR: usize> Entry<'a, K, V, LOAD_FACTOR> {
    /// Inserts `default` if the entry is vacant and returns a mutable
    /// reference to the value.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts the value returned by `default` if the entry is vacant.
    pub fn or_insert_with<F>(self, default: F) -> &'a mut V
    where
        F: FnOnce() -> V,
    {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Provides in-place mutable access to an occupied entry before any
    /// potential inserts.
    pub fn and_modify<F>(self, f: F) -> Self
    where
        F: FnOnce(&mut V),
    {
        match self {
            Entry::Occupied(mut entry) => {
                f(entry.get_mut());
                Entry::Occupied(entry)
            }
            Entry::Vacant(entry) => Entry::Vacant(entry),
        }
    }

    /// Returns a reference to this entry's key.
    pub fn key(&self) -> &K {
        match self {
            Entry::Occupied(entry) => entry.key(),
            Entry::Vacant(entry) => entry.key(),
        }
    }
}

impl<'a, K, V, const LOAD_FACTOR: usize> Entry<'a, K, V, LOAD_FACTOR>
where
    V: Default,
{
    /// Inserts `V::default()` if the entry is vacant.
    pub fn or_default(self) -> &'a mut V {
        self.or_insert_with(Default::default)
    }
}

/// A view into a vacant entry in the map.
pub struct VacantEntry<'a, K, V, const LOAD_FACTOR: usize = 80> {
    entry: crate::table::VacantEntry<'a, (K, V), LOAD_FACTOR>,
    key: K,
}

impl<'a, K, V, const LOAD_FACTOR: usize> VacantEntry<'a, K, V, LOAD_FACTOR> {
    /// Gets a reference to the key that would be used when inserting a value.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Take ownership of the key.
    pub fn into_key(self) -> K {
        self.key
    }

    /// Inserts the value into the map and returns a mutable reference to it.
    pub fn insert(self, value: V) -> &'a mut V {
        &mut self.entry.insert((self.key, value)).1
    }
}

/// A view into an occupied entry in the map.
pub struct OccupiedEntry<'a, K, V, const LOAD_FACTOR: usize = 80> {
    entry: crate::table::OccupiedEntry<'a, (K, V), LOAD_FACTOR>,
}

impl<'a, K, V, const LOAD_FACTOR: usize> OccupiedEntry<'a, K, V, LOAD_FACTOR> {
    /// Gets a reference to the key in the entry.
    pub fn key(&self) -> &K {
        &self.entry.get().0
    }

    /// Gets a reference to the value in the entry.
    pub fn get(&self) -> &V {
        &self.entry.get().1
    }

    /// Gets a mutable reference to the value in the entry.
    pub fn get_mut(&mut self) -> &mut V {
        &mut self.entry.get_mut().1
    }

    /// Converts the entry into a mutable reference to the value.
    pub fn into_mut(self) -> &'a mut V {
        &mut self.entry.into_mut().1
    }

    /// Replaces the value in the entry, returning the old one.
    pub fn insert(&mut self, value: V) -> V {
        core::mem::replace(&mut self.entry.get_mut().1, value)
    }

    /// Removes the entry from the map and returns the value.
    pub fn remove(self) -> V {
        self.entry.remove().1
    }

    /// Removes the entry from the map and returns the key and value.
    pub fn remove_entry(self) -> (K, V) {
        self.entry.remove()
    }
}

/// An iterator over the entries of a [`RobinHoodMap`].
pub struct Iter<'a, K, V> {
    pub(crate) inner: crate::table::Iter<'a, (K, V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

/// A mutable iterator over the entries of a [`RobinHoodMap`].
pub struct IterMut<'a, K, V> {
    pub(crate) inner: crate::table::IterMut<'a, (K, V)>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (&*k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}

/// An iterator over the keys of a [`RobinHoodMap`].
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// An iterator over the values of a [`RobinHoodMap`].
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// A mutable iterator over the values of a [`RobinHoodMap`].
pub struct ValuesMut<'a, K, V> {
    inner: IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// A draining iterator over the entries of a [`RobinHoodMap`].
pub struct Drain<'a, K, V, const LOAD_FACTOR: usize = 80> {
    pub(crate) inner: crate::table::Drain<'a, (K, V), LOAD_FACTOR>,
}

impl<K, V, const LOAD_FACTOR: usize> Iterator for Drain<'_, K, V, LOAD_FACTOR> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
