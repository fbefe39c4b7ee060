use core::borrow::Borrow;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;

use crate::hasher::DefaultHashBuilder;
use crate::set::Drain;
use crate::set::Iter;
use crate::table::RobinHoodTable;

/// A hash set that keeps every inserted value, including repeats.
///
/// # Examples
///
/// ```rust
/// use robin_ring::RobinHoodMultiset;
///
/// let words: RobinHoodMultiset<&str> = "the cat saw the dog".split(' ').collect();
/// assert_eq!(words.len(), 5);
/// assert_eq!(words.count("the"), 2);
/// assert_eq!(words.count("bird"), 0);
/// ```
#[derive(Clone)]
pub struct RobinHoodMultiset<T, S = DefaultHashBuilder, const LOAD_FACTOR: usize = 80> {
    table: RobinHoodTable<T, LOAD_FACTOR>,
    hash_builder: S,
}

impl<T, S, const LOAD_FACTOR: usize> Debug for RobinHoodMultiset<T, S, LOAD_FACTOR>
where
    T: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T, S, const LOAD_FACTOR: usize> RobinHoodMultiset<T, S, LOAD_FACTOR> {
    /// Creates an empty multiset that will hash values with `hash_builder`.
    pub const fn with_hasher(hash_builder: S) -> Self {
        Self {
            table: RobinHoodTable::new(),
            hash_builder,
        }
    }

    /// Creates an empty multiset with room for at least `capacity` values.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            table: RobinHoodTable::with_capacity(capacity),
            hash_builder,
        }
    }

    /// Returns the multiset's hash builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns the total number of values, counting every repeat.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the multiset contains no values.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of values the multiset can hold before it grows.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Removes every value. The allocation is kept.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Ensures the multiset can hold `n` values in total without growing.
    pub fn reserve(&mut self, n: usize) {
        self.table.reserve(n);
    }

    /// Resizes to the smallest table that holds `max(n, len())` values.
    pub fn rehash(&mut self, n: usize) {
        self.table.rehash(n);
    }

    /// Shrinks the multiset as far as its contents allow.
    pub fn shrink_to_fit(&mut self) {
        self.table.shrink_to_fit();
    }

    /// Exchanges the contents of two multisets.
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(self, other);
    }

    /// Returns an iterator over every value, in arbitrary order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Removes every value, yielding them through an iterator.
    pub fn drain(&mut self) -> Drain<'_, T, LOAD_FACTOR> {
        Drain {
            inner: self.table.drain(),
        }
    }

    /// Keeps only the values for which `f` returns `true`.
    pub fn retain(&mut self, mut f: impl FnMut(&T) -> bool) {
        self.table.retain(|v| f(v));
    }
}

impl<T, S, const LOAD_FACTOR: usize> RobinHoodMultiset<T, S, LOAD_FACTOR>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    /// Adds a value. Equal values already present are kept.
    pub fn insert(&mut self, value: T) -> &mut T {
        let hash = self.hash_builder.hash_one(&value);
        self.table.insert_multi(hash, value)
    }

    /// Returns how many stored values equal `value`.
    pub fn count<Q>(&self, value: &Q) -> usize
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(value);
        self.table.count(hash, |v| v.borrow() == value)
    }

    /// Returns an iterator over every stored value equal to `value`.
    pub fn equal_range<'a, Q>(&'a self, value: &'a Q) -> impl Iterator<Item = &'a T>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(value);
        self.table.equal_range(hash, move |v| v.borrow() == value)
    }

    /// Returns one of the stored values equal to `value`.
    pub fn get<Q>(&self, value: &Q) -> Option<&T>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(value);
        self.table.find(hash, |v| v.borrow() == value)
    }

    /// Returns `true` if at least one stored value equals `value`.
    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(value).is_some()
    }

    /// Removes every stored value equal to `value`, returning how many were
    /// removed.
    pub fn remove<Q>(&mut self, value: &Q) -> usize
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(value);
        self.table.remove_all(hash, |v| v.borrow() == value)
    }

    /// Removes and returns a single stored value equal to `value`.
    pub fn remove_one<Q>(&mut self, value: &Q) -> Option<T>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(value);
        self.table.remove(hash, |v| v.borrow() == value)
    }
}

impl<T, S, const LOAD_FACTOR: usize> RobinHoodMultiset<T, S, LOAD_FACTOR>
where
    S: Default,
{
    /// Creates an empty multiset using the default hash builder.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates an empty multiset with room for at least `capacity` values.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<T, S, const LOAD_FACTOR: usize> Default for RobinHoodMultiset<T, S, LOAD_FACTOR>
where
    S: Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S, const LOAD_FACTOR: usize> PartialEq for RobinHoodMultiset<T, S, LOAD_FACTOR>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|v| self.count(v) == other.count(v))
    }
}

impl<T, S, const LOAD_FACTOR: usize> Eq for RobinHoodMultiset<T, S, LOAD_FACTOR>
where
    T: Hash + Eq,
    S: BuildHasher,
{
}

impl<T, S, const LOAD_FACTOR: usize> FromIterator<T> for RobinHoodMultiset<T, S, LOAD_FACTOR>
where
    T: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<T, S, const LOAD_FACTOR: usize> Extend<T> for RobinHoodMultiset<T, S, LOAD_FACTOR>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        self.reserve(self.len() + iter.size_hint().0);
        for value in iter {
            self.insert(value);
        }
    }
}

impl<'a, T, S, const LOAD_FACTOR: usize> IntoIterator for &'a RobinHoodMultiset<T, S, LOAD_FACTOR> {
    type IntoIter = Iter<'a, T>;
    type Item = &'a T;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
