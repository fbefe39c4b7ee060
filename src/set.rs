use core::borrow::Borrow;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;

use crate::hasher::DefaultHashBuilder;
use crate::table::Entry as TableEntry;
use crate::table::RobinHoodTable;

/// A hash set with unique values, stored in a [`RobinHoodTable`].
///
/// # Examples
///
/// ```rust
/// use robin_ring::RobinHoodSet;
///
/// let mut books: RobinHoodSet<String> = RobinHoodSet::new();
/// books.insert("Dune".to_string());
/// books.insert("Emma".to_string());
/// assert!(!books.insert("Dune".to_string()));
///
/// assert!(books.contains("Emma"));
/// assert_eq!(books.len(), 2);
/// ```
#[derive(Clone)]
pub struct RobinHoodSet<T, S = DefaultHashBuilder, const LOAD_FACTOR: usize = 80> {
    table: RobinHoodTable<T, LOAD_FACTOR>,
    hash_builder: S,
}

impl<T, S, const LOAD_FACTOR: usize> PartialEq for RobinHoodSet<T, S, LOAD_FACTOR>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.iter().all(|v| other.contains(v))
    }
}

impl<T, S, const LOAD_FACTOR: usize> Eq for RobinHoodSet<T, S, LOAD_FACTOR>
where
    T: Hash + Eq,
    S: BuildHasher,
{
}

impl<T, S, const LOAD_FACTOR: usize> Debug for RobinHoodSet<T, S, LOAD_FACTOR>
where
    T: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T, S, const LOAD_FACTOR: usize> RobinHoodSet<T, S, LOAD_FACTOR> {
    /// Creates an empty set that will hash values with `hash_builder`.
    pub const fn with_hasher(hash_builder: S) -> Self {
        Self {
            table: RobinHoodTable::new(),
            hash_builder,
        }
    }

    /// Creates an empty set with room for at least `capacity` values.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            table: RobinHoodTable::with_capacity(capacity),
            hash_builder,
        }
    }

    /// Returns the set's hash builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns the number of values in the set.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the set contains no values.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of values the set can hold before it grows.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Removes every value. The allocation is kept.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Ensures the set can hold `n` values in total without growing.
    pub fn reserve(&mut self, n: usize) {
        self.table.reserve(n);
    }

    /// Resizes the set to the smallest table that holds `max(n, len())`
    /// values.
    pub fn rehash(&mut self, n: usize) {
        self.table.rehash(n);
    }

    /// Shrinks the set as far as its contents allow.
    pub fn shrink_to_fit(&mut self) {
        self.table.shrink_to_fit();
    }

    /// Exchanges the contents of two sets.
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(self, other);
    }

    /// Returns an iterator over the values, in arbitrary order.
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
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_ring::RobinHoodSet;
    /// let mut set: RobinHoodSet<u32> = (0..10).collect();
    /// set.retain(|&v| v % 2 == 0);
    /// assert_eq!(set.len(), 5);
    /// ```
    pub fn retain(&mut self, mut f: impl FnMut(&T) -> bool) {
        self.table.retain(|v| f(v));
    }
}

impl<T, S, const LOAD_FACTOR: usize> RobinHoodSet<T, S, LOAD_FACTOR>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    /// Adds a value to the set.
    ///
    /// Returns `false` (and drops `value`) if an equal value was already
    /// present.
    pub fn insert(&mut self, value: T) -> bool {
        let hash = self.hash_builder.hash_one(&value);
        match self.table.entry(hash, |v| v == &value) {
            TableEntry::Occupied(_) => false,
            TableEntry::Vacant(entry) => {
                entry.insert(value);
                true
            }
        }
    }

    /// Adds a value to the set, replacing and returning an equal value if one
    /// was present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_ring::RobinHoodSet;
    /// let mut set: RobinHoodSet<Vec<i32>> = RobinHoodSet::new();
    /// set.insert(Vec::with_capacity(10));
    ///
    /// let old = set.replace(Vec::new()).unwrap();
    /// assert_eq!(old.capacity(), 10);
    /// assert_eq!(set.get(&[][..]).unwrap().capacity(), 0);
    /// ```
    pub fn replace(&mut self, value: T) -> Option<T> {
        let hash = self.hash_builder.hash_one(&value);
        match self.table.entry(hash, |v| v == &value) {
            TableEntry::Occupied(mut entry) => Some(core::mem::replace(entry.get_mut(), value)),
            TableEntry::Vacant(entry) => {
                entry.insert(value);
                None
            }
        }
    }

    /// Returns `true` if the set contains `value`.
    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(value).is_some()
    }

    /// Returns a reference to the stored value equal to `value`.
    pub fn get<Q>(&self, value: &Q) -> Option<&T>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(value);
        self.table.find(hash, |v| v.borrow() == value)
    }

    /// Returns the number of stored values equal to `value`: always 0 or 1.
    pub fn count<Q>(&self, value: &Q) -> usize
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.contains(value) as usize
    }

    /// Removes `value` from the set, returning whether it was present.
    pub fn remove<Q>(&mut self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.take(value).is_some()
    }

    /// Removes and returns the stored value equal to `value`.
    pub fn take<Q>(&mut self, value: &Q) -> Option<T>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_builder.hash_one(value);
        self.table.remove(hash, |v| v.borrow() == value)
    }

    /// Returns `true` if `self` and `other` share no values.
    pub fn is_disjoint(&self, other: &Self) -> bool {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.iter().all(|v| !large.contains(v))
    }

    /// Returns `true` if every value of `self` is in `other`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_ring::RobinHoodSet;
    /// let small: RobinHoodSet<u8> = [1, 2].into_iter().collect();
    /// let large: RobinHoodSet<u8> = [1, 2, 3].into_iter().collect();
    /// assert!(small.is_subset(&large));
    /// assert!(large.is_superset(&small));
    /// assert!(!large.is_subset(&small));
    /// ```
    pub fn is_subset(&self, other: &Self) -> bool {
        self.len() <= other.len() && self.iter().all(|v| other.contains(v))
    }

    /// Returns `true` if every value of `other` is in `self`.
    pub fn is_superset(&self, other: &Self) -> bool {
        other.is_subset(self)
    }
}

impl<T, S, const LOAD_FACTOR: usize> RobinHoodSet<T, S, LOAD_FACTOR>
where
    S: Default,
{
    /// Creates an empty set using the default hash builder.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates an empty set with room for at least `capacity` values, using
    /// the default hash builder.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<T, S, const LOAD_FACTOR: usize> Default for RobinHoodSet<T, S, LOAD_FACTOR>
where
    S: Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S, const LOAD_FACTOR: usize> FromIterator<T> for RobinHoodSet<T, S, LOAD_FACTOR>
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

impl<T, S, const LOAD_FACTOR: usize> Extend<T> for RobinHoodSet<T, S, LOAD_FACTOR>
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

impl<'a, T, S, const LOAD_FACTOR: usize> IntoIterator for &'a RobinHoodSet<T, S, LOAD_FACTOR> {
    type IntoIter = Iter<'a, T>;
    type Item = &'a T;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator over the values of a [`RobinHoodSet`].
pub struct Iter<'a, T> {
    pub(crate) inner: crate::table::Iter<'a, T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

/// A draining iterator over the values of a [`RobinHoodSet`].
pub struct Drain<'a, T, const LOAD_FACTOR: usize = 80> {
    pub(crate) inner: crate::table::Drain<'a, T, LOAD_FACTOR>,
}

impl<T, const LOAD_FACTOR: usize> Iterator for Drain<'_, T, LOAD_FACTOR> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
