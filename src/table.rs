use alloc::alloc::handle_alloc_error;
use core::alloc::Layout;
use core::fmt::Debug;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

/// Top bit of a stored hash. Set on erased slots (tombstones); the low bits
/// are kept so the tombstone still reports a distance from its ideal slot.
const DELETED_BIT: u64 = 1 << 63;

/// Stored hash value of a slot that has never held an entry (or has been
/// reclaimed by a trailing-tombstone sweep).
const EMPTY: u64 = !DELETED_BIT;

/// Smallest table that will ever be allocated. Must be a power of two.
const MIN_TABLE_SIZE: usize = 8;

const _: () = assert!(MIN_TABLE_SIZE.is_power_of_two());

#[inline(always)]
fn is_deleted(stored: u64) -> bool {
    stored & DELETED_BIT != 0
}

#[inline(always)]
fn is_live(stored: u64) -> bool {
    stored != EMPTY && !is_deleted(stored)
}

/// Maps a caller-supplied hash onto the set of values a live slot may hold.
///
/// The deleted bit is stripped, and the one value that would alias [`EMPTY`]
/// is perturbed by flipping its lowest bit. The result is stable under
/// repeated application, so stored hashes can be fed back in.
#[inline(always)]
fn finalize(hash: u64) -> u64 {
    let h = hash & !DELETED_BIT;
    h ^ (h == EMPTY) as u64
}

/// Distance of the slot at `index` from the ideal slot of `stored`.
///
/// Also valid for tombstones because the mask discards the deleted bit.
#[inline(always)]
fn distance(index: usize, stored: u64, mask: usize) -> usize {
    index.wrapping_sub(stored as usize) & mask
}

#[derive(Debug, Clone, Copy)]
struct DataLayout {
    layout: Layout,
    hashes_offset: usize,
}

impl DataLayout {
    fn new<V>(table_size: usize) -> Self {
        let buckets = Layout::array::<MaybeUninit<V>>(table_size).expect("allocation size overflow");
        let hashes = Layout::array::<u64>(table_size).expect("allocation size overflow");
        let (layout, hashes_offset) = buckets.extend(hashes).expect("allocation size overflow");

        Self {
            layout: layout.pad_to_align(),
            hashes_offset,
        }
    }

    fn empty() -> Self {
        Self {
            layout: Layout::new::<()>(),
            hashes_offset: 0,
        }
    }
}

/// Read-only view over the parallel hash and bucket arrays.
///
/// Shared by lookups and the same-key iterator so that probing logic lives in
/// one place.
#[derive(Clone, Copy)]
struct Slots<'a, V> {
    hashes: &'a [u64],
    buckets: &'a [MaybeUninit<V>],
}

impl<'a, V> Slots<'a, V> {
    #[inline(always)]
    fn mask(&self) -> usize {
        self.hashes.len().wrapping_sub(1)
    }

    /// Probes for the first live slot whose hash equals `h` and whose value
    /// satisfies `eq`.
    ///
    /// `h` must already be finalized.
    #[inline]
    fn find(&self, h: u64, eq: impl Fn(&V) -> bool) -> Option<usize> {
        if self.hashes.is_empty() {
            return None;
        }

        let mask = self.mask();
        let mut index = h as usize & mask;
        let mut dist = 0usize;

        loop {
            // SAFETY: `index` is always reduced by `mask`, which is one less
            // than the power-of-two length of both arrays.
            let stored = unsafe { *self.hashes.get_unchecked(index) };
            if stored == EMPTY {
                return None;
            }

            // SAFETY: A stored hash equal to a finalized hash is live, so the
            // bucket at `index` is initialized.
            if stored == h && eq(unsafe { self.buckets.get_unchecked(index).assume_init_ref() }) {
                return Some(index);
            }

            // No need to bound the loop: `dist` grows past every possible
            // distance (at most `mask`) before wrapping back around.
            if dist > distance(index, stored, mask) {
                return None;
            }

            dist += 1;
            index = (index + 1) & mask;
        }
    }

    /// Resumes a same-key search after the live slot `prev`.
    ///
    /// Only slots on `prev`'s probe sequence are visited; the search stops at
    /// an empty slot, at a resident closer to its ideal slot than the probe
    /// is, or upon returning to the ideal slot.
    #[inline]
    fn find_next(&self, prev: usize, eq: impl Fn(&V) -> bool) -> Option<usize> {
        let mask = self.mask();
        let h = self.hashes[prev];
        debug_assert!(is_live(h));

        let start = h as usize & mask;
        let mut index = (prev + 1) & mask;
        let mut dist = index.wrapping_sub(start) & mask;

        while index != start {
            // SAFETY: `index` is masked into bounds.
            let stored = unsafe { *self.hashes.get_unchecked(index) };
            if stored == EMPTY {
                return None;
            }

            // SAFETY: `stored == h` implies a live, initialized bucket.
            if stored == h && eq(unsafe { self.buckets.get_unchecked(index).assume_init_ref() }) {
                return Some(index);
            }

            if dist > distance(index, stored, mask) {
                return None;
            }

            index = (index + 1) & mask;
            dist += 1;
        }

        None
    }

    /// # Safety
    ///
    /// The slot at `index` must be live.
    #[inline(always)]
    unsafe fn get(&self, index: usize) -> &'a V {
        // SAFETY: Caller guarantees the slot is live, so the bucket is
        // initialized and in bounds.
        unsafe { self.buckets.get_unchecked(index).assume_init_ref() }
    }
}

/// An open-addressing hash table using Robin Hood displacement.
///
/// `RobinHoodTable<V, LOAD_FACTOR>` stores values of type `V` and leaves
/// hashing and key comparison to the caller: every operation takes the value's
/// `u64` hash and an equality predicate. Hashes are stored next to the values,
/// so growing the table never needs to re-hash keys.
///
/// Entries are kept "fair": an entry that has probed further from its ideal
/// slot takes the place of a resident that is closer to its own, and the
/// resident continues probing. Lookups use the resulting ordering to stop as
/// soon as they pass a resident that is closer to home than the probe.
///
/// `LOAD_FACTOR` is the percentage of slots that may be filled before the
/// table grows, and must lie in `10..=100`. Erasure leaves a tombstone, and
/// any run of tombstones directly preceding an empty slot is reclaimed
/// immediately.
///
/// Unique-key insertion goes through [`entry`](Self::entry) (or
/// [`insert_unique`](Self::insert_unique)); duplicate keys are stored with
/// [`insert_multi`](Self::insert_multi) and enumerated with
/// [`equal_range`](Self::equal_range).
///
/// ## Example
///
/// ```rust
/// # use core::hash::Hash;
/// # use core::hash::Hasher;
/// #
/// # use robin_ring::table::Entry;
/// # use robin_ring::table::RobinHoodTable;
/// # use siphasher::sip::SipHasher;
/// #
/// # #[derive(Debug, PartialEq)]
/// # struct Person {
/// #     id: u64,
/// #     name: String,
/// # }
/// #
/// # fn hash_id(id: u64) -> u64 {
/// #     let mut hasher = SipHasher::new();
/// #     id.hash(&mut hasher);
/// #     hasher.finish()
/// # }
///
/// let mut table: RobinHoodTable<Person> = RobinHoodTable::with_capacity(100);
/// let hash = hash_id(123);
///
/// match table.entry(hash, |p| p.id == 123) {
///     Entry::Vacant(entry) => {
///         entry.insert(Person {
///             id: 123,
///             name: "Alice".to_string(),
///         });
///     }
///     Entry::Occupied(_) => {
///         println!("Person already exists");
///     }
/// }
/// assert_eq!(table.len(), 1);
/// ```
pub struct RobinHoodTable<V, const LOAD_FACTOR: usize = 80> {
    layout: DataLayout,
    alloc: NonNull<u8>,

    len: usize,
    table_size: usize,

    _phantom: PhantomData<V>,
}

// SAFETY: The table owns its values exclusively; the raw allocation is never
// shared between tables.
unsafe impl<V: Send, const LOAD_FACTOR: usize> Send for RobinHoodTable<V, LOAD_FACTOR> {}

// SAFETY: Shared references only hand out `&V`.
unsafe impl<V: Sync, const LOAD_FACTOR: usize> Sync for RobinHoodTable<V, LOAD_FACTOR> {}

impl<V, const LOAD_FACTOR: usize> Debug for RobinHoodTable<V, LOAD_FACTOR> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut s = f.debug_struct("RobinHoodTable");
        s.field("len", &self.len)
            .field("capacity", &self.capacity())
            .field("table_size", &self.table_size);

        #[cfg(any(test, feature = "stats"))]
        {
            use alloc::format;
            use alloc::string::String;
            use alloc::vec::Vec;

            let mask = self.table_size.wrapping_sub(1);
            s.field(
                "slots",
                &self
                    .hashes()
                    .chunks(16)
                    .enumerate()
                    .map(|(row, chunk)| {
                        chunk
                            .iter()
                            .enumerate()
                            .map(|(col, &stored)| {
                                let index = row * 16 + col;
                                if stored == EMPTY {
                                    String::from("..")
                                } else if is_deleted(stored) {
                                    String::from("xx")
                                } else {
                                    format!("{:02}", distance(index, stored, mask))
                                }
                            })
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .collect::<Vec<_>>(),
            );
        }

        s.finish()
    }
}

impl<V, const LOAD_FACTOR: usize> Clone for RobinHoodTable<V, LOAD_FACTOR>
where
    V: Clone,
{
    /// Builds a compact copy: the clone is sized for `self.len()` rather than
    /// for `self`'s table size, and carries no tombstones.
    fn clone(&self) -> Self {
        let mut new_table = Self::with_capacity(self.len);

        for (index, &stored) in self.hashes().iter().enumerate() {
            if is_live(stored) {
                // SAFETY: Live slots hold initialized values.
                let value = unsafe { self.buckets().get_unchecked(index).assume_init_ref().clone() };
                new_table.place_multi(stored, value);
                new_table.len += 1;
            }
        }

        debug_assert_eq!(new_table.len, self.len);
        new_table
    }
}

impl<V, const LOAD_FACTOR: usize> Drop for RobinHoodTable<V, LOAD_FACTOR> {
    fn drop(&mut self) {
        self.drop_values();

        if self.layout.layout.size() != 0 {
            // SAFETY: `alloc` was produced by `alloc::alloc::alloc` with this
            // exact layout and has not been freed.
            unsafe { alloc::alloc::dealloc(self.alloc.as_ptr(), self.layout.layout) };
        }
    }
}

impl<V, const LOAD_FACTOR: usize> Default for RobinHoodTable<V, LOAD_FACTOR> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, const LOAD_FACTOR: usize> RobinHoodTable<V, LOAD_FACTOR> {
    const VALID_LOAD_FACTOR: () = assert!(
        LOAD_FACTOR >= 10 && LOAD_FACTOR <= 100,
        "LOAD_FACTOR must be in the range [10, 100]"
    );

    /// Creates an empty table. No memory is allocated until the first insert.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_ring::table::RobinHoodTable;
    /// let table: RobinHoodTable<u64> = RobinHoodTable::new();
    /// assert_eq!(table.capacity(), 0);
    /// assert!(table.is_empty());
    /// ```
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_LOAD_FACTOR;

        Self {
            layout: DataLayout {
                layout: Layout::new::<()>(),
                hashes_offset: 0,
            },
            alloc: NonNull::dangling(),
            len: 0,
            table_size: 0,
            _phantom: PhantomData,
        }
    }

    /// Creates a table that can hold at least `capacity` values without
    /// growing.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_ring::table::RobinHoodTable;
    /// let table: RobinHoodTable<String> = RobinHoodTable::with_capacity(100);
    /// assert!(table.capacity() >= 100);
    /// assert!(table.table_size().is_power_of_two());
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        let mut table = Self::new();
        if capacity > 0 {
            table.rehash(capacity);
        }
        table
    }

    fn allocate(table_size: usize) -> (DataLayout, NonNull<u8>) {
        let layout = DataLayout::new::<V>(table_size);
        debug_assert!(layout.layout.size() != 0);

        // SAFETY: The layout always covers at least the hash array, so its
        // size is non-zero. A null result is routed to `handle_alloc_error`.
        unsafe {
            let raw_alloc = alloc::alloc::alloc(layout.layout);
            if raw_alloc.is_null() {
                handle_alloc_error(layout.layout);
            }

            let hashes = raw_alloc.add(layout.hashes_offset).cast::<u64>();
            for i in 0..table_size {
                hashes.add(i).write(EMPTY);
            }

            (layout, NonNull::new_unchecked(raw_alloc))
        }
    }

    #[inline(always)]
    fn hashes(&self) -> &[u64] {
        if self.table_size == 0 {
            return &[];
        }

        // SAFETY: A non-zero table size means `alloc` holds `table_size`
        // initialized hashes at `hashes_offset`.
        unsafe {
            core::slice::from_raw_parts(
                self.alloc.as_ptr().add(self.layout.hashes_offset).cast::<u64>(),
                self.table_size,
            )
        }
    }

    #[inline(always)]
    fn buckets(&self) -> &[MaybeUninit<V>] {
        if self.table_size == 0 {
            return &[];
        }

        // SAFETY: The buckets array starts at offset zero of the allocation
        // and spans `table_size` elements.
        unsafe {
            core::slice::from_raw_parts(
                self.alloc.as_ptr().cast::<MaybeUninit<V>>(),
                self.table_size,
            )
        }
    }

    #[inline(always)]
    fn parts_mut(&mut self) -> (&mut [u64], &mut [MaybeUninit<V>]) {
        if self.table_size == 0 {
            return (&mut [], &mut []);
        }

        // SAFETY: The two arrays occupy disjoint regions of the allocation,
        // so handing out both mutable slices does not alias.
        unsafe {
            let base = self.alloc.as_ptr();
            (
                core::slice::from_raw_parts_mut(
                    base.add(self.layout.hashes_offset).cast::<u64>(),
                    self.table_size,
                ),
                core::slice::from_raw_parts_mut(
                    base.cast::<MaybeUninit<V>>(),
                    self.table_size,
                ),
            )
        }
    }

    #[inline(always)]
    fn slots(&self) -> Slots<'_, V> {
        Slots {
            hashes: self.hashes(),
            buckets: self.buckets(),
        }
    }

    fn drop_values(&mut self) {
        if !core::mem::needs_drop::<V>() || self.len == 0 {
            return;
        }

        let (hashes, buckets) = self.parts_mut();
        for (stored, bucket) in hashes.iter().zip(buckets.iter_mut()) {
            if is_live(*stored) {
                // SAFETY: Live slots hold initialized values, and each is
                // dropped exactly once here.
                unsafe { bucket.assume_init_drop() };
            }
        }
    }

    /// Returns an iterator over all values, in slot order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use robin_ring::table::RobinHoodTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_str(s: &str) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     s.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table: RobinHoodTable<String> = RobinHoodTable::new();
    /// table.insert_unique(hash_str("a"), "a".to_string(), |s| s == "a");
    /// table.insert_unique(hash_str("b"), "b".to_string(), |s| s == "b");
    ///
    /// let mut values: Vec<_> = table.iter().cloned().collect();
    /// values.sort();
    /// assert_eq!(values, ["a", "b"]);
    /// ```
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            inner: self.hashes().iter().zip(self.buckets().iter()),
            remaining: self.len,
        }
    }

    /// Returns an iterator yielding mutable references to all values.
    ///
    /// Callers must not change the part of a value that feeds its hash.
    pub fn iter_mut(&mut self) -> IterMut<'_, V> {
        let remaining = self.len;
        let (hashes, buckets) = self.parts_mut();
        IterMut {
            inner: hashes.iter().zip(buckets.iter_mut()),
            remaining,
        }
    }

    /// Removes all values, returning them through an iterator. The allocation
    /// is kept.
    ///
    /// If the iterator is dropped early, the remaining values are dropped.
    pub fn drain(&mut self) -> Drain<'_, V, LOAD_FACTOR> {
        Drain {
            table: self,
            index: 0,
        }
    }

    /// Returns `true` if the table holds no values.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of values in the table.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns the number of slots allocated. Always zero or a power of two
    /// no smaller than 8.
    pub fn table_size(&self) -> usize {
        self.table_size
    }

    /// Returns the number of values the table can hold before it must grow:
    /// `table_size * LOAD_FACTOR / 100`.
    pub fn capacity(&self) -> usize {
        if self.table_size > usize::MAX / 100 {
            (self.table_size / 100) * LOAD_FACTOR
        } else {
            self.table_size * LOAD_FACTOR / 100
        }
    }

    /// Drops every value but keeps the allocation.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_ring::table::RobinHoodTable;
    /// let mut table: RobinHoodTable<u64> = RobinHoodTable::new();
    /// table.insert_multi(7, 7);
    /// let capacity = table.capacity();
    ///
    /// table.clear();
    /// assert!(table.is_empty());
    /// assert_eq!(table.capacity(), capacity);
    /// ```
    pub fn clear(&mut self) {
        self.drop_values();
        self.len = 0;
        let (hashes, _) = self.parts_mut();
        hashes.fill(EMPTY);
    }

    /// Ensures that `capacity() >= n`, rehashing if it is not.
    ///
    /// Note that `n` is a total, not an additional count.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_ring::table::RobinHoodTable;
    /// let mut table: RobinHoodTable<u64, 50> = RobinHoodTable::new();
    /// table.reserve(100);
    /// assert!(table.capacity() >= 100);
    /// assert_eq!(table.table_size(), 256);
    /// ```
    pub fn reserve(&mut self, n: usize) {
        if n > self.capacity() {
            self.rehash(n);
        }
    }

    /// Resizes the table to the smallest valid size whose capacity is at least
    /// `max(n, len())`, re-placing every value.
    ///
    /// The new table size is `ceil(n * 100 / LOAD_FACTOR)` rounded up to a
    /// power of two, and never below 8. If the result is zero (an empty table
    /// and `n == 0`), the allocation is released.
    pub fn rehash(&mut self, n: usize) {
        let n = n.max(self.len);

        if n == 0 {
            self.release();
            return;
        }

        let min_size = n
            .checked_mul(100)
            .expect("capacity overflow")
            .div_ceil(LOAD_FACTOR);
        let new_size = min_size
            .checked_next_power_of_two()
            .expect("capacity overflow")
            .max(MIN_TABLE_SIZE);

        log::trace!(
            "rehashing robin hood table: {} -> {} slots ({} values)",
            self.table_size,
            new_size,
            self.len
        );
        self.resize(new_size);
        debug_assert!(self.capacity() >= self.len);
    }

    /// Shrinks the table as far as its contents allow, releasing the
    /// allocation entirely if it is empty.
    pub fn shrink_to_fit(&mut self) {
        self.rehash(0);
    }

    /// Exchanges the contents of two tables without moving any values.
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(self, other);
    }

    fn release(&mut self) {
        debug_assert_eq!(self.len, 0);
        if self.layout.layout.size() != 0 {
            // SAFETY: The allocation is live, holds no initialized values,
            // and was produced with this layout.
            unsafe { alloc::alloc::dealloc(self.alloc.as_ptr(), self.layout.layout) };
        }
        self.layout = DataLayout::empty();
        self.alloc = NonNull::dangling();
        self.table_size = 0;
    }

    /// Moves every live value into a freshly allocated table of `new_size`
    /// slots. Tombstones are not carried over.
    fn resize(&mut self, new_size: usize) {
        debug_assert!(new_size.is_power_of_two() && new_size >= MIN_TABLE_SIZE);

        let (new_layout, new_alloc) = Self::allocate(new_size);
        let old_layout = core::mem::replace(&mut self.layout, new_layout);
        let old_alloc = core::mem::replace(&mut self.alloc, new_alloc);
        let old_size = core::mem::replace(&mut self.table_size, new_size);

        if old_size == 0 {
            return;
        }

        // SAFETY: The old allocation is still live and laid out by
        // `old_layout` for `old_size` slots. Each live value is moved out
        // exactly once; the memory is then freed without dropping them again.
        unsafe {
            let old_hashes = old_alloc.as_ptr().add(old_layout.hashes_offset).cast::<u64>();
            let old_buckets = old_alloc.as_ptr().cast::<MaybeUninit<V>>();

            if self.len != 0 {
                for i in 0..old_size {
                    let stored = old_hashes.add(i).read();
                    if is_live(stored) {
                        let value = (*old_buckets.add(i)).assume_init_read();
                        self.place_multi(stored, value);
                    }
                }
            }

            alloc::alloc::dealloc(old_alloc.as_ptr(), old_layout.layout);
        }
    }

    /// Re-places every value into a table of the same size, clearing out
    /// tombstones.
    #[cold]
    fn rebuild(&mut self) {
        log::debug!(
            "rebuilding robin hood table to clear tombstones ({} values in {} slots)",
            self.len,
            self.table_size
        );
        self.resize(self.table_size);
    }

    /// Grows ahead of an insert so that at least one slot stays unoccupied.
    #[inline]
    fn reserve_for_insert(&mut self) {
        if self.len + 1 >= self.capacity() {
            self.reserve(self.len + 1);
        }
    }

    /// Places `value` with finalized hash `h`, rebuilding (and, if that does
    /// not help, growing) when the probe walks the entire table.
    ///
    /// Does not touch `len`. Returns the slot now holding `value`.
    fn place_multi(&mut self, h: u64, value: V) -> usize {
        self.place_with(h, value, Self::try_place_multi)
    }

    /// As [`place_multi`](Self::place_multi), but uses the unique-insert rule
    /// for reusing tombstones. The caller must already know that no equal
    /// value is present.
    fn place_unique(&mut self, h: u64, value: V) -> usize {
        self.place_with(h, value, Self::try_place_unique)
    }

    #[inline]
    fn place_with(
        &mut self,
        h: u64,
        mut value: V,
        try_place: fn(&mut Self, u64, V) -> Result<usize, V>,
    ) -> usize {
        let mut rebuilt = false;
        loop {
            match try_place(self, h, value) {
                Ok(index) => return index,
                Err(returned) => {
                    value = returned;
                    if rebuilt {
                        log::debug!(
                            "robin hood probe exhausted after rebuild; growing from {} slots",
                            self.table_size
                        );
                        self.resize(self.table_size * 2);
                    } else {
                        self.rebuild();
                        rebuilt = true;
                    }
                }
            }
        }
    }

    /// Multi-insert probe: takes the first empty slot, the first tombstone no
    /// closer to home than the probe, or evicts the first resident that is
    /// closer to home than the probe.
    fn try_place_multi(&mut self, h: u64, value: V) -> Result<usize, V> {
        let mask = self.table_size - 1;
        let mut index = h as usize & mask;
        let last = index.wrapping_sub(1) & mask;
        let mut dist = 0usize;

        loop {
            let stored = self.hashes()[index];

            if stored == EMPTY {
                return Ok(self.write_slot(index, h, value));
            }

            let existing = distance(index, stored, mask);
            if is_deleted(stored) {
                if dist >= existing {
                    return Ok(self.write_slot(index, h, value));
                }
            } else if dist > existing {
                return self.displace(index, h, value, existing);
            }

            if index == last {
                return Err(value);
            }

            index = (index + 1) & mask;
            dist += 1;
        }
    }

    /// Unique-insert probe. Remembers the first tombstone whose distance
    /// matches the probe's (or that the probe out-distances) and prefers it
    /// over evicting a live resident.
    fn try_place_unique(&mut self, h: u64, value: V) -> Result<usize, V> {
        let mask = self.table_size - 1;
        let mut index = h as usize & mask;
        let last = index.wrapping_sub(1) & mask;
        let mut dist = 0usize;
        let mut first_deleted = None;

        loop {
            let stored = self.hashes()[index];

            if stored == EMPTY {
                return Ok(self.write_slot(index, h, value));
            }

            let existing = distance(index, stored, mask);
            if dist > existing {
                if first_deleted.is_none() && is_deleted(stored) {
                    first_deleted = Some(index);
                }

                if let Some(slot) = first_deleted {
                    return Ok(self.write_slot(slot, h, value));
                }

                return self.displace(index, h, value, existing);
            } else if first_deleted.is_none() && dist == existing && is_deleted(stored) {
                first_deleted = Some(index);
            }

            if index == last {
                return Err(value);
            }

            index = (index + 1) & mask;
            dist += 1;
        }
    }

    #[inline(always)]
    fn write_slot(&mut self, index: usize, h: u64, value: V) -> usize {
        let (hashes, buckets) = self.parts_mut();
        hashes[index] = h;
        buckets[index].write(value);
        index
    }

    /// Puts `(h, value)` into the live slot `orig`, then walks forward with
    /// the evicted resident until it (or whatever it evicts in turn) finds a
    /// home.
    ///
    /// If the walk covers the whole table or comes back around to `orig`, the
    /// carried resident is put into `orig` and `value` is handed back so the
    /// caller can rebuild.
    fn displace(&mut self, orig: usize, h: u64, value: V, existing: usize) -> Result<usize, V> {
        let mask = self.table_size - 1;
        let (hashes, buckets) = self.parts_mut();

        let mut carried_hash = core::mem::replace(&mut hashes[orig], h);
        // SAFETY: `orig` is live, so its bucket is initialized; it is
        // immediately refilled with `value`.
        let mut carried = unsafe { buckets[orig].assume_init_read() };
        buckets[orig].write(value);

        let mut dist = existing + 1;
        let mut last = (carried_hash as usize).wrapping_sub(1) & mask;
        let mut index = (orig + 1) & mask;

        loop {
            let stored = hashes[index];

            if stored == EMPTY {
                hashes[index] = carried_hash;
                buckets[index].write(carried);
                return Ok(orig);
            }

            let resident = distance(index, stored, mask);
            if is_deleted(stored) {
                if dist >= resident {
                    hashes[index] = carried_hash;
                    buckets[index].write(carried);
                    return Ok(orig);
                }
            } else if dist > resident {
                core::mem::swap(&mut hashes[index], &mut carried_hash);
                // SAFETY: The slot is live, so the bucket is initialized.
                core::mem::swap(unsafe { buckets[index].assume_init_mut() }, &mut carried);
                dist = resident;
                last = (carried_hash as usize).wrapping_sub(1) & mask;
            }

            if index == last {
                break;
            }

            index = (index + 1) & mask;
            dist += 1;

            if index == orig {
                break;
            }
        }

        hashes[orig] = carried_hash;
        // SAFETY: The walk never swaps at `orig`, so it still holds the value
        // written above.
        let value = unsafe { buckets[orig].assume_init_read() };
        buckets[orig].write(carried);
        Err(value)
    }

    /// Removes the live value at `index`, leaving a tombstone. If the next
    /// slot is empty, the tombstone and any tombstones directly before it are
    /// turned back into empty slots.
    fn erase_at(&mut self, index: usize) -> V {
        let mask = self.table_size - 1;
        self.len -= 1;

        let (hashes, buckets) = self.parts_mut();
        debug_assert!(is_live(hashes[index]));

        // SAFETY: The slot is live, and is marked deleted right after the
        // value is moved out.
        let value = unsafe { buckets[index].assume_init_read() };
        hashes[index] |= DELETED_BIT;

        if hashes[(index + 1) & mask] == EMPTY {
            let mut i = index;
            loop {
                hashes[i] = EMPTY;
                i = i.wrapping_sub(1) & mask;
                if !is_deleted(hashes[i]) {
                    break;
                }
            }
        }

        value
    }

    /// Gets an entry for the given hash and equality predicate.
    ///
    /// The table reserves room for one more value before searching, so a
    /// [`VacantEntry`] can always be filled.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use robin_ring::table::Entry;
    /// # use robin_ring::table::RobinHoodTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_str(s: &str) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     s.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table: RobinHoodTable<(String, u32)> = RobinHoodTable::new();
    /// let hash = hash_str("hello");
    ///
    /// match table.entry(hash, |(k, _)| k == "hello") {
    ///     Entry::Vacant(entry) => {
    ///         entry.insert(("hello".to_string(), 1));
    ///     }
    ///     Entry::Occupied(mut entry) => {
    ///         entry.get_mut().1 += 1;
    ///     }
    /// }
    ///
    /// table
    ///     .entry(hash, |(k, _)| k == "hello")
    ///     .and_modify(|(_, n)| *n += 1);
    /// assert_eq!(table.find(hash, |(k, _)| k == "hello"), Some(&("hello".to_string(), 2)));
    /// ```
    pub fn entry(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Entry<'_, V, LOAD_FACTOR> {
        self.reserve_for_insert();

        let h = finalize(hash);
        match self.slots().find(h, eq) {
            Some(index) => Entry::Occupied(OccupiedEntry { table: self, index }),
            None => Entry::Vacant(VacantEntry { table: self, hash: h }),
        }
    }

    /// Inserts `value` unless a value satisfying `eq` is already present.
    ///
    /// Returns a reference to the stored value (the existing one if no
    /// insertion happened) and whether an insertion took place. When the
    /// value is already present, `value` is dropped.
    pub fn insert_unique(
        &mut self,
        hash: u64,
        value: V,
        eq: impl Fn(&V) -> bool,
    ) -> (&mut V, bool) {
        match self.entry(hash, eq) {
            Entry::Occupied(entry) => (entry.into_mut(), false),
            Entry::Vacant(entry) => (entry.insert(value), true),
        }
    }

    /// Inserts `value` unconditionally. Values comparing equal to existing
    /// ones are kept side by side.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_ring::table::RobinHoodTable;
    /// let mut table: RobinHoodTable<(u8, &str)> = RobinHoodTable::new();
    /// table.insert_multi(1, (1, "a"));
    /// table.insert_multi(1, (1, "b"));
    /// assert_eq!(table.count(1, |(k, _)| *k == 1), 2);
    /// ```
    pub fn insert_multi(&mut self, hash: u64, value: V) -> &mut V {
        self.reserve_for_insert();
        let index = self.place_multi(finalize(hash), value);
        self.len += 1;

        // SAFETY: `place_multi` returns the slot it just initialized.
        unsafe { self.parts_mut().1[index].assume_init_mut() }
    }

    /// Finds a value matching the given hash and predicate.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_ring::table::RobinHoodTable;
    /// let mut table: RobinHoodTable<u64> = RobinHoodTable::new();
    /// table.insert_unique(42, 42, |&n| n == 42);
    ///
    /// assert_eq!(table.find(42, |&n| n == 42), Some(&42));
    /// assert_eq!(table.find(99, |&n| n == 99), None);
    /// ```
    pub fn find(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&V> {
        if self.len == 0 {
            return None;
        }

        let slots = self.slots();
        // SAFETY: `find` only returns live slots.
        slots.find(finalize(hash), eq).map(|index| unsafe { slots.get(index) })
    }

    /// Finds a value matching the given hash and predicate, mutably.
    ///
    /// Callers must not change the part of the value that feeds its hash.
    pub fn find_mut(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&mut V> {
        if self.len == 0 {
            return None;
        }

        let index = self.slots().find(finalize(hash), eq)?;
        // SAFETY: `find` only returns live slots.
        Some(unsafe { self.parts_mut().1[index].assume_init_mut() })
    }

    /// Returns `true` if a value matches the given hash and predicate.
    pub fn contains(&self, hash: u64, eq: impl Fn(&V) -> bool) -> bool {
        self.find(hash, eq).is_some()
    }

    /// Returns an iterator over every value matching the given hash and
    /// predicate.
    ///
    /// The iterator only walks the probe sequence of the matching values; it
    /// cannot be used to enumerate the whole table.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_ring::table::RobinHoodTable;
    /// let mut table: RobinHoodTable<(u8, u32)> = RobinHoodTable::new();
    /// for n in 0..5 {
    ///     table.insert_multi(3, (3, n));
    /// }
    /// table.insert_multi(4, (4, 100));
    ///
    /// let mut values: Vec<u32> = table.equal_range(3, |(k, _)| *k == 3).map(|(_, n)| *n).collect();
    /// values.sort();
    /// assert_eq!(values, [0, 1, 2, 3, 4]);
    /// ```
    pub fn equal_range<F>(&self, hash: u64, eq: F) -> FindIter<'_, V, F>
    where
        F: Fn(&V) -> bool,
    {
        let slots = self.slots();
        let next = if self.len == 0 {
            None
        } else {
            slots.find(finalize(hash), &eq)
        };

        FindIter { slots, next, eq }
    }

    /// Counts the values matching the given hash and predicate.
    pub fn count(&self, hash: u64, eq: impl Fn(&V) -> bool) -> usize {
        self.equal_range(hash, eq).count()
    }

    /// Removes and returns one value matching the given hash and predicate.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_ring::table::RobinHoodTable;
    /// let mut table: RobinHoodTable<u64> = RobinHoodTable::new();
    /// table.insert_unique(42, 42, |&n| n == 42);
    ///
    /// assert_eq!(table.remove(42, |&n| n == 42), Some(42));
    /// assert!(table.is_empty());
    /// assert_eq!(table.remove(99, |&n| n == 99), None);
    /// ```
    pub fn remove(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<V> {
        if self.len == 0 {
            return None;
        }

        let index = self.slots().find(finalize(hash), eq)?;
        Some(self.erase_at(index))
    }

    /// Removes every value matching the given hash and predicate, returning
    /// how many were removed.
    pub fn remove_all(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> usize {
        if self.len == 0 {
            return 0;
        }

        let mut removed = 0;
        let mut current = self.slots().find(finalize(hash), &eq);
        while let Some(index) = current {
            current = self.slots().find_next(index, &eq);
            drop(self.erase_at(index));
            removed += 1;
        }
        removed
    }

    /// Keeps only the values for which `f` returns `true`.
    pub fn retain(&mut self, mut f: impl FnMut(&mut V) -> bool) {
        for index in 0..self.table_size {
            if self.len == 0 {
                break;
            }

            if !is_live(self.hashes()[index]) {
                continue;
            }

            // SAFETY: The slot is live.
            let keep = f(unsafe { self.parts_mut().1[index].assume_init_mut() });
            if !keep {
                drop(self.erase_at(index));
            }
        }
    }

    /// Computes a histogram of probe distances: element `d` counts the values
    /// stored `d` slots past their ideal slot.
    ///
    /// Requires the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn probe_histogram(&self) -> alloc::vec::Vec<usize> {
        let mut hist = alloc::vec::Vec::new();
        let mask = self.table_size.wrapping_sub(1);

        for (index, &stored) in self.hashes().iter().enumerate() {
            if is_live(stored) {
                let d = distance(index, stored, mask);
                if hist.len() <= d {
                    hist.resize(d + 1, 0);
                }
                hist[d] += 1;
            }
        }

        hist
    }

    /// Returns summary statistics about slot usage and probe distances.
    ///
    /// Requires the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self) -> DebugStats {
        let hist = self.probe_histogram();
        let total_distance: usize = hist.iter().enumerate().map(|(d, n)| d * n).sum();
        let tombstones = self.hashes().iter().filter(|&&h| is_deleted(h)).count();

        DebugStats {
            len: self.len,
            capacity: self.capacity(),
            table_size: self.table_size,
            tombstones,
            max_probe_distance: hist.len().saturating_sub(1),
            mean_probe_distance: if self.len == 0 {
                0.0
            } else {
                total_distance as f64 / self.len as f64
            },
            total_bytes: self.layout.layout.size(),
        }
    }
}

/// Slot-usage statistics produced by [`RobinHoodTable::debug_stats`].
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of values in the table
    pub len: usize,
    /// Number of values the table holds before growing
    pub capacity: usize,
    /// Number of slots allocated
    pub table_size: usize,
    /// Number of erased slots not yet reclaimed
    pub tombstones: usize,
    /// Largest distance of any value from its ideal slot
    pub max_probe_distance: usize,
    /// Average distance of values from their ideal slots
    pub mean_probe_distance: f64,
    /// Bytes held by the slot allocation
    pub total_bytes: usize,
}

#[cfg(any(test, feature = "stats"))]
impl DebugStats {
    /// Pretty-print the statistics to stdout.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Robin Hood Table Statistics ===");
        println!(
            "Population: {}/{} ({:.2}% of capacity)",
            self.len,
            self.capacity,
            if self.capacity == 0 {
                0.0
            } else {
                self.len as f64 / self.capacity as f64 * 100.0
            }
        );
        println!("Slots: {} ({} tombstones)", self.table_size, self.tombstones);
        println!(
            "Probe distance: max {}, mean {:.3}",
            self.max_probe_distance, self.mean_probe_distance
        );
        println!("Total Allocated: {} bytes", self.total_bytes);
    }
}

/// A view into a single entry in the table, which may be vacant or occupied.
///
/// This enum is constructed from the [`entry`] method on [`RobinHoodTable`].
///
/// [`entry`]: RobinHoodTable::entry
pub enum Entry<'a, V, const LOAD_FACTOR: usize = 80> {
    /// No value matched the predicate
    Vacant(VacantEntry<'a, V, LOAD_FACTOR>),
    /// A value matched the predicate
    Occupied(OccupiedEntry<'a, V, LOAD_FACTOR>),
}

impl<'a, V, const LOAD_FACTOR: usize> Entry<'a, V, LOAD_FACTOR> {
    /// Inserts `default` if the entry is vacant, and returns a mutable
    /// reference to the value in the entry.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts the result of `default` if the entry is vacant. `default` is
    /// not called otherwise.
    pub fn or_insert_with(self, default: impl FnOnce() -> V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Calls `f` on the value if the entry is occupied.
    ///
    /// Returns the (possibly modified) value, or `None` for a vacant entry.
    pub fn and_modify(self, f: impl FnOnce(&mut V)) -> Option<&'a mut V> {
        match self {
            Entry::Occupied(entry) => {
                let value = entry.into_mut();
                f(value);
                Some(value)
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Inserts `V::default()` if the entry is vacant.
    pub fn or_default(self) -> &'a mut V
    where
        V: Default,
    {
        self.or_insert_with(V::default)
    }
}

/// A view into a vacant entry in a [`RobinHoodTable`].
pub struct VacantEntry<'a, V, const LOAD_FACTOR: usize = 80> {
    table: &'a mut RobinHoodTable<V, LOAD_FACTOR>,
    hash: u64,
}

impl<'a, V, const LOAD_FACTOR: usize> VacantEntry<'a, V, LOAD_FACTOR> {
    /// Inserts a value into the vacant entry and returns a mutable reference
    /// to it.
    pub fn insert(self, value: V) -> &'a mut V {
        let index = self.table.place_unique(self.hash, value);
        self.table.len += 1;

        // SAFETY: `place_unique` returns the slot it just initialized.
        unsafe { self.table.parts_mut().1[index].assume_init_mut() }
    }
}

/// A view into an occupied entry in a [`RobinHoodTable`].
pub struct OccupiedEntry<'a, V, const LOAD_FACTOR: usize = 80> {
    table: &'a mut RobinHoodTable<V, LOAD_FACTOR>,
    index: usize,
}

impl<'a, V, const LOAD_FACTOR: usize> OccupiedEntry<'a, V, LOAD_FACTOR> {
    /// Gets a reference to the value in the entry.
    pub fn get(&self) -> &V {
        // SAFETY: The entry was produced by a successful lookup, so the slot
        // is live.
        unsafe { self.table.slots().get(self.index) }
    }

    /// Gets a mutable reference to the value in the entry.
    pub fn get_mut(&mut self) -> &mut V {
        // SAFETY: The slot is live.
        unsafe { self.table.parts_mut().1[self.index].assume_init_mut() }
    }

    /// Converts the entry into a mutable reference bound to the table's
    /// lifetime.
    pub fn into_mut(self) -> &'a mut V {
        // SAFETY: The slot is live.
        unsafe { self.table.parts_mut().1[self.index].assume_init_mut() }
    }

    /// Removes the value from the table and returns it.
    pub fn remove(self) -> V {
        self.table.erase_at(self.index)
    }
}

/// An iterator over the values in a [`RobinHoodTable`].
///
/// This struct is created by the [`iter`] method on [`RobinHoodTable`].
///
/// [`iter`]: RobinHoodTable::iter
pub struct Iter<'a, V> {
    inner: core::iter::Zip<core::slice::Iter<'a, u64>, core::slice::Iter<'a, MaybeUninit<V>>>,
    remaining: usize,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        for (&stored, bucket) in self.inner.by_ref() {
            if is_live(stored) {
                self.remaining -= 1;
                // SAFETY: Live slots hold initialized values.
                return Some(unsafe { bucket.assume_init_ref() });
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for Iter<'_, V> {}

impl<V> Clone for Iter<'_, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            remaining: self.remaining,
        }
    }
}

/// A mutable iterator over the values in a [`RobinHoodTable`].
///
/// This struct is created by the [`iter_mut`] method on [`RobinHoodTable`].
///
/// [`iter_mut`]: RobinHoodTable::iter_mut
pub struct IterMut<'a, V> {
    inner: core::iter::Zip<core::slice::Iter<'a, u64>, core::slice::IterMut<'a, MaybeUninit<V>>>,
    remaining: usize,
}

impl<'a, V> Iterator for IterMut<'a, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        for (&stored, bucket) in self.inner.by_ref() {
            if is_live(stored) {
                self.remaining -= 1;
                // SAFETY: Live slots hold initialized values.
                return Some(unsafe { bucket.assume_init_mut() });
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for IterMut<'_, V> {}

/// An iterator over the values that share a hash and match a predicate.
///
/// This struct is created by the [`equal_range`] method on
/// [`RobinHoodTable`].
///
/// [`equal_range`]: RobinHoodTable::equal_range
pub struct FindIter<'a, V, F> {
    slots: Slots<'a, V>,
    next: Option<usize>,
    eq: F,
}

impl<'a, V, F> Iterator for FindIter<'a, V, F>
where
    F: Fn(&V) -> bool,
{
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.next?;
        self.next = self.slots.find_next(index, &self.eq);
        // SAFETY: Both `find` and `find_next` only return live slots.
        Some(unsafe { self.slots.get(index) })
    }
}

impl<V, F> core::iter::FusedIterator for FindIter<'_, V, F> where F: Fn(&V) -> bool {}

/// A draining iterator over the values in a [`RobinHoodTable`].
///
/// This struct is created by the [`drain`] method on [`RobinHoodTable`].
///
/// [`drain`]: RobinHoodTable::drain
pub struct Drain<'a, V, const LOAD_FACTOR: usize = 80> {
    table: &'a mut RobinHoodTable<V, LOAD_FACTOR>,
    index: usize,
}

impl<V, const LOAD_FACTOR: usize> Drop for Drain<'_, V, LOAD_FACTOR> {
    fn drop(&mut self) {
        for _ in &mut *self {}

        let (hashes, _) = self.table.parts_mut();
        hashes.fill(EMPTY);
    }
}

impl<V, const LOAD_FACTOR: usize> Iterator for Drain<'_, V, LOAD_FACTOR> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        if self.table.len == 0 {
            return None;
        }

        let taken = {
            let (hashes, buckets) = self.table.parts_mut();
            let mut taken = None;
            while self.index < hashes.len() {
                let index = self.index;
                self.index += 1;

                if is_live(hashes[index]) {
                    hashes[index] = EMPTY;
                    // SAFETY: The slot was live and is now marked empty, so
                    // the value is read out exactly once.
                    taken = Some(unsafe { buckets[index].assume_init_read() });
                    break;
                }
            }
            taken
        };

        if taken.is_some() {
            self.table.len -= 1;
        }
        taken
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.table.len, Some(self.table.len))
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::hash::Hasher;

    use rand::Rng;
    use rand::SeedableRng;
    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use rand::rngs::SmallRng;
    use siphasher::sip::SipHasher;

    use super::*;

    struct HashState {
        k0: u64,
        k1: u64,
    }

    impl HashState {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k0: rng.try_next_u64().unwrap(),
                k1: rng.try_next_u64().unwrap(),
            }
        }

        fn build_hasher(&self) -> SipHasher {
            SipHasher::new_with_keys(self.k0, self.k1)
        }
    }

    #[derive(Debug, PartialEq, Eq, Clone)]
    struct Item {
        key: u64,
        value: i32,
    }

    fn hash_key(state: &HashState, key: u64) -> u64 {
        let mut h = state.build_hasher();
        h.write_u64(key);
        h.finish()
    }

    /// Asserts that a live value never sits more than one slot further from
    /// home than the live value directly before it.
    fn assert_fair<V, const LF: usize>(table: &RobinHoodTable<V, LF>) {
        let mask = table.table_size().wrapping_sub(1);
        let hashes = table.hashes();
        for (index, &stored) in hashes.iter().enumerate() {
            let next = (index + 1) & mask;
            if !is_live(stored) || !is_live(hashes[next]) {
                continue;
            }
            assert!(
                distance(next, hashes[next], mask) <= distance(index, stored, mask) + 1,
                "slot {next} is further from home than slot {index} allows: {:#?}",
                table
            );
        }
    }

    /// Asserts that no live value is separated from its ideal slot by an
    /// empty slot, that neighbors are fair, and that every value is reachable
    /// through `find`.
    fn assert_probe_invariants<const LF: usize>(table: &RobinHoodTable<Item, LF>) {
        assert_fair(table);

        let mask = table.table_size().wrapping_sub(1);
        let hashes = table.hashes();
        for (index, &stored) in hashes.iter().enumerate() {
            if !is_live(stored) {
                continue;
            }
            let d = distance(index, stored, mask);
            for back in 1..=d {
                let slot = index.wrapping_sub(back) & mask;
                assert_ne!(hashes[slot], EMPTY, "gap before slot {index}: {:#?}", table);
            }

            let item = unsafe { table.slots().get(index) };
            let key = item.key;
            assert!(
                table.find(stored, |v| v.key == key).is_some(),
                "unreachable key {key}: {:#?}",
                table
            );
        }
    }

    #[test]
    fn insert_and_find() {
        let state = HashState::default();
        let mut table: RobinHoodTable<Item> = RobinHoodTable::with_capacity(0);
        for k in 0..32u64 {
            let hash = hash_key(&state, k);
            match table.entry(hash, |v: &Item| v.key == k) {
                Entry::Vacant(v) => {
                    v.insert(Item {
                        key: k,
                        value: (k as i32) * 2,
                    });
                    assert_eq!(
                        table.find(hash, |v| v.key == k),
                        Some(&Item {
                            key: k,
                            value: (k as i32) * 2
                        }),
                        "{:#?}",
                        table
                    );
                }
                Entry::Occupied(_) => panic!("unexpected occupied on first insert: {:#?}", table),
            }
        }
        assert_eq!(table.len(), 32);
        assert!(table.len() <= table.capacity());
        for k in 0..32u64 {
            let hash = hash_key(&state, k);
            assert_eq!(
                table.find(hash, |v| v.key == k),
                Some(&Item {
                    key: k,
                    value: (k as i32) * 2
                }),
                "{:#?}",
                table
            );
        }

        let miss_hash = hash_key(&state, 999);
        assert!(table.find(miss_hash, |v| v.key == 999).is_none());
        assert_probe_invariants(&table);
    }

    #[test]
    fn duplicate_entry_is_occupied() {
        let state = HashState::default();
        let mut table: RobinHoodTable<Item> = RobinHoodTable::new();
        let k = 42u64;
        let hash = hash_key(&state, k);

        let (_, inserted) = table.insert_unique(hash, Item { key: k, value: 7 }, |v| v.key == k);
        assert!(inserted);

        match table.entry(hash, |v| v.key == k) {
            Entry::Occupied(mut occ) => {
                assert_eq!(occ.get().value, 7);
                occ.get_mut().value = 11;
            }
            Entry::Vacant(_) => panic!("should be occupied second time"),
        }

        let (existing, inserted) =
            table.insert_unique(hash, Item { key: k, value: 99 }, |v| v.key == k);
        assert!(!inserted);
        assert_eq!(existing.value, 11);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn remove_items() {
        let state = HashState::default();
        let mut table: RobinHoodTable<Item> = RobinHoodTable::new();
        for k in 0..100u64 {
            table.insert_unique(hash_key(&state, k), Item { key: k, value: k as i32 }, |v| {
                v.key == k
            });
        }

        for k in (0..100u64).step_by(2) {
            let removed = table.remove(hash_key(&state, k), |v| v.key == k);
            assert_eq!(removed.map(|i| i.value), Some(k as i32), "{:#?}", table);
        }

        assert_eq!(table.len(), 50);
        for k in 0..100u64 {
            let found = table.find(hash_key(&state, k), |v| v.key == k);
            assert_eq!(found.is_some(), k % 2 == 1, "key {k}: {:#?}", table);
        }
        assert_probe_invariants(&table);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn insert_many() {
        let state = HashState::default();
        let mut table: RobinHoodTable<Item> = RobinHoodTable::new();
        for k in 0..10_000u64 {
            let (_, inserted) =
                table.insert_unique(hash_key(&state, k), Item { key: k, value: k as i32 }, |v| {
                    v.key == k
                });
            assert!(inserted);
        }

        assert_eq!(table.len(), 10_000);
        assert!(table.len() <= table.capacity());
        assert!(table.table_size().is_power_of_two());
        for k in 0..10_000u64 {
            assert_eq!(
                table.find(hash_key(&state, k), |v| v.key == k).map(|i| i.value),
                Some(k as i32)
            );
        }
        assert_probe_invariants(&table);
    }

    #[test]
    fn explicit_collision() {
        let mut table: RobinHoodTable<Item> = RobinHoodTable::new();
        for k in 0..20u64 {
            table.insert_unique(0, Item { key: k, value: k as i32 }, |v| v.key == k);
            assert_fair(&table);
        }

        assert_eq!(table.len(), 20);
        for k in 0..20u64 {
            assert_eq!(
                table.find(0, |v| v.key == k).map(|i| i.value),
                Some(k as i32),
                "{:#?}",
                table
            );
        }

        let hist = table.probe_histogram();
        assert_eq!(hist.len(), 20, "{:#?}", table);
        assert!(hist.iter().all(|&n| n == 1));
    }

    #[test]
    fn empty_sentinel_hash_is_perturbed() {
        let mut table: RobinHoodTable<Item> = RobinHoodTable::new();
        table.insert_unique(EMPTY, Item { key: 1, value: 1 }, |v| v.key == 1);
        table.insert_unique(u64::MAX, Item { key: 2, value: 2 }, |v| v.key == 2);

        assert_eq!(table.len(), 2);
        assert_eq!(table.find(EMPTY, |v| v.key == 1).map(|i| i.value), Some(1));
        assert_eq!(table.find(u64::MAX, |v| v.key == 2).map(|i| i.value), Some(2));
        assert!(table.hashes().iter().filter(|&&h| is_live(h)).count() == 2);
    }

    #[test]
    fn finalize_is_idempotent() {
        for h in [0, 1, EMPTY, u64::MAX, DELETED_BIT, 0x1234_5678_9abc_def0] {
            let once = finalize(h);
            assert_eq!(finalize(once), once);
            assert!(is_live(once));
        }
    }

    #[test]
    fn erase_reinsert_cycles_do_not_accumulate_tombstones() {
        let state = HashState::default();
        let mut table: RobinHoodTable<Item> = RobinHoodTable::with_capacity(16);
        for k in 0..8u64 {
            table.insert_unique(hash_key(&state, k), Item { key: k, value: 0 }, |v| v.key == k);
        }
        let table_size = table.table_size();

        for round in 0..1_000 {
            let k = round % 8;
            let hash = hash_key(&state, k);
            assert!(table.remove(hash, |v| v.key == k).is_some());
            assert_eq!(table.len(), 7);
            table.insert_unique(hash, Item { key: k, value: round as i32 }, |v| v.key == k);
            assert_eq!(table.len(), 8);
            assert!(table.find(hash, |v| v.key == k).is_some());
        }

        assert_eq!(table.table_size(), table_size);
        assert!(table.debug_stats().tombstones < table_size);
        assert_probe_invariants(&table);
    }

    #[test]
    fn trailing_tombstones_become_empty() {
        let mut table: RobinHoodTable<Item> = RobinHoodTable::with_capacity(4);
        for k in 0..3u64 {
            table.insert_unique(0, Item { key: k, value: 0 }, |v| v.key == k);
        }

        // Erasing from the middle leaves a tombstone.
        table.remove(0, |v| v.key == 1);
        assert_eq!(table.debug_stats().tombstones, 1, "{:#?}", table);

        // Erasing the tail reclaims the tail and the tombstone before it.
        table.remove(0, |v| v.key == 2);
        assert_eq!(table.debug_stats().tombstones, 0, "{:#?}", table);
        assert_eq!(table.find(0, |v| v.key == 0).map(|i| i.key), Some(0));
    }

    #[test]
    fn tombstones_are_reused_without_growth() {
        let mut table: RobinHoodTable<Item, 100> = RobinHoodTable::with_capacity(8);
        assert_eq!(table.table_size(), 8);

        for k in 0..6u64 {
            table.insert_multi(k, Item { key: k, value: 0 });
        }
        for k in 0..5u64 {
            assert!(table.remove(k, |v| v.key == k).is_some());
        }
        for k in 10..16u64 {
            table.insert_multi(k, Item { key: k, value: 1 });
        }

        assert_eq!(table.len(), 7);
        assert_eq!(table.table_size(), 8);
        for k in (5..6).chain(10..16) {
            assert!(table.find(k, |v| v.key == k).is_some(), "{:#?}", table);
        }
        assert_probe_invariants(&table);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn randomized_against_reference() {
        let state = HashState::default();
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        let mut table: RobinHoodTable<Item, 90> = RobinHoodTable::new();
        let mut reference = std::collections::HashMap::new();

        for _ in 0..20_000 {
            let k = rng.random_range(0..512u64);
            let hash = hash_key(&state, k);
            if rng.random_bool(0.6) {
                let value = rng.random::<i32>();
                match table.entry(hash, |v| v.key == k) {
                    Entry::Occupied(mut e) => e.get_mut().value = value,
                    Entry::Vacant(e) => {
                        e.insert(Item { key: k, value });
                    }
                }
                reference.insert(k, value);
            } else {
                assert_eq!(
                    table.remove(hash, |v| v.key == k).map(|i| i.value),
                    reference.remove(&k)
                );
            }
            assert_eq!(table.len(), reference.len());
            assert_fair(&table);
        }

        for (k, v) in &reference {
            assert_eq!(
                table.find(hash_key(&state, *k), |i| i.key == *k).map(|i| i.value),
                Some(*v)
            );
        }
        assert_probe_invariants(&table);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn crowded_hashes_stay_fair() {
        for seed in 0..20u64 {
            let mut rng = SmallRng::seed_from_u64(seed);
            let mut table: RobinHoodTable<Item, 95> = RobinHoodTable::new();
            let mut live = Vec::new();

            for step in 0..3_000u64 {
                if live.is_empty() || rng.random_bool(0.6) {
                    let hash = rng.random_range(0..64u64);
                    table.insert_multi(hash, Item { key: step, value: hash as i32 });
                    live.push((hash, step));
                } else {
                    let (hash, key) = live.swap_remove(rng.random_range(0..live.len()));
                    assert!(table.remove(hash, |v| v.key == key).is_some(), "{:#?}", table);
                }
                assert_eq!(table.len(), live.len());
                assert_fair(&table);
            }

            for &(hash, key) in &live {
                assert!(table.find(hash, |v| v.key == key).is_some(), "{:#?}", table);
            }
        }
    }

    #[test]
    fn multi_insert_and_equal_range() {
        let state = HashState::default();
        let mut table: RobinHoodTable<Item> = RobinHoodTable::new();
        let hash = hash_key(&state, 7);
        for value in 0..25 {
            table.insert_multi(hash, Item { key: 7, value });
        }
        for k in 0..50u64 {
            table.insert_multi(hash_key(&state, k + 100), Item { key: k + 100, value: -1 });
        }

        assert_eq!(table.count(hash, |v| v.key == 7), 25);
        let mut seen: Vec<i32> = table.equal_range(hash, |v| v.key == 7).map(|i| i.value).collect();
        seen.sort();
        assert_eq!(seen, (0..25).collect::<Vec<_>>());

        assert_eq!(table.remove_all(hash, |v| v.key == 7), 25);
        assert_eq!(table.count(hash, |v| v.key == 7), 0);
        assert_eq!(table.len(), 50);
        assert_probe_invariants(&table);
    }

    #[test]
    fn equal_range_on_empty_and_missing() {
        let table: RobinHoodTable<Item> = RobinHoodTable::new();
        assert_eq!(table.equal_range(1, |_| true).count(), 0);

        let mut table: RobinHoodTable<Item> = RobinHoodTable::new();
        table.insert_multi(1, Item { key: 1, value: 0 });
        assert_eq!(table.equal_range(2, |v| v.key == 2).count(), 0);
    }

    #[test]
    fn rehash_preserves_contents() {
        let state = HashState::default();
        let mut table: RobinHoodTable<Item, 50> = RobinHoodTable::new();
        for k in 0..300u64 {
            table.insert_unique(hash_key(&state, k), Item { key: k, value: k as i32 }, |v| {
                v.key == k
            });
        }

        for n in [0, 10, 300, 1_000, 4_097] {
            table.rehash(n);
            assert!(table.capacity() >= n.max(table.len()));
            assert_eq!(table.len(), 300);
            for k in 0..300u64 {
                assert_eq!(
                    table.find(hash_key(&state, k), |v| v.key == k).map(|i| i.value),
                    Some(k as i32)
                );
            }
        }
    }

    #[test]
    fn rehash_sizes() {
        let mut table: RobinHoodTable<u8, 80> = RobinHoodTable::new();
        table.rehash(1);
        assert_eq!(table.table_size(), 8);
        assert_eq!(table.capacity(), 6);

        table.rehash(7);
        assert_eq!(table.table_size(), 16);

        table.rehash(0);
        assert_eq!(table.table_size(), 0);
        assert_eq!(table.capacity(), 0);
    }

    #[test]
    fn iter_and_drain() {
        let state = HashState::default();
        let mut table: RobinHoodTable<Item> = RobinHoodTable::new();
        for k in 0..40u64 {
            table.insert_unique(hash_key(&state, k), Item { key: k, value: 1 }, |v| v.key == k);
        }

        assert_eq!(table.iter().len(), 40);
        let mut keys: Vec<u64> = table.iter().map(|i| i.key).collect();
        keys.sort();
        assert_eq!(keys, (0..40).collect::<Vec<_>>());

        for item in table.iter_mut() {
            item.value += 1;
        }
        assert!(table.iter().all(|i| i.value == 2));

        let table_size = table.table_size();
        let drained: Vec<Item> = table.drain().collect();
        assert_eq!(drained.len(), 40);
        assert!(table.is_empty());
        assert_eq!(table.table_size(), table_size);
        assert!(table.find(hash_key(&state, 3), |v| v.key == 3).is_none());
    }

    #[test]
    fn drain_dropped_early_clears_table() {
        let state = HashState::default();
        let mut table: RobinHoodTable<String> = RobinHoodTable::new();
        for k in 0..10u64 {
            table.insert_multi(hash_key(&state, k), k.to_string());
        }

        {
            let mut drain = table.drain();
            assert!(drain.next().is_some());
        }

        assert!(table.is_empty());
        assert_eq!(table.iter().count(), 0);
        table.insert_multi(hash_key(&state, 1), "1".to_string());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn retain_keeps_matching() {
        let state = HashState::default();
        let mut table: RobinHoodTable<Item> = RobinHoodTable::new();
        for k in 0..64u64 {
            table.insert_unique(hash_key(&state, k), Item { key: k, value: k as i32 }, |v| {
                v.key == k
            });
        }

        table.retain(|item| item.key % 3 == 0);
        assert_eq!(table.len(), 22);
        assert!(table.iter().all(|i| i.key % 3 == 0));
        assert_probe_invariants(&table);
    }

    #[test]
    fn test_clone() {
        let state = HashState::default();
        let mut table: RobinHoodTable<Item, 50> = RobinHoodTable::with_capacity(1_000);
        for k in 0..10u64 {
            table.insert_unique(hash_key(&state, k), Item { key: k, value: k as i32 }, |v| {
                v.key == k
            });
        }

        let cloned = table.clone();
        assert_eq!(cloned.len(), table.len());
        assert!(cloned.table_size() < table.table_size());
        for k in 0..10u64 {
            assert_eq!(
                cloned.find(hash_key(&state, k), |v| v.key == k),
                table.find(hash_key(&state, k), |v| v.key == k)
            );
        }
    }

    #[test]
    fn test_clone_empty_table() {
        let table: RobinHoodTable<String> = RobinHoodTable::new();
        let cloned = table.clone();
        assert!(cloned.is_empty());
        assert_eq!(cloned.table_size(), 0);
    }

    #[test]
    fn clear_keeps_allocation() {
        let mut table: RobinHoodTable<String> = RobinHoodTable::new();
        for k in 0..20u64 {
            table.insert_multi(k, k.to_string());
        }
        let table_size = table.table_size();

        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.table_size(), table_size);
        assert!(table.find(3, |s| s == "3").is_none());
    }

    #[test]
    fn test_shrink_to_fit_empty_table() {
        let mut table: RobinHoodTable<u64> = RobinHoodTable::with_capacity(100);
        table.shrink_to_fit();
        assert_eq!(table.table_size(), 0);
        assert_eq!(table.capacity(), 0);

        table.insert_multi(5, 5);
        assert_eq!(table.find(5, |&v| v == 5), Some(&5));
    }

    #[test]
    fn test_shrink_to_fit_with_items() {
        let mut table: RobinHoodTable<u64> = RobinHoodTable::with_capacity(1_000);
        for k in 0..10u64 {
            table.insert_multi(k, k);
        }

        table.shrink_to_fit();
        assert_eq!(table.table_size(), 16);
        for k in 0..10u64 {
            assert_eq!(table.find(k, |&v| v == k), Some(&k));
        }
    }

    #[test]
    fn swap_tables() {
        let mut a: RobinHoodTable<u64> = RobinHoodTable::new();
        let mut b: RobinHoodTable<u64> = RobinHoodTable::new();
        a.insert_multi(1, 1);
        b.insert_multi(2, 2);
        b.insert_multi(3, 3);

        a.swap(&mut b);
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 1);
        assert_eq!(b.find(1, |&v| v == 1), Some(&1));
    }

    #[test]
    fn values_are_dropped() {
        use std::rc::Rc;

        let tracker = Rc::new(());
        {
            let mut table: RobinHoodTable<Rc<()>> = RobinHoodTable::new();
            for k in 0..50u64 {
                table.insert_multi(k, Rc::clone(&tracker));
            }
            let removed = table.remove(3, |_| true);
            assert!(removed.is_some());
            assert_eq!(Rc::strong_count(&tracker), 51);
            drop(removed);
            assert_eq!(Rc::strong_count(&tracker), 50);
        }
        assert_eq!(Rc::strong_count(&tracker), 1);
    }

    #[test]
    fn string_keys() {
        let state = HashState::default();
        let hash_str = |s: &str| {
            let mut h = state.build_hasher();
            h.write(s.as_bytes());
            h.finish()
        };

        let mut table: RobinHoodTable<(String, usize)> = RobinHoodTable::new();
        let words = vec!["alpha", "beta", "gamma", "delta", "epsilon"];
        for (i, w) in words.iter().enumerate() {
            table.entry(hash_str(w), |(k, _)| k == w).or_insert((w.to_string(), i));
        }

        for (i, w) in words.iter().enumerate() {
            assert_eq!(table.find(hash_str(w), |(k, _)| k == w).map(|(_, n)| *n), Some(i));
        }
        assert!(table.find(hash_str("zeta"), |(k, _)| k == "zeta").is_none());
    }

    #[test]
    fn histogram_output() {
        let state = HashState::default();
        let mut table: RobinHoodTable<Item> = RobinHoodTable::new();
        for k in 0..500u64 {
            table.insert_multi(hash_key(&state, k), Item { key: k, value: 0 });
        }

        let hist = table.probe_histogram();
        assert_eq!(hist.iter().sum::<usize>(), 500);
        let stats = table.debug_stats();
        assert_eq!(stats.max_probe_distance, hist.len() - 1);
        assert!(stats.mean_probe_distance >= 0.0);
        #[cfg(feature = "std")]
        stats.print();
    }
}
