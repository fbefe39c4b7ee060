//! A lock-free byte ring buffer for variable-length records.
//!
//! The backing memory is mapped twice at adjacent addresses, so a record that
//! runs past the physical end of the buffer is still one contiguous slice.
//!
//! Producers reserve space with [`RingBuffer::alloc`] or
//! [`RingBuffer::alloc_wait`], fill the returned [`Reservation`] and
//! [`commit`](Reservation::commit) it. Reservations are granted and published
//! in the same order, so records are read back first-in first-out. Any number
//! of threads may produce. [`read`](RingBuffer::read),
//! [`peek`](RingBuffer::peek) and [`read_all`](RingBuffer::read_all) assume a
//! single consumer and panic if they detect a second one;
//! [`read_copy`](RingBuffer::read_copy) may be called from many threads.
//!
//! Requires the `ring-buffer` feature.
//!
//! # Examples
//!
//! ```rust
//! use robin_ring::RingBuffer;
//!
//! let ring = RingBuffer::new(4096);
//!
//! let mut record = ring.alloc(5, 1).unwrap();
//! record.copy_from_slice(b"hello");
//! record.commit();
//!
//! assert_eq!(ring.read(|bytes| bytes.to_vec()), Some(b"hello".to_vec()));
//! assert_eq!(ring.read(|bytes| bytes.len()), None);
//! ```

mod header;
mod sys;
mod wait;

use core::fmt::Debug;
use core::mem::MaybeUninit;
use core::ptr::NonNull;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use crossbeam_utils::Backoff;
use crossbeam_utils::CachePadded;
use header::COMMITTED;
use header::HEADER_SIZE;
use header::Header;
use header::PADDING;
use sys::Mirror;
use wait::Event;
use wait::wait_on;
use wait::wake_all;

pub use crate::error::MapError;

/// Every payload handed out by [`RingBuffer::alloc`] is aligned to at least
/// this many bytes.
pub const MIN_ALIGNMENT: usize = core::mem::size_of::<usize>();

/// The largest alignment [`RingBuffer::alloc`] accepts.
pub const MAX_ALIGNMENT: usize = 4096;

// Records are laid out in header-sized granules, which covers `MIN_ALIGNMENT`.
const _: () = assert!(HEADER_SIZE % MIN_ALIGNMENT == 0);

/// A multi-producer byte queue over a mirrored memory mapping.
///
/// See the [module documentation](self) for the threading contract.
pub struct RingBuffer {
    mirror: Mirror,
    mask: usize,
    read_ptr: CachePadded<AtomicUsize>,
    write_head: CachePadded<AtomicUsize>,
    write_tail: CachePadded<AtomicUsize>,
    /// Signalled whenever `read_ptr` moves.
    read_event: Event,
    /// Signalled whenever `write_tail` moves.
    tail_event: Event,
    /// Threads sleeping on an uncommitted header.
    commit_waiters: AtomicU32,
}

/// Where records are placed within the ring.
struct Placement {
    /// Cursor value at the start of the reserved region.
    start: usize,
    /// Bytes reserved, including headers and alignment filler.
    needed: usize,
    /// Alignment filler in front of the record header.
    padding: usize,
}

impl RingBuffer {
    /// Maps a ring buffer holding at least `size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if the mapping cannot be created. Use [`try_new`](Self::try_new)
    /// to handle that case.
    pub fn new(size: usize) -> Self {
        match Self::try_new(size) {
            Ok(ring) => ring,
            Err(err) => {
                log::error!("failed to create a {size} byte ring buffer: {err}");
                panic!("failed to create a {size} byte ring buffer: {err}");
            }
        }
    }

    /// Maps a ring buffer holding at least `size` bytes.
    ///
    /// The size is rounded up to a power of two that is a multiple of the
    /// platform's page size (allocation granularity on Windows).
    pub fn try_new(size: usize) -> Result<Self, MapError> {
        let mirror = Mirror::new(size)?;
        let size = mirror.size();
        let start = initial_cursor(size);

        Ok(Self {
            mirror,
            mask: size - 1,
            read_ptr: CachePadded::new(AtomicUsize::new(start)),
            write_head: CachePadded::new(AtomicUsize::new(start)),
            write_tail: CachePadded::new(AtomicUsize::new(start)),
            read_event: Event::new(),
            tail_event: Event::new(),
            commit_waiters: AtomicU32::new(0),
        })
    }

    /// Size of the mapped storage in bytes. Record headers use part of it.
    pub fn capacity(&self) -> usize {
        self.mirror.size()
    }

    /// Bytes currently published and not yet consumed. Other threads may
    /// change this at any moment.
    pub fn approx_used(&self) -> usize {
        let tail = self.write_tail.load(Ordering::Relaxed);
        let read = self.read_ptr.load(Ordering::Relaxed);
        let diff = tail.wrapping_sub(read) as isize;
        diff.clamp(0, self.capacity() as isize) as usize
    }

    /// `capacity() - approx_used()`.
    pub fn approx_available(&self) -> usize {
        self.capacity() - self.approx_used()
    }

    /// Returns `true` if `ptr` points into either view of the mapping.
    pub fn is_owned(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        addr.wrapping_sub(self.mirror.base() as usize) < 2 * self.capacity()
    }

    /// Reserves `bytes` bytes aligned to `align`.
    ///
    /// Returns `None` if the buffer is too full, if `bytes` is zero, if
    /// `bytes + align` exceeds the usable capacity, or if `align` is not a
    /// power of two no greater than [`MAX_ALIGNMENT`].
    ///
    /// The record becomes readable once the reservation is committed. Later
    /// records are held back until then.
    pub fn alloc(&self, bytes: usize, align: usize) -> Option<Reservation<'_>> {
        let (padded, align) = self.check_request(bytes, align)?;
        let base_needed = padded + HEADER_SIZE;

        let backoff = Backoff::new();
        let mut head = self.write_head.load(Ordering::Acquire);
        let mut read = self.read_ptr.load(Ordering::Acquire);
        let placement = loop {
            let padding = self.padding_at(head, align);
            let needed = base_needed + padding;

            let free = self.capacity().wrapping_sub(head.wrapping_sub(read));
            if needed as isize > free as isize {
                return None;
            }

            match self.write_head.compare_exchange_weak(
                head,
                head.wrapping_add(needed),
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    break Placement {
                        start: head,
                        needed,
                        padding,
                    };
                }
                Err(current) => {
                    head = current;
                    read = self.read_ptr.load(Ordering::Acquire);
                    backoff.spin();
                }
            }
        };

        // SAFETY: The region was reserved above and is not visible to readers.
        Some(unsafe { self.publish_reservation(placement, padded, bytes) })
    }

    /// Reserves `bytes` bytes aligned to `align`, waiting for consumers to
    /// free space when the buffer is full.
    ///
    /// `on_wait` is called once, before blocking, if space is not immediately
    /// available. Returns `None` only for requests [`alloc`](Self::alloc)
    /// could never satisfy.
    ///
    /// A thread that both produces and consumes will block forever if it
    /// waits on its own ring.
    pub fn alloc_wait(
        &self,
        bytes: usize,
        align: usize,
        on_wait: impl FnOnce(),
    ) -> Option<Reservation<'_>> {
        let (padded, align) = self.check_request(bytes, align)?;
        let base_needed = padded + HEADER_SIZE;

        let placement = if align == HEADER_SIZE {
            let start = self.write_head.fetch_add(base_needed, Ordering::Acquire);
            Placement {
                start,
                needed: base_needed,
                padding: 0,
            }
        } else {
            let backoff = Backoff::new();
            let mut head = self.write_head.load(Ordering::Acquire);
            loop {
                let padding = self.padding_at(head, align);
                let needed = base_needed + padding;
                match self.write_head.compare_exchange_weak(
                    head,
                    head.wrapping_add(needed),
                    Ordering::Acquire,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        break Placement {
                            start: head,
                            needed,
                            padding,
                        };
                    }
                    Err(current) => {
                        head = current;
                        backoff.spin();
                    }
                }
            }
        };

        let end = placement.start.wrapping_add(placement.needed);
        let fits = || {
            let used = end.wrapping_sub(self.read_ptr.load(Ordering::Acquire));
            used as isize <= self.capacity() as isize
        };
        if !fits() {
            on_wait();
            self.read_event.wait_until(fits);
        }

        // SAFETY: The region was reserved above and consumers have moved past
        // it, so it is not visible to readers.
        Some(unsafe { self.publish_reservation(placement, padded, bytes) })
    }

    /// Returns the padded payload size and effective alignment of a request,
    /// or `None` if it can never be satisfied.
    fn check_request(&self, bytes: usize, align: usize) -> Option<(usize, usize)> {
        if bytes == 0 || bytes.saturating_add(align) > self.capacity() - HEADER_SIZE {
            return None;
        }
        if !align.is_power_of_two() || align > MAX_ALIGNMENT {
            return None;
        }

        let padded = bytes.next_multiple_of(HEADER_SIZE);
        Some((padded, align.max(HEADER_SIZE)))
    }

    /// Filler needed so a record header placed at cursor `pos` is followed by
    /// a payload aligned to `align`.
    fn padding_at(&self, pos: usize, align: usize) -> usize {
        let payload = self.mirror.base() as usize + (pos & self.mask) + HEADER_SIZE;
        let padding = payload.next_multiple_of(align) - payload;
        debug_assert_eq!(padding % HEADER_SIZE, 0);
        padding
    }

    /// Writes the headers for a reserved region and advances `write_tail` past
    /// it once every earlier reservation has done the same.
    ///
    /// # Safety
    ///
    /// `placement` must describe a region this thread reserved from
    /// `write_head` that no reader can reach yet.
    unsafe fn publish_reservation(
        &self,
        placement: Placement,
        padded: usize,
        requested: usize,
    ) -> Reservation<'_> {
        let Placement {
            start,
            needed,
            padding,
        } = placement;

        let position = start.wrapping_add(padding);

        // SAFETY: The reserved region belongs to this thread until
        // `write_tail` moves past it. Headers are written through the first
        // view, where readers wait on them.
        let header = unsafe {
            if padding > 0 {
                let filler = (padding - HEADER_SIZE) as u32;
                Header::write(self.slot(start), filler, filler, PADDING | COMMITTED);
            }
            Header::write(self.slot(position), padded as u32, requested as u32, 0)
        };

        self.tail_event
            .wait_until(|| self.write_tail.load(Ordering::Acquire) == start);
        self.write_tail
            .store(start.wrapping_add(needed), Ordering::Release);
        self.tail_event.notify();

        // SAFETY: The payload follows the header and may run into the second
        // view, which stays contiguous with the first.
        let data = unsafe { self.slot(start).add(padding + HEADER_SIZE) };
        Reservation {
            ring: self,
            header,
            // SAFETY: Derived from the non-null mapping base.
            data: unsafe { NonNull::new_unchecked(data) },
            len: requested,
            #[cfg(test)]
            position,
        }
    }

    /// Calls `f` with the next committed record without consuming it.
    ///
    /// Returns `None` if the buffer is empty or the next record is not
    /// committed yet. Must not race with [`read`](Self::read) or
    /// [`read_all`](Self::read_all).
    pub fn peek<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let mut read = self.read_ptr.load(Ordering::Acquire);
        let tail = self.write_tail.load(Ordering::Acquire);

        loop {
            if tail.wrapping_sub(read) as isize <= 0 {
                return None;
            }

            // SAFETY: `read` trails `write_tail`, so a published header is
            // there.
            let header = unsafe { self.header_at(read) };
            let state = header.state();
            if state.is_padding() {
                read = read.wrapping_add(state.stride());
                continue;
            }
            if !state.is_committed() {
                return None;
            }

            self.check_record(read, tail, state.stride());
            // SAFETY: Committed records are not written again until consumed.
            return Some(f(unsafe { self.payload(header) }));
        }
    }

    /// Calls `f` with the next committed record and consumes it.
    ///
    /// Returns `None` if the buffer is empty or the next record is not
    /// committed yet. Single consumer only.
    ///
    /// # Panics
    ///
    /// Panics if another thread consumed from the buffer concurrently.
    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let mut read = self.read_ptr.load(Ordering::Acquire);
        let tail = self.write_tail.load(Ordering::Acquire);

        loop {
            if tail.wrapping_sub(read) as isize <= 0 {
                return None;
            }

            // SAFETY: `read` trails `write_tail`, so a published header is
            // there.
            let header = unsafe { self.header_at(read) };
            let state = header.state();
            if state.is_padding() {
                read = self.advance_read(read, state.stride(), "read");
                continue;
            }
            if !state.is_committed() {
                return None;
            }

            self.check_record(read, tail, state.stride());
            // SAFETY: Committed records are not written again until consumed.
            let result = f(unsafe { self.payload(header) });
            self.advance_read(read, state.stride(), "read");
            return Some(result);
        }
    }

    /// Calls `f` with consecutive committed records, consuming each one for
    /// which `f` returns `true`.
    ///
    /// Stops at the first record `f` rejects (which stays in the buffer), at
    /// an uncommitted record, or when the buffer is empty. Space is released
    /// once, just before returning. Returns the number of records consumed.
    /// Single consumer only.
    ///
    /// # Panics
    ///
    /// Panics if another thread consumed from the buffer concurrently.
    pub fn read_all(&self, mut f: impl FnMut(&[u8]) -> bool) -> usize {
        let start = self.read_ptr.load(Ordering::Acquire);
        let tail = self.write_tail.load(Ordering::Acquire);

        let mut count = 0;
        let mut read = start;
        while (tail.wrapping_sub(read) as isize) > 0 {
            // SAFETY: `read` trails `write_tail`, so a published header is
            // there.
            let header = unsafe { self.header_at(read) };
            let state = header.state();
            if state.is_padding() {
                read = read.wrapping_add(state.stride());
                continue;
            }
            if !state.is_committed() {
                break;
            }

            self.check_record(read, tail, state.stride());
            // SAFETY: Committed records are not written again until consumed.
            if !f(unsafe { self.payload(header) }) {
                break;
            }

            count += 1;
            read = read.wrapping_add(state.stride());
        }

        if read != start {
            self.advance_read(start, read.wrapping_sub(start), "read_all");
        }
        count
    }

    /// Copies the next committed record into `buf` and consumes it.
    ///
    /// Returns the record's length on success, `0` if nothing is ready, or
    /// the required length without consuming anything if `buf` is too small.
    /// Safe to call from several consumers at once; with more than one, a
    /// too-small result may describe a record another thread then takes.
    pub fn read_copy(&self, buf: &mut [u8]) -> usize {
        let mut read = self.read_ptr.load(Ordering::Acquire);

        loop {
            let tail = self.write_tail.load(Ordering::Acquire);
            if tail.wrapping_sub(read) as isize <= 0 {
                return 0;
            }

            // SAFETY: `read` trailed `write_tail` when loaded. If another
            // consumer has moved on, the CAS below fails and the bytes are
            // discarded.
            let header = unsafe { self.header_at(read) };
            let state = header.state();
            let next = read.wrapping_add(state.stride());
            if state.is_padding() {
                let swapped = self
                    .read_ptr
                    .compare_exchange(read, next, Ordering::Release, Ordering::Acquire);
                match swapped {
                    Ok(_) => {
                        self.read_event.notify();
                        read = next;
                    }
                    Err(current) => read = current,
                }
                continue;
            }
            if !state.is_committed() {
                return 0;
            }
            if state.stride() > tail.wrapping_sub(read) {
                read = self.read_ptr.load(Ordering::Acquire);
                continue;
            }

            let len = header.requested();
            if len > buf.len() {
                return len;
            }

            // SAFETY: The payload lies within the mapping. A concurrent
            // consumer may release it mid-copy, which the CAS detects.
            unsafe {
                let src = self.payload_ptr(header);
                core::ptr::copy_nonoverlapping(src, buf.as_mut_ptr(), len);
            }

            let swapped = self
                .read_ptr
                .compare_exchange(read, next, Ordering::Release, Ordering::Acquire);
            match swapped {
                Ok(_) => {
                    self.read_event.notify();
                    return len;
                }
                Err(current) => read = current,
            }
        }
    }

    /// Moves `value` into the buffer.
    ///
    /// Gives the value back if there is no room for it or its alignment
    /// exceeds [`MAX_ALIGNMENT`].
    pub fn write_object<T: Send>(&self, value: T) -> Result<(), T> {
        match self.alloc(object_size::<T>(), object_align::<T>()) {
            Some(reservation) => {
                reservation.commit_object(value);
                Ok(())
            }
            None => Err(value),
        }
    }

    /// Moves `value` into the buffer, waiting for room. `on_wait` runs once
    /// before blocking.
    ///
    /// Gives the value back only if it could never fit.
    pub fn write_object_wait<T: Send>(&self, value: T, on_wait: impl FnOnce()) -> Result<(), T> {
        match self.alloc_wait(object_size::<T>(), object_align::<T>(), on_wait) {
            Some(reservation) => {
                reservation.commit_object(value);
                Ok(())
            }
            None => Err(value),
        }
    }

    /// Moves the next record out of the buffer as a `T`.
    ///
    /// # Safety
    ///
    /// The next record must have been written by
    /// [`write_object`](Self::write_object) or
    /// [`write_object_wait`](Self::write_object_wait) with the same `T`.
    pub unsafe fn read_object<T>(&self) -> Option<T> {
        self.read(|bytes| {
            debug_assert!(bytes.len() >= core::mem::size_of::<T>());
            debug_assert!(bytes.as_ptr().cast::<T>().is_aligned());
            // SAFETY: Guaranteed by the caller. Consuming the record hands
            // ownership of the value to us.
            unsafe { bytes.as_ptr().cast::<T>().read() }
        })
    }

    /// Blocks until at least one record has been reserved and published,
    /// committed or not. May be called from several threads.
    pub fn wait_for_allocated_data(&self) {
        self.tail_event.wait_until(|| {
            let tail = self.write_tail.load(Ordering::Acquire);
            tail.wrapping_sub(self.read_ptr.load(Ordering::Acquire)) as isize > 0
        });
    }

    /// Blocks until a committed record is ready to read. Single consumer
    /// only.
    pub fn wait_for_committed_data(&self) {
        let mut read = self.read_ptr.load(Ordering::Acquire);

        loop {
            self.tail_event.wait_until(|| {
                let tail = self.write_tail.load(Ordering::Acquire);
                tail.wrapping_sub(read) as isize > 0
            });

            // SAFETY: `read` trails `write_tail`.
            let header = unsafe { self.header_at(read) };
            let state = header.state();
            if state.is_padding() {
                read = read.wrapping_add(state.stride());
                continue;
            }
            if state.is_committed() {
                return;
            }

            self.commit_waiters.fetch_add(1, Ordering::SeqCst);
            wait_on(header.word(), state.0);
            self.commit_waiters.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Consumes `stride` bytes starting at `from`, returning the new cursor.
    fn advance_read(&self, from: usize, stride: usize, op: &str) -> usize {
        let to = from.wrapping_add(stride);
        let previous = self.read_ptr.swap(to, Ordering::Release);
        if previous != from {
            panic!(
                "RingBuffer::{op} raced with another consumer; \
                 call it from one thread only or use read_copy"
            );
        }
        self.read_event.notify();
        to
    }

    fn check_record(&self, read: usize, tail: usize, stride: usize) {
        if stride > tail.wrapping_sub(read) {
            panic!(
                "ring buffer record of {stride} bytes at offset {:#x} overruns the write tail",
                read & self.mask
            );
        }
    }

    fn slot(&self, pos: usize) -> *mut u8 {
        // SAFETY: The masked offset is within the first view.
        unsafe { self.mirror.base().add(pos & self.mask) }
    }

    /// # Safety
    ///
    /// A header must have been published at `pos`.
    unsafe fn header_at(&self, pos: usize) -> &Header {
        // SAFETY: Guaranteed by the caller.
        unsafe { Header::at(self.slot(pos)) }
    }

    fn payload_ptr(&self, header: &Header) -> *const u8 {
        // SAFETY: The payload directly follows its header and stays within
        // the second view.
        unsafe { (header as *const Header).cast::<u8>().add(HEADER_SIZE) }
    }

    /// # Safety
    ///
    /// `header` must describe a committed record that is not consumed while
    /// the returned slice is alive.
    unsafe fn payload<'a>(&'a self, header: &'a Header) -> &'a [u8] {
        // SAFETY: Guaranteed by the caller.
        unsafe { core::slice::from_raw_parts(self.payload_ptr(header), header.requested()) }
    }

    /// Wakes consumers in [`wait_for_committed_data`](Self::wait_for_committed_data)
    /// after a header changed state.
    fn wake_commit_waiters(&self, header: &Header) {
        if self.commit_waiters.load(Ordering::SeqCst) != 0 {
            wake_all(header.word());
        }
    }
}

impl Debug for RingBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("base", &self.mirror.base())
            .field("capacity", &self.capacity())
            .field("used", &self.approx_used())
            .finish()
    }
}

impl Drop for RingBuffer {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert_eq!(self.approx_used(), 0, "ring buffer dropped with unread records");
        }
    }
}

/// Cursor start value. Debug builds start just below the wrap-around point so
/// counter rollover is exercised early.
fn initial_cursor(size: usize) -> usize {
    if cfg!(debug_assertions) {
        0usize.wrapping_sub(size)
    } else {
        0
    }
}

fn object_size<T>() -> usize {
    core::mem::size_of::<T>().max(1)
}

fn object_align<T>() -> usize {
    core::mem::align_of::<T>().max(MIN_ALIGNMENT)
}

/// Space reserved by [`RingBuffer::alloc`] or [`RingBuffer::alloc_wait`].
///
/// The record is published to readers by [`commit`](Self::commit). Dropping
/// the reservation instead turns it into filler that readers skip.
pub struct Reservation<'a> {
    ring: &'a RingBuffer,
    header: &'a Header,
    data: NonNull<u8>,
    len: usize,
    #[cfg(test)]
    position: usize,
}

impl Reservation<'_> {
    /// Cursor of this record's header.
    #[cfg(test)]
    fn position(&self) -> usize {
        self.position
    }

    #[cfg(test)]
    fn header_ptr(&self) -> *const u8 {
        (self.header as *const Header).cast()
    }

    /// Number of bytes requested.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always `false`; zero-sized reservations are never granted.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Pointer to the payload, aligned as requested.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.data.as_ptr()
    }

    /// The payload as uninitialized bytes.
    pub fn as_uninit_mut(&mut self) -> &mut [MaybeUninit<u8>] {
        // SAFETY: The payload is `len` bytes of mapped memory owned by this
        // reservation until it is committed or dropped.
        unsafe { core::slice::from_raw_parts_mut(self.data.as_ptr().cast(), self.len) }
    }

    /// Copies `src` into the payload.
    ///
    /// # Panics
    ///
    /// Panics if `src.len()` differs from [`len`](Self::len).
    pub fn copy_from_slice(&mut self, src: &[u8]) {
        assert_eq!(
            src.len(),
            self.len,
            "source slice length does not match the reservation"
        );
        // SAFETY: Both ranges are `len` bytes and do not overlap.
        unsafe { core::ptr::copy_nonoverlapping(src.as_ptr(), self.data.as_ptr(), self.len) };
    }

    /// Makes the record visible to readers.
    pub fn commit(self) {
        self.finish(COMMITTED);
    }

    fn commit_object<T>(mut self, value: T) {
        // SAFETY: The payload is sized and aligned for `T`.
        unsafe { self.as_mut_ptr().cast::<T>().write(value) };
        self.commit();
    }

    fn finish(self, flags: u32) {
        let previous = self.header.publish(flags);
        debug_assert!(!previous.is_committed(), "record committed twice");
        self.ring.wake_commit_waiters(self.header);
        core::mem::forget(self);
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let previous = self.header.publish(PADDING | COMMITTED);
        debug_assert!(!previous.is_committed(), "record committed twice");
        self.ring.wake_commit_waiters(self.header);
    }
}

impl Debug for Reservation<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Reservation")
            .field("data", &self.data)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicBool;

    use rand::Rng;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    fn read_u64(ring: &RingBuffer) -> Option<u64> {
        // SAFETY: Every record in these tests is written as a `u64`.
        unsafe { ring.read_object::<u64>() }
    }

    fn drain(ring: &RingBuffer) {
        while ring.read(|_| ()).is_some() {}
        assert_eq!(ring.approx_used(), 0);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn objects_come_back_in_order() {
        let ring = RingBuffer::new(4096);
        for i in 0..100u64 {
            ring.write_object(i * 3).unwrap();
        }
        for i in 0..100u64 {
            assert_eq!(read_u64(&ring), Some(i * 3));
        }
        assert_eq!(read_u64(&ring), None);
        assert_eq!(ring.approx_used(), 0);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn owned_values_move_through() {
        let ring = RingBuffer::new(4096);
        ring.write_object(String::from("first")).unwrap();
        ring.write_object(vec![1u8, 2, 3]).unwrap();

        // SAFETY: Types match the writes above.
        unsafe {
            assert_eq!(ring.read_object::<String>().as_deref(), Some("first"));
            assert_eq!(ring.read_object::<Vec<u8>>(), Some(vec![1, 2, 3]));
        }
        assert_eq!(ring.approx_used(), 0);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn capacity_boundary() {
        for size in [1, 4096, 65536] {
            let ring = RingBuffer::new(size);
            let cap = ring.capacity();
            assert!(cap.is_power_of_two());
            assert!(cap >= size);

            assert!(ring.alloc(cap, 1).is_none());
            assert!(ring.alloc(cap - HEADER_SIZE, 1).is_none());
            assert!(ring.alloc(cap - HEADER_SIZE - MIN_ALIGNMENT + 1, MIN_ALIGNMENT).is_none());
            assert!(ring.alloc(usize::MAX, 1).is_none());

            let largest = cap - HEADER_SIZE - MIN_ALIGNMENT;
            let mut reservation = ring.alloc(largest, MIN_ALIGNMENT).unwrap();
            assert_eq!(reservation.len(), largest);
            reservation.as_uninit_mut().fill(MaybeUninit::new(0x5A));
            reservation.commit();

            assert!(ring.alloc(1, 1).is_none());
            assert_eq!(
                ring.read(|bytes| bytes.iter().all(|&b| b == 0x5A)),
                Some(true)
            );
            drain(&ring);
        }
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn rejects_invalid_requests() {
        let ring = RingBuffer::new(4096);
        assert!(ring.alloc(0, 8).is_none());
        assert!(ring.alloc(8, 0).is_none());
        assert!(ring.alloc(8, 3).is_none());
        assert!(ring.alloc(8, MAX_ALIGNMENT * 2).is_none());
        assert!(ring.alloc_wait(0, 8, || panic!("should not wait")).is_none());
        assert_eq!(ring.approx_used(), 0);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn full_buffer_rejects_then_recovers() {
        let ring = RingBuffer::new(1);
        let per_record = HEADER_SIZE + 8;
        let fits = ring.capacity() / per_record;

        for i in 0..fits as u64 {
            ring.write_object(i).unwrap();
        }
        assert_eq!(ring.write_object(99u64), Err(99));
        assert_eq!(ring.approx_available(), ring.capacity() - fits * per_record);

        assert_eq!(read_u64(&ring), Some(0));
        ring.write_object(99u64).unwrap();
        for i in 1..fits as u64 {
            assert_eq!(read_u64(&ring), Some(i));
        }
        assert_eq!(read_u64(&ring), Some(99));
        assert_eq!(ring.approx_used(), 0);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn records_straddling_the_end_are_contiguous() {
        let ring = RingBuffer::new(1);
        let mut rng = SmallRng::seed_from_u64(7);

        let mut written = 0usize;
        for round in 0..4_000usize {
            let len = rng.random_range(1..=300);
            let mut reservation = ring.alloc(len, 1).unwrap();
            let start = reservation.as_mut_ptr() as usize;
            for (i, byte) in reservation.as_uninit_mut().iter_mut().enumerate() {
                byte.write((round + i) as u8);
            }
            reservation.commit();
            written += len;

            let ok = ring.read(|bytes| {
                assert_eq!(bytes.as_ptr() as usize, start);
                bytes.len() == len && bytes.iter().enumerate().all(|(i, &b)| b == (round + i) as u8)
            });
            assert_eq!(ok, Some(true));
        }

        assert!(written > 4 * ring.capacity());
        assert_eq!(ring.approx_used(), 0);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn interleaved_small_records_wrap() {
        let ring = RingBuffer::new(1);
        let mut next_write = 0u32;
        let mut next_read = 0u32;

        while next_read < 10_000 {
            while next_write - next_read < 3 {
                let bytes = next_write.to_le_bytes();
                let mut reservation = ring.alloc(3, 1).unwrap();
                reservation.copy_from_slice(&bytes[..3]);
                reservation.commit();
                next_write += 1;
            }

            let got = ring.read(|bytes| u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]));
            assert_eq!(got, Some(next_read & 0xFF_FFFF));
            next_read += 1;
        }

        drain(&ring);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn dropped_reservation_is_skipped() {
        let ring = RingBuffer::new(4096);
        let reservation = ring.alloc(40, 8).unwrap();
        ring.write_object(7u64).unwrap();

        assert_eq!(ring.peek(|_| ()), None);
        drop(reservation);

        assert_eq!(ring.peek(|bytes| bytes.len()), Some(8));
        assert_eq!(read_u64(&ring), Some(7));
        assert_eq!(read_u64(&ring), None);

        let abandoned = ring.alloc(16, 8).unwrap();
        drop(abandoned);
        assert_eq!(read_u64(&ring), None);
        assert_eq!(ring.approx_used(), 0);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn uncommitted_record_holds_back_later_ones() {
        let ring = RingBuffer::new(4096);
        let mut first = ring.alloc(4, 1).unwrap();
        ring.write_object(2u64).unwrap();

        assert_eq!(ring.read(|_| ()), None);
        assert_eq!(ring.read_all(|_| true), 0);

        first.copy_from_slice(b"one!");
        first.commit();

        assert_eq!(ring.read(|bytes| bytes.to_vec()), Some(b"one!".to_vec()));
        assert_eq!(read_u64(&ring), Some(2));
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn peek_does_not_consume() {
        let ring = RingBuffer::new(4096);
        ring.write_object(11u64).unwrap();

        let peek = || ring.peek(|bytes| u64::from_ne_bytes(bytes.try_into().unwrap()));
        assert_eq!(peek(), Some(11));
        assert_eq!(peek(), Some(11));
        assert_eq!(read_u64(&ring), Some(11));
        assert_eq!(peek(), None);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn read_all_stops_where_told() {
        let ring = RingBuffer::new(4096);
        for i in 0..5u64 {
            ring.write_object(i).unwrap();
        }

        let mut seen = Vec::new();
        let consumed = ring.read_all(|bytes| {
            let v = u64::from_ne_bytes(bytes.try_into().unwrap());
            if v == 2 {
                return false;
            }
            seen.push(v);
            true
        });
        assert_eq!(consumed, 2);
        assert_eq!(seen, [0, 1]);

        assert_eq!(ring.read_all(|_| true), 3);
        assert_eq!(ring.read_all(|_| true), 0);
        assert_eq!(ring.approx_used(), 0);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn read_copy_reports_required_size() {
        let ring = RingBuffer::new(4096);
        let mut reservation = ring.alloc(13, 1).unwrap();
        reservation.copy_from_slice(b"thirteen byte");
        reservation.commit();

        let mut small = [0u8; 4];
        assert_eq!(ring.read_copy(&mut small), 13);
        assert_eq!(ring.read_copy(&mut []), 13);

        let mut big = [0u8; 32];
        assert_eq!(ring.read_copy(&mut big), 13);
        assert_eq!(&big[..13], b"thirteen byte");
        assert_eq!(ring.read_copy(&mut big), 0);
        assert_eq!(ring.approx_used(), 0);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn aligned_allocations() {
        let ring = RingBuffer::new(1 << 16);
        for align in [1, 8, 16, 64, 256, MAX_ALIGNMENT] {
            let mut reservation = ring.alloc(24, align).unwrap();
            let ptr = reservation.as_mut_ptr();
            assert_eq!(ptr as usize % align.max(MIN_ALIGNMENT), 0);
            assert!(ring.is_owned(ptr));
            reservation.as_uninit_mut().fill(MaybeUninit::new(align as u8));
            reservation.commit();
        }

        for align in [1, 8, 16, 64, 256, MAX_ALIGNMENT] {
            assert_eq!(
                ring.read(|bytes| bytes == [align as u8; 24]),
                Some(true)
            );
        }
        drain(&ring);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn ownership_checks() {
        let ring = RingBuffer::new(4096);
        let local = 0u64;
        assert!(!ring.is_owned((&local as *const u64).cast()));
        assert!(!ring.is_owned(core::ptr::null()));

        let mut reservation = ring.alloc(8, 8).unwrap();
        assert!(ring.is_owned(reservation.as_mut_ptr()));
        drop(reservation);
        drain(&ring);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn overaligned_objects_are_returned() {
        #[repr(align(8192))]
        struct Huge(#[allow(dead_code)] u8);

        let ring = RingBuffer::new(1 << 16);
        assert!(ring.write_object(Huge(1)).is_err());
        assert_eq!(ring.approx_used(), 0);
    }

    #[test]
    fn oversized_ring_is_an_error() {
        assert!(matches!(
            RingBuffer::try_new(usize::MAX),
            Err(MapError::TooLarge { .. })
        ));
    }

    #[test]
    fn ring_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RingBuffer>();
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn alloc_wait_blocks_until_consumed() {
        let ring = RingBuffer::new(1);
        let total = 4 * ring.capacity() as u64 / 16;
        let waits = AtomicUsize::new(0);

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..total {
                    ring.write_object_wait(i, || {
                        waits.fetch_add(1, Ordering::Relaxed);
                    })
                    .unwrap();
                }
            });

            while waits.load(Ordering::Relaxed) == 0 {
                std::thread::yield_now();
            }

            for i in 0..total {
                ring.wait_for_committed_data();
                assert_eq!(read_u64(&ring), Some(i));
            }
        });

        assert!(waits.load(Ordering::Relaxed) > 0);
        assert_eq!(ring.approx_used(), 0);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn concurrent_producers_keep_per_thread_order() {
        const PRODUCERS: u32 = 4;
        const PER_PRODUCER: u32 = 5_000;

        #[repr(C)]
        struct Tagged {
            id: u32,
            seq: u32,
        }

        let ring = Arc::new(RingBuffer::new(1 << 14));

        std::thread::scope(|s| {
            for id in 0..PRODUCERS {
                let ring = Arc::clone(&ring);
                s.spawn(move || {
                    for seq in 0..PER_PRODUCER {
                        if seq % 3 == 0 {
                            let mut reservation = ring.alloc_wait(8, 64, || {}).unwrap();
                            let mut bytes = [0u8; 8];
                            bytes[..4].copy_from_slice(&id.to_ne_bytes());
                            bytes[4..].copy_from_slice(&seq.to_ne_bytes());
                            reservation.copy_from_slice(&bytes);
                            reservation.commit();
                        } else {
                            if ring.write_object_wait(Tagged { id, seq }, || {}).is_err() {
                                panic!("tagged record never fits");
                            }
                        }
                    }
                });
            }

            let mut next = [0u32; PRODUCERS as usize];
            for _ in 0..PRODUCERS * PER_PRODUCER {
                ring.wait_for_committed_data();
                let (id, seq) = ring
                    .read(|bytes| {
                        let id = u32::from_ne_bytes(bytes[..4].try_into().unwrap());
                        let seq = u32::from_ne_bytes(bytes[4..8].try_into().unwrap());
                        (id, seq)
                    })
                    .unwrap();
                assert_eq!(seq, next[id as usize]);
                next[id as usize] += 1;
            }
            assert!(next.iter().all(|&n| n == PER_PRODUCER));
        });

        drain(&ring);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn records_are_read_in_reservation_order() {
        const PRODUCERS: u64 = 4;
        const PER_PRODUCER: u64 = 5_000;

        let ring = RingBuffer::new(1 << 13);

        std::thread::scope(|s| {
            for id in 0..PRODUCERS {
                let ring = &ring;
                s.spawn(move || {
                    for _ in 0..PER_PRODUCER {
                        let mut reservation = ring.alloc_wait(16, 8, || {}).unwrap();
                        let position = reservation.position() as u64;
                        let mut bytes = [0u8; 16];
                        bytes[..8].copy_from_slice(&position.to_ne_bytes());
                        bytes[8..].copy_from_slice(&id.to_ne_bytes());
                        reservation.copy_from_slice(&bytes);
                        reservation.commit();
                    }
                });
            }

            let mut previous: Option<usize> = None;
            let mut per_producer = [0u64; PRODUCERS as usize];
            for _ in 0..PRODUCERS * PER_PRODUCER {
                ring.wait_for_committed_data();
                let cursor = ring.read_ptr.load(Ordering::Acquire);
                let (position, id) = ring
                    .read(|bytes| {
                        let position = u64::from_ne_bytes(bytes[..8].try_into().unwrap());
                        let id = u64::from_ne_bytes(bytes[8..].try_into().unwrap());
                        (position as usize, id)
                    })
                    .unwrap();

                assert_eq!(position, cursor);
                if let Some(previous) = previous {
                    assert!(
                        position.wrapping_sub(previous) as isize > 0,
                        "record reserved at {position:#x} read after {previous:#x}"
                    );
                }
                previous = Some(position);
                per_producer[id as usize] += 1;
            }
            assert!(per_producer.iter().all(|&n| n == PER_PRODUCER));
        });

        assert_eq!(ring.approx_used(), 0);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn commit_at_end_of_view_wakes_reader() {
        let ring = RingBuffer::new(4096);
        let size = ring.capacity();
        let base = ring.mirror.base() as usize;

        // Leave the cursors 24 bytes short of the end of the first view.
        let mut filler = ring.alloc(size - 32, 1).unwrap();
        filler.copy_from_slice(&vec![0u8; size - 32]);
        filler.commit();
        assert_eq!(ring.read(|bytes| bytes.len()), Some(size - 32));

        std::thread::scope(|s| {
            let reader = s.spawn(|| {
                ring.wait_for_committed_data();
                ring.read(|bytes| bytes.to_vec()).unwrap()
            });

            let mut reservation = ring.alloc(8, 64).unwrap();
            let header = reservation.header_ptr() as usize;
            assert!((base..base + size).contains(&header), "header at {header:#x}");
            assert_eq!(reservation.as_mut_ptr() as usize, base + size);

            std::thread::sleep(std::time::Duration::from_millis(10));
            reservation.copy_from_slice(&[7u8; 8]);
            reservation.commit();

            assert_eq!(reader.join().unwrap(), vec![7u8; 8]);
        });

        assert_eq!(ring.approx_used(), 0);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn read_copy_with_many_consumers() {
        const TOTAL: u64 = 20_000;

        let ring = RingBuffer::new(1 << 12);
        let done = AtomicBool::new(false);
        let seen = Mutex::new(HashSet::new());

        std::thread::scope(|s| {
            for _ in 0..3 {
                s.spawn(|| {
                    let mut local = Vec::new();
                    let mut buf = [0u8; 8];
                    loop {
                        match ring.read_copy(&mut buf) {
                            8 => local.push(u64::from_ne_bytes(buf)),
                            0 if done.load(Ordering::Acquire) && ring.approx_used() == 0 => break,
                            // Larger sizes are stale reads of a record another
                            // consumer already took.
                            _ => std::thread::yield_now(),
                        }
                    }
                    seen.lock().unwrap().extend(local);
                });
            }

            for i in 0..TOTAL {
                ring.write_object_wait(i, || {}).unwrap();
            }
            done.store(true, Ordering::Release);
        });

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), TOTAL as usize);
        assert!((0..TOTAL).all(|i| seen.contains(&i)));
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn waiting_for_allocated_data() {
        let ring = RingBuffer::new(4096);
        std::thread::scope(|s| {
            s.spawn(|| {
                std::thread::sleep(std::time::Duration::from_millis(5));
                ring.write_object(5u64).unwrap();
            });
            ring.wait_for_allocated_data();
        });
        assert_eq!(read_u64(&ring), Some(5));
    }
}
