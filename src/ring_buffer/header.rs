//! The 8-byte header in front of every ring buffer record.

use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

/// Set once the record's payload may be read.
pub(super) const COMMITTED: u32 = 1;

/// Marks filler that exists only to align the following record. Padding
/// records are always committed and are skipped by readers.
pub(super) const PADDING: u32 = 2;

const FLAGS: u32 = COMMITTED | PADDING;

/// Size of [`Header`], and the granularity of every record length.
pub(super) const HEADER_SIZE: usize = core::mem::size_of::<Header>();

const _: () = assert!(HEADER_SIZE == 8);

#[repr(C)]
pub(super) struct Header {
    /// Payload length rounded up to [`HEADER_SIZE`], or'ed with the flag
    /// bits.
    bytes: AtomicU32,
    /// Payload length as requested by the producer.
    requested: u32,
}

/// A snapshot of [`Header::bytes`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) struct State(pub(super) u32);

impl State {
    pub(super) fn is_committed(self) -> bool {
        self.0 & COMMITTED != 0
    }

    pub(super) fn is_padding(self) -> bool {
        self.0 & PADDING != 0
    }

    /// Padded payload length, excluding the header itself.
    pub(super) fn len(self) -> usize {
        (self.0 & !FLAGS) as usize
    }

    /// Distance from this header to the next one.
    pub(super) fn stride(self) -> usize {
        HEADER_SIZE + self.len()
    }
}

impl Header {
    /// Writes a header for `padded` bytes of payload at `at`.
    ///
    /// # Safety
    ///
    /// `at` must be aligned for `Header`, lie inside the mapping, and not be
    /// visible to any reader yet.
    pub(super) unsafe fn write<'a>(at: *mut u8, padded: u32, requested: u32, flags: u32) -> &'a Self {
        debug_assert_eq!(padded & FLAGS, 0);
        debug_assert_eq!(at as usize % core::mem::align_of::<Header>(), 0);

        let header = at.cast::<Header>();
        // SAFETY: Guaranteed by the caller.
        unsafe {
            header.write(Header {
                bytes: AtomicU32::new(padded | flags),
                requested,
            });
            &*header
        }
    }

    /// # Safety
    ///
    /// `at` must point at a header that was published through `write_tail`.
    pub(super) unsafe fn at<'a>(at: *const u8) -> &'a Self {
        // SAFETY: Guaranteed by the caller.
        unsafe { &*at.cast::<Header>() }
    }

    pub(super) fn state(&self) -> State {
        State(self.bytes.load(Ordering::SeqCst))
    }

    pub(super) fn requested(&self) -> usize {
        self.requested as usize
    }

    /// Marks the record readable, returning the state it had before.
    pub(super) fn publish(&self, flags: u32) -> State {
        State(self.bytes.fetch_or(flags, Ordering::SeqCst))
    }

    pub(super) fn word(&self) -> &AtomicU32 {
        &self.bytes
    }
}
