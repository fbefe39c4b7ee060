//! Platform mapping of one physical buffer at two adjacent virtual ranges.

#[cfg(unix)]
mod unix;

#[cfg(windows)]
mod windows;

use std::ptr::NonNull;

#[cfg(unix)]
use unix::granularity;
#[cfg(unix)]
use unix::map_mirror;
#[cfg(unix)]
use unix::unmap_mirror;
#[cfg(windows)]
use windows::granularity;
#[cfg(windows)]
use windows::map_mirror;
#[cfg(windows)]
use windows::unmap_mirror;

use crate::error::MapError;

#[cfg(not(any(unix, windows)))]
compile_error!("the `ring-buffer` feature requires a unix or windows target");

/// `size` bytes of shared memory, visible at both `[base, base + size)` and
/// `[base + size, base + 2 * size)`. Unmapped on drop.
pub(super) struct Mirror {
    base: NonNull<u8>,
    size: usize,
}

// SAFETY: The mapping is plain memory owned by this value; all concurrent
// access to its contents is mediated by the ring buffer's atomics.
unsafe impl Send for Mirror {}
// SAFETY: See above.
unsafe impl Sync for Mirror {}

impl Mirror {
    /// Maps at least `requested` bytes. The mapped size is the next power of
    /// two that is also a multiple of the platform's mapping granularity.
    pub(super) fn new(requested: usize) -> Result<Self, MapError> {
        let size = requested
            .max(granularity())
            .checked_next_power_of_two()
            .filter(|size| size.checked_mul(2).is_some_and(|s| s <= isize::MAX as usize))
            .filter(|size| *size <= u32::MAX as usize)
            .ok_or(MapError::TooLarge { requested })?;

        let base = map_mirror(size)?;
        log::debug!(
            "mapped ring buffer: requested {requested} bytes, mapped {size} bytes twice at {:p}",
            base
        );

        Ok(Self { base, size })
    }

    #[inline(always)]
    pub(super) fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    #[inline(always)]
    pub(super) fn size(&self) -> usize {
        self.size
    }
}

impl Drop for Mirror {
    fn drop(&mut self) {
        // SAFETY: `base` and `size` describe a live mapping produced by
        // `map_mirror`, released exactly once here.
        unsafe { unmap_mirror(self.base, self.size) };
    }
}
