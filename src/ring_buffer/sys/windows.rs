use std::io;
use std::ptr;
use std::ptr::NonNull;
use std::sync::OnceLock;

use windows_sys::Win32::Foundation::CloseHandle;
use windows_sys::Win32::Foundation::HANDLE;
use windows_sys::Win32::Foundation::INVALID_HANDLE_VALUE;
use windows_sys::Win32::System::Memory::CreateFileMappingW;
use windows_sys::Win32::System::Memory::FILE_MAP_ALL_ACCESS;
use windows_sys::Win32::System::Memory::MEM_RELEASE;
use windows_sys::Win32::System::Memory::MEM_RESERVE;
use windows_sys::Win32::System::Memory::MEMORY_MAPPED_VIEW_ADDRESS;
use windows_sys::Win32::System::Memory::MapViewOfFileEx;
use windows_sys::Win32::System::Memory::PAGE_NOACCESS;
use windows_sys::Win32::System::Memory::PAGE_READWRITE;
use windows_sys::Win32::System::Memory::UnmapViewOfFile;
use windows_sys::Win32::System::Memory::VirtualAlloc;
use windows_sys::Win32::System::Memory::VirtualFree;
use windows_sys::Win32::System::SystemInformation::GetSystemInfo;
use windows_sys::Win32::System::SystemInformation::SYSTEM_INFO;

use crate::error::MapError;

/// Attempts at finding a free range before giving up. Another thread may
/// claim the range between releasing the probe reservation and mapping the
/// views, in which case the search starts over.
const MAX_ATTEMPTS: usize = 16;

/// Views must start on an allocation granularity boundary, which is coarser
/// than the page size.
pub(super) fn granularity() -> usize {
    static GRANULARITY: OnceLock<usize> = OnceLock::new();
    *GRANULARITY.get_or_init(|| {
        // SAFETY: GetSystemInfo fills the provided struct.
        let info = unsafe {
            let mut info: SYSTEM_INFO = std::mem::zeroed();
            GetSystemInfo(&mut info);
            info
        };
        info.dwAllocationGranularity as usize
    })
}

pub(super) fn map_mirror(size: usize) -> Result<NonNull<u8>, MapError> {
    let size64 = size as u64;
    // SAFETY: Pagefile-backed section with default security and no name.
    let section = unsafe {
        CreateFileMappingW(
            INVALID_HANDLE_VALUE,
            ptr::null(),
            PAGE_READWRITE,
            (size64 >> 32) as u32,
            size64 as u32,
            ptr::null(),
        )
    };
    if section.is_null() {
        return Err(MapError::Create(io::Error::last_os_error()));
    }

    let result = place_views(section, size);

    // SAFETY: The views keep the section alive on their own.
    unsafe { CloseHandle(section) };
    result
}

fn place_views(section: HANDLE, size: usize) -> Result<NonNull<u8>, MapError> {
    for attempt in 0..MAX_ATTEMPTS {
        if attempt > 0 {
            log::debug!("ring buffer view placement retry {attempt} of {MAX_ATTEMPTS}");
        }

        // SAFETY: Probe reservation with no fixed address.
        let hint = unsafe { VirtualAlloc(ptr::null(), 2 * size, MEM_RESERVE, PAGE_NOACCESS) };
        if hint.is_null() {
            return Err(MapError::Map(io::Error::last_os_error()));
        }
        // SAFETY: Releases the probe reservation made above.
        unsafe { VirtualFree(hint, 0, MEM_RELEASE) };

        let hint = hint.cast::<u8>();
        // SAFETY: Maps the section at the released range; failure is
        // reported through a null address.
        let lower = unsafe { map_view(section, size, hint) };
        if lower.is_null() {
            log::trace!("ring buffer lower view at {hint:p} was taken");
            continue;
        }

        // SAFETY: As above, directly after the lower view.
        let upper = unsafe { map_view(section, size, hint.wrapping_add(size)) };
        if upper.is_null() {
            log::trace!("ring buffer upper view at {:p} was taken", hint.wrapping_add(size));
            // SAFETY: `lower` was mapped above.
            unsafe { unmap_view(lower) };
            continue;
        }

        // SAFETY: Checked non-null above.
        return Ok(unsafe { NonNull::new_unchecked(lower) });
    }

    Err(MapError::AddressSearchExhausted)
}

unsafe fn map_view(section: HANDLE, size: usize, at: *mut u8) -> *mut u8 {
    // SAFETY: Guaranteed by the caller.
    let view = unsafe { MapViewOfFileEx(section, FILE_MAP_ALL_ACCESS, 0, 0, size, at.cast()) };
    view.Value.cast()
}

unsafe fn unmap_view(at: *mut u8) {
    // SAFETY: Guaranteed by the caller.
    unsafe { UnmapViewOfFile(MEMORY_MAPPED_VIEW_ADDRESS { Value: at.cast() }) };
}

/// # Safety
///
/// `base` and `size` must come from a successful [`map_mirror`] call that has
/// not been released yet.
pub(super) unsafe fn unmap_mirror(base: NonNull<u8>, size: usize) {
    // SAFETY: Guaranteed by the caller.
    unsafe {
        unmap_view(base.as_ptr());
        unmap_view(base.as_ptr().add(size));
    }
}
