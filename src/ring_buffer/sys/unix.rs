use std::io;
use std::ptr;
use std::ptr::NonNull;
use std::sync::OnceLock;

use crate::error::MapError;

pub(super) fn granularity() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        // SAFETY: sysconf has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 { size as usize } else { 4096 }
    })
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn create_object() -> Result<libc::c_int, MapError> {
    // SAFETY: The name is a valid NUL-terminated string.
    let fd = unsafe { libc::memfd_create(c"robin-ring".as_ptr(), libc::MFD_CLOEXEC) };
    if fd < 0 {
        return Err(MapError::Create(io::Error::last_os_error()));
    }
    Ok(fd)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn create_object() -> Result<libc::c_int, MapError> {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    static NEXT: AtomicUsize = AtomicUsize::new(0);

    let name = format!(
        "/robin-ring-{}-{}",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    );
    let c_name = std::ffi::CString::new(name)
        .map_err(|e| MapError::Create(io::Error::new(io::ErrorKind::InvalidInput, e)))?;

    // SAFETY: `c_name` is NUL-terminated. O_EXCL guarantees the object is
    // ours; it is unlinked right away so only the descriptor keeps it alive.
    let fd = unsafe {
        libc::shm_open(
            c_name.as_ptr(),
            libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
            0o600 as libc::mode_t,
        )
    };
    if fd < 0 {
        return Err(MapError::Create(io::Error::last_os_error()));
    }

    // SAFETY: As above.
    unsafe { libc::shm_unlink(c_name.as_ptr()) };
    Ok(fd)
}

/// Reserves `2 * size` bytes of address space and maps the same `size`-byte
/// shared memory object over both halves.
pub(super) fn map_mirror(size: usize) -> Result<NonNull<u8>, MapError> {
    let fd = create_object()?;
    let result = map_object(fd, size);

    // SAFETY: `fd` is open; the mappings (if any) hold their own reference.
    unsafe { libc::close(fd) };
    result
}

fn map_object(fd: libc::c_int, size: usize) -> Result<NonNull<u8>, MapError> {
    // SAFETY: ftruncate on a descriptor we own.
    if unsafe { libc::ftruncate(fd, size as libc::off_t) } < 0 {
        return Err(MapError::Resize(io::Error::last_os_error()));
    }

    // SAFETY: Anonymous reservation with no fixed address.
    let reservation = unsafe {
        libc::mmap(
            ptr::null_mut(),
            2 * size,
            libc::PROT_NONE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if reservation == libc::MAP_FAILED {
        return Err(MapError::Map(io::Error::last_os_error()));
    }

    let base = reservation.cast::<u8>();
    for half in 0..2 {
        // SAFETY: `base + half * size` lies in the reservation made above,
        // which nothing else in the process can claim, so MAP_FIXED only
        // replaces our own pages.
        let view = unsafe {
            libc::mmap(
                base.add(half * size).cast(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_FIXED,
                fd,
                0,
            )
        };

        if view == libc::MAP_FAILED {
            let err = io::Error::last_os_error();
            // SAFETY: Releases the whole reservation, including any view
            // already placed in it.
            unsafe { libc::munmap(reservation, 2 * size) };
            return Err(MapError::Map(err));
        }
    }

    // SAFETY: mmap never returns null on success.
    Ok(unsafe { NonNull::new_unchecked(base) })
}

/// # Safety
///
/// `base` and `size` must come from a successful [`map_mirror`] call that has
/// not been released yet.
pub(super) unsafe fn unmap_mirror(base: NonNull<u8>, size: usize) {
    // SAFETY: Guaranteed by the caller.
    unsafe { libc::munmap(base.as_ptr().cast(), 2 * size) };
}
