//! Futex-style blocking for the ring buffer cursors.
//!
//! Waiters snapshot a 32-bit word, re-check their condition, and sleep only if
//! the word still holds the snapshot. Notifiers change the word before waking,
//! so a notification that lands between the check and the sleep is never
//! lost.

use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use crossbeam_utils::Backoff;

/// Sleeps while `*addr == expected`. May return spuriously.
#[cfg(target_os = "linux")]
pub(super) fn wait_on(addr: &AtomicU32, expected: u32) {
    // SAFETY: `addr` is a live atomic for the duration of the call. The
    // shared (non-private) variant is used because the word may live in a
    // MAP_SHARED mapping.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            addr.as_ptr(),
            libc::FUTEX_WAIT,
            expected,
            core::ptr::null::<libc::timespec>(),
            core::ptr::null::<u32>(),
            0u32,
        );
    }
}

/// Wakes every thread sleeping in [`wait_on`] for `addr`.
#[cfg(target_os = "linux")]
pub(super) fn wake_all(addr: &AtomicU32) {
    // SAFETY: `addr` is a live atomic; FUTEX_WAKE does not dereference
    // anything else.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            addr.as_ptr(),
            libc::FUTEX_WAKE,
            i32::MAX,
            core::ptr::null::<libc::timespec>(),
            core::ptr::null::<u32>(),
            0u32,
        );
    }
}

#[cfg(windows)]
pub(super) fn wait_on(addr: &AtomicU32, expected: u32) {
    use windows_sys::Win32::System::Threading::INFINITE;
    use windows_sys::Win32::System::Threading::WaitOnAddress;

    // SAFETY: Both pointers reference live `u32`s and the size matches.
    unsafe {
        WaitOnAddress(
            addr.as_ptr().cast(),
            (&expected as *const u32).cast(),
            core::mem::size_of::<u32>(),
            INFINITE,
        );
    }
}

#[cfg(windows)]
pub(super) fn wake_all(addr: &AtomicU32) {
    use windows_sys::Win32::System::Threading::WakeByAddressAll;

    // SAFETY: `addr` is a live atomic.
    unsafe { WakeByAddressAll(addr.as_ptr().cast()) };
}

// Other targets poll.
#[cfg(not(any(target_os = "linux", windows)))]
pub(super) fn wait_on(addr: &AtomicU32, expected: u32) {
    if addr.load(Ordering::Acquire) == expected {
        std::thread::sleep(std::time::Duration::from_micros(50));
    }
}

#[cfg(not(any(target_os = "linux", windows)))]
pub(super) fn wake_all(_addr: &AtomicU32) {}

/// A wake-up channel for one cursor.
///
/// The owner of the cursor calls [`notify`](Self::notify) after every store;
/// threads waiting for the cursor to reach some state call
/// [`wait_until`](Self::wait_until). The syscall is skipped when nobody waits.
pub(super) struct Event {
    epoch: AtomicU32,
    waiters: AtomicU32,
}

impl Event {
    pub(super) const fn new() -> Self {
        Self {
            epoch: AtomicU32::new(0),
            waiters: AtomicU32::new(0),
        }
    }

    pub(super) fn notify(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if self.waiters.load(Ordering::SeqCst) != 0 {
            wake_all(&self.epoch);
        }
    }

    /// Blocks until `ready` returns `true`. Spins briefly before sleeping.
    pub(super) fn wait_until(&self, mut ready: impl FnMut() -> bool) {
        let backoff = Backoff::new();
        while !backoff.is_completed() {
            if ready() {
                return;
            }
            backoff.snooze();
        }

        self.waiters.fetch_add(1, Ordering::SeqCst);
        loop {
            let snapshot = self.epoch.load(Ordering::SeqCst);
            if ready() {
                break;
            }
            wait_on(&self.epoch, snapshot);
        }
        self.waiters.fetch_sub(1, Ordering::SeqCst);
    }
}
