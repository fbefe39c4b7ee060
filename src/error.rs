//! Error types returned by the containers and the ring buffer.

/// Returned by [`RobinHoodMap::at`](crate::RobinHoodMap::at) and
/// [`RobinHoodMap::at_mut`](crate::RobinHoodMap::at_mut) when the key is not
/// present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("key not found in map")]
pub struct KeyNotFound;

/// Failure to set up the mirrored mapping behind a
/// [`RingBuffer`](crate::RingBuffer).
#[cfg(feature = "ring-buffer")]
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// The anonymous shared memory object could not be created.
    #[error("failed to create the ring buffer's shared memory object")]
    Create(#[source] std::io::Error),
    /// The shared memory object could not be sized.
    #[error("failed to resize the ring buffer's shared memory object")]
    Resize(#[source] std::io::Error),
    /// Mapping or reserving address space failed.
    #[error("failed to map the ring buffer's mirrored views")]
    Map(#[source] std::io::Error),
    /// Every candidate address range was taken before both views could be
    /// placed.
    #[error("no free address range could hold both mirrored views")]
    AddressSearchExhausted,
    /// The requested size cannot be represented once rounded and doubled.
    #[error("ring buffer size {requested} is too large")]
    TooLarge {
        /// The size passed to the constructor.
        requested: usize,
    },
}
