#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod error;

pub mod hasher;

/// A hash map with unique keys, built on [`RobinHoodTable`].
pub mod map;

/// A hash map allowing several entries per key, built on [`RobinHoodTable`].
pub mod multimap;

/// A hash set allowing repeated values, built on [`RobinHoodTable`].
pub mod multiset;

/// A hash set with unique values, built on [`RobinHoodTable`].
pub mod set;

/// The raw Robin Hood hash table that every container in this crate wraps.
pub mod table;

#[cfg(feature = "ring-buffer")]
pub mod ring_buffer;

pub use error::KeyNotFound;
#[cfg(feature = "ring-buffer")]
pub use error::MapError;
pub use hasher::DefaultHashBuilder;
pub use map::Entry;
pub use map::RobinHoodMap;
pub use multimap::RobinHoodMultimap;
pub use multiset::RobinHoodMultiset;
#[cfg(feature = "ring-buffer")]
pub use ring_buffer::RingBuffer;
pub use set::RobinHoodSet;
pub use table::RobinHoodTable;
