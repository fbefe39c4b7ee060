//! The hasher used by the containers when none is specified.

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// Default [`BuildHasher`](core::hash::BuildHasher) for the containers
        /// in this crate: [`foldhash::fast::RandomState`].
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// Default [`BuildHasher`](core::hash::BuildHasher) for the containers
        /// in this crate: [`std::hash::RandomState`].
        pub type DefaultHashBuilder = std::hash::RandomState;
    } else {
        /// Placeholder used when neither `foldhash` nor `std` is enabled.
        ///
        /// It cannot be constructed, so containers must be built with an
        /// explicit hasher through `with_hasher`.
        #[derive(Clone, Debug)]
        pub enum DefaultHashBuilder {}

        /// The (uninhabited) hasher of [`DefaultHashBuilder`].
        #[derive(Debug)]
        pub enum NoHasher {}

        impl core::hash::Hasher for NoHasher {
            fn finish(&self) -> u64 {
                match *self {}
            }

            fn write(&mut self, _bytes: &[u8]) {
                match *self {}
            }
        }

        impl core::hash::BuildHasher for DefaultHashBuilder {
            type Hasher = NoHasher;

            fn build_hasher(&self) -> Self::Hasher {
                match *self {}
            }
        }
    }
}
