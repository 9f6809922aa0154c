use crate::{
    error::BuildError,
    map::{DefaultHashBuilder, HashMap},
};

use std::{hash::BuildHasher, marker::PhantomData};

const DEFAULT_BUCKET_SIZE: usize = 64;
const DEFAULT_INITIAL_DEPTH: u32 = 1;

const MIN_BUCKET_SIZE: usize = 2;
// 2^16 buckets. The directory grows past this on demand.
const MAX_INITIAL_DEPTH: u32 = 16;

/// Builds a [`HashMap`][map-struct] with various configuration knobs.
///
/// [map-struct]: ./struct.HashMap.html
///
/// # Examples
///
/// ```rust
/// use wfexth::HashMapBuilder;
///
/// // Four threads, ids 0 to 3, will share this map.
/// let map = HashMapBuilder::new(4)
///     // Keep at most 16 entries per bucket before splitting it.
///     .bucket_size(16)
///     // Start with 2^3 buckets.
///     .initial_depth(3)
///     .build();
///
/// assert!(map.insert("zero", 0, 0));
/// assert_eq!(map.directory_depth(), 3);
/// # map.insert("one", 1, 3);
/// ```
///
#[must_use]
pub struct HashMapBuilder<K, V> {
    num_threads: usize,
    bucket_size: usize,
    initial_depth: u32,
    map_type: PhantomData<fn() -> (K, V)>,
}

impl<K, V> HashMapBuilder<K, V> {
    /// Construct a new `HashMapBuilder` for a map shared by `num_threads`
    /// threads, identified by ids `0..num_threads`.
    pub fn new(num_threads: usize) -> Self {
        Self {
            num_threads,
            bucket_size: DEFAULT_BUCKET_SIZE,
            initial_depth: DEFAULT_INITIAL_DEPTH,
            map_type: PhantomData,
        }
    }

    /// Sets the number of entries a bucket holds before it has to be split.
    ///
    /// Must be at least 2. Every resize copies the whole directory, and small
    /// buckets make the directory grow quickly, so sizes below 8 are only
    /// useful for small maps.
    ///
    /// Defaults to 64.
    pub fn bucket_size(self, bucket_size: usize) -> Self {
        Self {
            bucket_size,
            ..self
        }
    }

    /// Sets the depth of the initial directory, which then has
    /// `2^initial_depth` buckets.
    ///
    /// Must be at most 16. Defaults to 1.
    pub fn initial_depth(self, initial_depth: u32) -> Self {
        Self {
            initial_depth,
            ..self
        }
    }

    /// Builds a `HashMap<K, V>`.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid. See [`try_build`][try-build]
    /// for the conditions.
    ///
    /// [try-build]: #method.try_build
    pub fn build(self) -> HashMap<K, V, DefaultHashBuilder> {
        self.build_with_hasher(DefaultHashBuilder::default())
    }

    /// Builds a `HashMap<K, V, S>`, with the given `hasher`.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    pub fn build_with_hasher<S: BuildHasher>(self, hasher: S) -> HashMap<K, V, S> {
        match self.try_build_with_hasher(hasher) {
            Ok(map) => map,
            Err(e) => panic!("{e}"),
        }
    }

    /// Builds a `HashMap<K, V>`, or returns an error if the number of threads
    /// is zero, the bucket size is below 2, or the initial depth is above 16.
    pub fn try_build(self) -> Result<HashMap<K, V, DefaultHashBuilder>, BuildError> {
        self.try_build_with_hasher(DefaultHashBuilder::default())
    }

    /// Builds a `HashMap<K, V, S>` with the given `hasher`, or returns an
    /// error if the configuration is invalid.
    pub fn try_build_with_hasher<S: BuildHasher>(
        self,
        hasher: S,
    ) -> Result<HashMap<K, V, S>, BuildError> {
        self.validate()?;
        Ok(HashMap::with_everything(
            self.num_threads,
            self.bucket_size,
            self.initial_depth,
            hasher,
        ))
    }

    fn validate(&self) -> Result<(), BuildError> {
        if self.num_threads == 0 {
            return Err(BuildError::ZeroThreads);
        }
        if self.bucket_size < MIN_BUCKET_SIZE {
            return Err(BuildError::BucketSizeTooSmall {
                size: self.bucket_size,
                min: MIN_BUCKET_SIZE,
            });
        }
        if self.initial_depth > MAX_INITIAL_DEPTH {
            return Err(BuildError::InitialDepthTooLarge {
                depth: self.initial_depth,
                max: MAX_INITIAL_DEPTH,
            });
        }
        Ok(())
    }
}
