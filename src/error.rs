/// The error type for an invalid [`HashMapBuilder`][builder] configuration.
///
/// [builder]: ./struct.HashMapBuilder.html
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    /// The table was configured for zero participating threads, so no thread
    /// id would be valid.
    #[error("The number of threads must be greater than zero")]
    ZeroThreads,

    /// A bucket must hold at least two entries. Smaller buckets split on
    /// almost every insert and double the directory long before the keys run
    /// out of distinguishing hash bits.
    #[error("The bucket size {size} is smaller than the minimum {min}")]
    BucketSizeTooSmall { size: usize, min: usize },

    /// The initial directory would have more buckets than a table is allowed
    /// to start with.
    #[error("The initial directory depth {depth} exceeds the maximum depth {max}")]
    InitialDepthTooLarge { depth: u32, max: u32 },
}
