#[cfg(feature = "unstable-debug-counters")]
use crate::debug_counters::InternalGlobalDebugCounters as Counters;

use super::bucket::Bucket;

use triomphe::Arc;

/// The deepest directory this table will build. Going beyond it means too many
/// keys share one full-length hash prefix, which no split can resolve.
pub(crate) const MAX_DEPTH: u32 = 32;

/// Returns the top `depth` bits of `hash`.
#[inline]
pub(crate) fn prefix(hash: u64, depth: u32) -> u64 {
    if depth == 0 {
        0
    } else {
        hash >> (u64::BITS - depth)
    }
}

/// A directory of `2^depth` bucket references.
///
/// Every slot whose index starts with a bucket's `prefix` points to that
/// bucket, so a bucket of depth `d` fills `2^(depth - d)` contiguous slots. A
/// published directory is never modified; resizes build a private copy and
/// swap it in.
pub(crate) struct DState<K, V> {
    depth: u32,
    dir: Box<[Arc<Bucket<K, V>>]>,
}

impl<K, V> DState<K, V> {
    pub(crate) fn new(depth: u32, bucket_size: usize, num_threads: usize) -> Self {
        assert!(depth <= MAX_DEPTH);

        #[cfg(feature = "unstable-debug-counters")]
        Counters::directory_created();

        let dir = (0..1u64 << depth)
            .map(|i| Arc::new(Bucket::empty(i, depth, bucket_size, num_threads)))
            .collect();

        Self { depth, dir }
    }

    pub(crate) fn depth(&self) -> u32 {
        self.depth
    }

    pub(crate) fn bucket_for(&self, hash: u64) -> &Arc<Bucket<K, V>> {
        &self.dir[prefix(hash, self.depth) as usize]
    }

    /// Returns every distinct bucket once, in prefix order.
    pub(crate) fn buckets(&self) -> impl Iterator<Item = &Arc<Bucket<K, V>>> + '_ {
        let mut last: Option<&Arc<Bucket<K, V>>> = None;
        self.dir.iter().filter(move |bucket| {
            let is_new = last.map_or(true, |l| !Arc::ptr_eq(l, bucket));
            last = Some(*bucket);
            is_new
        })
    }

    /// Doubles the directory. Old slot `i` fans out to slots `2i` and `2i + 1`,
    /// both still pointing to the same bucket.
    pub(crate) fn enlarge(&mut self) {
        if self.depth >= MAX_DEPTH {
            #[cfg(feature = "logging")]
            log::error!("Directory depth limit {MAX_DEPTH} reached");

            panic!(
                "directory depth limit {MAX_DEPTH} reached: too many keys share one hash prefix"
            );
        }

        self.dir = self
            .dir
            .iter()
            .flat_map(|bucket| [Arc::clone(bucket), Arc::clone(bucket)])
            .collect();
        self.depth += 1;
    }

    /// Installs the two halves of a split bucket, enlarging the directory
    /// first if they are deeper than it.
    pub(crate) fn update(&mut self, halves: [Arc<Bucket<K, V>>; 2]) {
        for bucket in halves {
            while bucket.depth > self.depth {
                self.enlarge();
            }

            let shift = self.depth - bucket.depth;
            let start = (bucket.prefix << shift) as usize;
            let end = ((bucket.prefix + 1) << shift) as usize;

            for slot in &mut self.dir[start..end] {
                *slot = Arc::clone(&bucket);
            }
        }
    }
}

impl<K, V> Clone for DState<K, V> {
    fn clone(&self) -> Self {
        #[cfg(feature = "unstable-debug-counters")]
        Counters::directory_created();

        Self {
            depth: self.depth,
            dir: self.dir.clone(),
        }
    }
}

#[cfg(feature = "unstable-debug-counters")]
impl<K, V> Drop for DState<K, V> {
    fn drop(&mut self) {
        Counters::directory_dropped();
    }
}
