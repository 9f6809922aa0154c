use crate::{
    builder::HashMapBuilder,
    wfext::{
        bucket::{Entry, OpKind},
        directory::DState,
        help::HelpSlots,
        iter::Iter,
        table_ref::TableRef,
    },
};

use std::{
    borrow::Borrow,
    fmt,
    hash::{BuildHasher, Hash, Hasher},
    sync::atomic::Ordering,
};

use crossbeam_epoch::Atomic;
use triomphe::Arc;

/// The default hasher for a [`HashMap`]: 64-bit xxHash with a random seed per
/// map.
pub type DefaultHashBuilder = twox_hash::RandomXxHashBuilder64;

/// A wait-free, resizable hash map for a fixed set of threads.
///
/// The map is shared by up to `num_threads` threads. Every mutating call takes
/// the id of the calling thread, a number in `0..num_threads` that no other
/// live thread may use at the same time. In exchange, `insert` and `remove`
/// complete in a bounded number of steps no matter how the other threads are
/// scheduled: a thread touching a bucket also applies the operations other
/// threads announced for it. `lookup` never writes and needs no id.
///
/// Entries are kept in buckets of a fixed size, addressed by the top bits of
/// their hash through a directory that doubles when a full bucket needs more
/// addressing bits. Buckets are never merged, so the directory never shrinks.
///
/// It is required that the keys implement the [`Eq`] and [`Hash`] traits,
/// although this can frequently be achieved by using
/// `#[derive(PartialEq, Eq, Hash)]`. If you implement these yourself, it is
/// important that the following property holds:
///
/// ```text
/// k1 == k2 -> hash(k1) == hash(k2)
/// ```
///
/// Each split doubles the directory when the full bucket is already as deep as
/// it, and every resize copies the whole directory. Keys that agree on many
/// leading hash bits therefore make the directory large, so use a hasher that
/// spreads keys uniformly (the default one does). More than `bucket_size`
/// distinct keys whose hashes share their top 32 bits make `insert` panic,
/// though a directory that deep will usually exhaust memory first.
///
/// # Examples
///
/// ```rust
/// use wfexth::HashMap;
///
/// use std::{sync::Arc, thread};
///
/// const NUM_THREADS: usize = 4;
///
/// let map = Arc::new(HashMap::new(NUM_THREADS));
///
/// let handles: Vec<_> = (0..NUM_THREADS)
///     .map(|id| {
///         let map = Arc::clone(&map);
///         thread::spawn(move || {
///             for i in 0..100 {
///                 let key = id * 1000 + i;
///                 assert!(map.insert(key, key * 2, id));
///             }
///         })
///     })
///     .collect();
///
/// for handle in handles {
///     handle.join().unwrap();
/// }
///
/// assert_eq!(map.len(), 400);
/// assert_eq!(map.lookup(&3042), Some(6084));
///
/// assert!(map.remove(3042, 0));
/// assert_eq!(map.lookup(&3042), None);
/// ```
///
/// [`Eq`]: https://doc.rust-lang.org/std/cmp/trait.Eq.html
/// [`Hash`]: https://doc.rust-lang.org/std/hash/trait.Hash.html
pub struct HashMap<K, V, S = DefaultHashBuilder> {
    directory: Atomic<DState<K, V>>,
    help: HelpSlots<K, V>,
    build_hasher: S,
    bucket_size: usize,
}

impl<K, V> HashMap<K, V, DefaultHashBuilder> {
    /// Creates a map shared by `num_threads` threads, with the default bucket
    /// size and hasher.
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` is zero.
    pub fn new(num_threads: usize) -> Self {
        HashMapBuilder::new(num_threads).build()
    }

    /// Returns a [`HashMapBuilder`][builder-struct] for a map shared by
    /// `num_threads` threads.
    ///
    /// [builder-struct]: ./struct.HashMapBuilder.html
    pub fn builder(num_threads: usize) -> HashMapBuilder<K, V> {
        HashMapBuilder::new(num_threads)
    }
}

impl<K, V, S> HashMap<K, V, S> {
    pub(crate) fn with_everything(
        num_threads: usize,
        bucket_size: usize,
        initial_depth: u32,
        build_hasher: S,
    ) -> Self {
        Self {
            directory: Atomic::new(DState::new(initial_depth, bucket_size, num_threads)),
            help: HelpSlots::new(num_threads),
            build_hasher,
            bucket_size,
        }
    }

    /// Returns the number of threads sharing this map. Valid thread ids are
    /// `0..num_threads()`.
    pub fn num_threads(&self) -> usize {
        self.help.len()
    }

    /// Returns the number of entries a bucket holds.
    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    /// Returns the depth of the current directory, which has
    /// `2^directory_depth()` slots.
    pub fn directory_depth(&self) -> u32 {
        self.table_ref().depth()
    }

    /// Returns the number of distinct buckets in the current directory.
    pub fn bucket_count(&self) -> usize {
        self.table_ref().bucket_count()
    }

    /// Returns the number of entries in the map.
    ///
    /// Buckets are counted one after another, so the result may or may not
    /// include operations that run concurrently.
    pub fn len(&self) -> usize {
        self.table_ref().len()
    }

    /// Returns `true` if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an iterator over clones of the key-value pairs in the map.
    ///
    /// The entries are copied out when this method is called; see
    /// [`Iter`][iter-struct] for the consistency guarantees.
    ///
    /// [iter-struct]: ./struct.Iter.html
    pub fn iter(&self) -> Iter<K, V> {
        Iter::new(self.table_ref().entries())
    }

    fn table_ref(&self) -> TableRef<'_, K, V> {
        TableRef {
            directory: &self.directory,
            help: &self.help,
        }
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: BuildHasher,
{
    /// Inserts a key-value pair into the map on behalf of thread `thread_id`,
    /// replacing the value of an existing equal key.
    ///
    /// Returns `true` once the insertion is applied. The map splits buckets
    /// and grows its directory as needed, so this never returns `false`.
    ///
    /// # Panics
    ///
    /// Panics if `thread_id` is not less than [`num_threads`][num-threads].
    ///
    /// [num-threads]: #method.num_threads
    pub fn insert(&self, key: K, value: V, thread_id: usize) -> bool {
        let hash = self.hash(&key);
        let entry = Arc::new(Entry { hash, key, value });

        self.table_ref()
            .execute(thread_id, OpKind::Insert(entry), hash)
    }

    /// Removes a key from the map on behalf of thread `thread_id`.
    ///
    /// Returns `true` once the key is absent, whether or not it was present
    /// before.
    ///
    /// # Panics
    ///
    /// Panics if `thread_id` is not less than [`num_threads`][num-threads].
    ///
    /// [num-threads]: #method.num_threads
    pub fn remove(&self, key: K, thread_id: usize) -> bool {
        let hash = self.hash(&key);

        self.table_ref()
            .execute(thread_id, OpKind::Delete(key), hash)
    }

    /// Returns a clone of the value corresponding to the key.
    ///
    /// The key may be any borrowed form of the map's key type, but
    /// [`Hash`] and [`Eq`] on the borrowed form *must* match those for
    /// the key type.
    ///
    /// [`Hash`]: https://doc.rust-lang.org/std/hash/trait.Hash.html
    /// [`Eq`]: https://doc.rust-lang.org/std/cmp/trait.Eq.html
    #[inline]
    pub fn lookup<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.lookup_and(key, V::clone)
    }

    /// Returns the result of invoking a function with a reference to the
    /// value corresponding to the key.
    ///
    /// The function runs while the bucket it reads from is protected from
    /// reclamation, so it should be short.
    #[inline]
    pub fn lookup_and<Q, F, T>(&self, key: &Q, with_value: F) -> Option<T>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&V) -> T,
    {
        let hash = self.hash(key);

        self.table_ref()
            .lookup_and(key, hash, |_, v| with_value(v))
    }

    /// Returns `true` if the map contains a value for the specified key.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lookup_and(key, |_| ()).is_some()
    }

    #[inline]
    fn hash<Q: Hash + ?Sized>(&self, key: &Q) -> u64 {
        let mut hasher = self.build_hasher.build_hasher();
        key.hash(&mut hasher);
        hasher.finish()
    }
}

impl<K, V, S> Drop for HashMap<K, V, S> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no thread is operating on the map. Older
        // directories were retired through the epoch and are not reachable.
        unsafe {
            let guard = crossbeam_epoch::unprotected();
            let directory = self.directory.load(Ordering::Relaxed, guard);
            drop(directory.into_owned());
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, S> fmt::Debug for HashMap<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.table_ref().entries();
        f.debug_map()
            .entries(entries.iter().map(|e| (&e.key, &e.value)))
            .finish()
    }
}
