use std::{
    borrow::Borrow,
    sync::atomic::{AtomicBool, Ordering},
};

#[cfg(feature = "unstable-debug-counters")]
use crate::debug_counters::InternalGlobalDebugCounters as Counters;

use super::{
    big_word::{AtomicBigWord, BigWord},
    directory::prefix,
};

use crossbeam_epoch::{Atomic, CompareExchangeError, Guard, Owned, Shared};
use triomphe::Arc;

/// A key-value pair together with the hash it was stored under.
///
/// Entries are shared by every bucket state that still holds them, so updating
/// a key publishes a new entry instead of mutating this one.
#[derive(Debug)]
pub(crate) struct Entry<K, V> {
    pub(crate) hash: u64,
    pub(crate) key: K,
    pub(crate) value: V,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Status {
    Success,
    /// The bucket had no free slot for a new key. It must be split first.
    Fail,
}

/// The last outcome a bucket state recorded for one thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct OpResult {
    pub(crate) status: Status,
    pub(crate) seqnum: u64,
}

impl Default for OpResult {
    fn default() -> Self {
        Self {
            status: Status::Success,
            seqnum: 0,
        }
    }
}

pub(crate) enum OpKind<K, V> {
    Insert(Arc<Entry<K, V>>),
    Delete(K),
}

/// An operation announced by a thread in its help slot.
pub(crate) struct Operation<K, V> {
    pub(crate) kind: OpKind<K, V>,
    pub(crate) seqnum: u64,
    pub(crate) hash: u64,
}

/// A snapshot of a bucket's contents.
///
/// A `BState` is built privately by one thread and then published with a CAS
/// on the owning bucket. Once published it is never mutated again.
pub(crate) struct BState<K, V> {
    items: Box<[Option<Arc<Entry<K, V>>>]>,
    pub(crate) results: Box<[OpResult]>,
    pub(crate) applied: BigWord,
    sealed: bool,
}

impl<K, V> BState<K, V> {
    pub(crate) fn new(bucket_size: usize, num_threads: usize) -> Self {
        Self::with_results(
            bucket_size,
            vec![OpResult::default(); num_threads].into_boxed_slice(),
            BigWord::with_bits(num_threads),
        )
    }

    /// Creates an empty state that carries over the per-thread results and the
    /// applied vector of a bucket being split.
    pub(crate) fn with_results(
        bucket_size: usize,
        results: Box<[OpResult]>,
        applied: BigWord,
    ) -> Self {
        #[cfg(feature = "unstable-debug-counters")]
        Counters::bucket_state_created();

        Self {
            items: std::iter::repeat_with(|| None).take(bucket_size).collect(),
            results,
            applied,
            sealed: false,
        }
    }

    pub(crate) fn bucket_size(&self) -> usize {
        self.items.len()
    }

    /// Places `entry` in the first free slot. Returns `false` when the state is
    /// full.
    pub(crate) fn insert_item(&mut self, entry: Arc<Entry<K, V>>) -> bool {
        match self.bucket_availability() {
            Some(i) => {
                self.items[i] = Some(entry);
                true
            }
            None => false,
        }
    }

    /// Returns the index of a free slot, or `None` when the state is full.
    pub(crate) fn bucket_availability(&self) -> Option<usize> {
        self.items.iter().position(Option::is_none)
    }

    pub(crate) fn is_full(&self) -> bool {
        self.bucket_availability().is_none()
    }

    pub(crate) fn get_item<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.items.iter().position(|item| match item {
            Some(entry) => entry.key.borrow() == key,
            None => false,
        })
    }

    pub(crate) fn find<Q>(&self, key: &Q) -> Option<&Entry<K, V>>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.get_item(key)
            .and_then(|i| self.items[i].as_deref())
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = &Arc<Entry<K, V>>> + '_ {
        self.items.iter().flatten()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries().count()
    }

    pub(crate) fn is_sealed(&self) -> bool {
        self.sealed
    }

    fn sealed_copy(&self) -> Self {
        let mut copy = self.clone();
        copy.sealed = true;
        copy
    }
}

impl<K, V> Clone for BState<K, V> {
    fn clone(&self) -> Self {
        #[cfg(feature = "unstable-debug-counters")]
        Counters::bucket_state_created();

        Self {
            items: self.items.clone(),
            results: self.results.clone(),
            applied: self.applied.clone(),
            sealed: self.sealed,
        }
    }
}

#[cfg(feature = "unstable-debug-counters")]
impl<K, V> Drop for BState<K, V> {
    fn drop(&mut self) {
        Counters::bucket_state_dropped();
    }
}

/// Applies a single operation to a private bucket state.
///
/// Inserting an existing key replaces its entry. Deleting an absent key is a
/// no-op and still succeeds. Only inserting a new key into a full state fails.
pub(crate) fn exec_on_bucket<K: Eq, V>(state: &mut BState<K, V>, op: &Operation<K, V>) -> Status {
    match &op.kind {
        OpKind::Insert(entry) => {
            if let Some(i) = state.get_item(&entry.key) {
                state.items[i] = Some(Arc::clone(entry));
                Status::Success
            } else if state.insert_item(Arc::clone(entry)) {
                Status::Success
            } else {
                Status::Fail
            }
        }
        OpKind::Delete(key) => {
            if let Some(i) = state.get_item(key) {
                state.items[i] = None;
            }
            Status::Success
        }
    }
}

/// A bucket of the extendible hash directory.
///
/// `prefix` is the top `depth` bits of the hash of every entry the bucket may
/// hold.
pub(crate) struct Bucket<K, V> {
    pub(crate) prefix: u64,
    pub(crate) depth: u32,
    state: Atomic<BState<K, V>>,
    toggle: AtomicBigWord,
    sealing: AtomicBool,
}

impl<K, V> Bucket<K, V> {
    pub(crate) fn new(prefix: u64, depth: u32, state: BState<K, V>, toggle: &BigWord) -> Self {
        #[cfg(feature = "unstable-debug-counters")]
        Counters::bucket_created();

        Self {
            prefix,
            depth,
            state: Atomic::new(state),
            toggle: AtomicBigWord::from_snapshot(toggle),
            sealing: AtomicBool::new(false),
        }
    }

    pub(crate) fn empty(
        prefix: u64,
        depth: u32,
        bucket_size: usize,
        num_threads: usize,
    ) -> Self {
        let state = BState::new(bucket_size, num_threads);
        let toggle = state.applied.clone();
        Self::new(prefix, depth, state, &toggle)
    }

    pub(crate) fn holds(&self, hash: u64) -> bool {
        prefix(hash, self.depth) == self.prefix
    }

    pub(crate) fn state<'g>(&self, guard: &'g Guard) -> Shared<'g, BState<K, V>> {
        self.state.load(Ordering::SeqCst, guard)
    }

    pub(crate) fn state_ref<'g>(&self, guard: &'g Guard) -> &'g BState<K, V> {
        // SAFETY: The state pointer is set at construction and only ever
        // swapped for another non-null state, and the guard keeps the loaded
        // state alive.
        unsafe { self.state(guard).deref() }
    }

    /// Returns the current state for in-place mutation.
    ///
    /// # Safety
    ///
    /// The bucket must not be reachable from any published directory, so no
    /// other thread can load its state.
    pub(crate) unsafe fn private_state_mut<'g>(&self, guard: &'g Guard) -> &'g mut BState<K, V> {
        let mut state = self.state(guard);
        state.deref_mut()
    }

    pub(crate) fn compare_exchange_state<'g>(
        &self,
        current: Shared<'g, BState<K, V>>,
        new: Owned<BState<K, V>>,
        guard: &'g Guard,
    ) -> Result<Shared<'g, BState<K, V>>, Owned<BState<K, V>>> {
        self.state
            .compare_exchange(current, new, Ordering::SeqCst, Ordering::SeqCst, guard)
            .map_err(|CompareExchangeError { new, .. }| new)
    }

    pub(crate) fn toggle_bit(&self, thread_id: usize) -> bool {
        self.toggle.test_bit(thread_id)
    }

    pub(crate) fn flip_toggle(&self, thread_id: usize) {
        self.toggle.flip_bit(thread_id);
    }

    pub(crate) fn toggle_snapshot(&self) -> BigWord {
        self.toggle.snapshot()
    }

    pub(crate) fn is_sealing(&self) -> bool {
        self.sealing.load(Ordering::SeqCst)
    }

    /// Freezes the bucket's contents and returns its final state.
    ///
    /// After the flag is raised, only helpers that read it as clear can still
    /// publish, at most one per thread, so the loop below is bounded.
    pub(crate) fn seal<'g>(&self, guard: &'g Guard) -> &'g BState<K, V> {
        self.sealing.store(true, Ordering::SeqCst);

        loop {
            let current = self.state(guard);
            // SAFETY: see `state_ref`.
            let current_ref = unsafe { current.deref() };

            if current_ref.is_sealed() {
                return current_ref;
            }

            let sealed = Owned::new(current_ref.sealed_copy());
            if let Ok(new) = self.compare_exchange_state(current, sealed, guard) {
                // SAFETY: `current` was just unlinked from this bucket.
                unsafe { guard.defer_destroy(current) };
                // SAFETY: `new` was just published and the guard is pinned.
                return unsafe { new.deref() };
            }
        }
    }

    /// Seals this bucket and partitions its final contents into two buckets one
    /// level deeper.
    ///
    /// Both halves inherit the per-thread results, and start with `toggle` and
    /// `applied` equal to a snapshot of this bucket's toggle, so operations
    /// already recorded here are never applied again.
    pub(crate) fn split(&self, guard: &Guard) -> [Arc<Bucket<K, V>>; 2] {
        let parent = self.seal(guard);
        let toggle = self.toggle_snapshot();
        let depth = self.depth + 1;

        let mut halves = [0, 1].map(|_| {
            BState::with_results(parent.bucket_size(), parent.results.clone(), toggle.clone())
        });

        for entry in parent.entries() {
            let side = (prefix(entry.hash, depth) & 1) as usize;
            let inserted = halves[side].insert_item(Arc::clone(entry));
            debug_assert!(inserted);
        }

        #[cfg(feature = "logging")]
        log::trace!(
            "Split bucket {:#b} (depth {}) into two buckets of depth {depth}",
            self.prefix,
            self.depth
        );

        let [left, right] = halves;
        [
            Arc::new(Bucket::new(self.prefix << 1, depth, left, &toggle)),
            Arc::new(Bucket::new((self.prefix << 1) | 1, depth, right, &toggle)),
        ]
    }
}

impl<K, V> Drop for Bucket<K, V> {
    fn drop(&mut self) {
        #[cfg(feature = "unstable-debug-counters")]
        Counters::bucket_dropped();

        // SAFETY: A bucket is dropped once the last directory holding it has
        // been reclaimed, so no thread can still load its current state.
        unsafe {
            let guard = crossbeam_epoch::unprotected();
            let state = self.state.load(Ordering::Relaxed, guard);
            if !state.is_null() {
                drop(state.into_owned());
            }
        }
    }
}
