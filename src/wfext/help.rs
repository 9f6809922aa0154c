use std::sync::atomic::{AtomicU64, Ordering};

use super::bucket::{OpKind, Operation};

use crossbeam_epoch::{Atomic, Guard, Owned};
use crossbeam_utils::CachePadded;

/// The announcement array: one slot per participating thread holding its most
/// recent operation, plus the counter its sequence numbers are drawn from.
///
/// Slot `i` and counter `i` are written by thread `i` only. Any thread may read
/// any slot in order to help.
pub(crate) struct HelpSlots<K, V> {
    ops: Box<[CachePadded<Atomic<Operation<K, V>>>]>,
    seqnums: Box<[CachePadded<AtomicU64>]>,
}

impl<K, V> HelpSlots<K, V> {
    pub(crate) fn new(num_threads: usize) -> Self {
        Self {
            ops: (0..num_threads)
                .map(|_| CachePadded::new(Atomic::null()))
                .collect(),
            seqnums: (0..num_threads)
                .map(|_| CachePadded::new(AtomicU64::new(0)))
                .collect(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.ops.len()
    }

    /// Publishes a new operation for `thread_id` and returns its sequence
    /// number.
    ///
    /// # Panics
    ///
    /// Panics if `thread_id` is not less than the number of threads the table
    /// was built for.
    pub(crate) fn announce(
        &self,
        thread_id: usize,
        kind: OpKind<K, V>,
        hash: u64,
        guard: &Guard,
    ) -> u64 {
        assert!(
            thread_id < self.len(),
            "thread id {thread_id} is out of range: the table was built for {} threads",
            self.len()
        );

        let seqnum = self.seqnums[thread_id].fetch_add(1, Ordering::Relaxed) + 1;
        let op = Owned::new(Operation { kind, seqnum, hash });
        let previous = self.ops[thread_id].swap(op, Ordering::SeqCst, guard);

        if !previous.is_null() {
            // SAFETY: The previous operation was just unlinked. Helpers that
            // still hold it are pinned, so destruction is deferred past them.
            unsafe { guard.defer_destroy(previous) };
        }

        seqnum
    }

    /// Returns the operation thread `thread_id` announced last, if any.
    pub(crate) fn get<'g>(&self, thread_id: usize, guard: &'g Guard) -> Option<&'g Operation<K, V>> {
        // SAFETY: Operations are only reclaimed through the epoch, so a
        // non-null pointer loaded under `guard` stays valid while it is pinned.
        unsafe { self.ops[thread_id].load(Ordering::SeqCst, guard).as_ref() }
    }

    /// Iterates over the latest announcement of every thread that made one.
    pub(crate) fn iter<'g>(
        &'g self,
        guard: &'g Guard,
    ) -> impl Iterator<Item = (usize, &'g Operation<K, V>)> + 'g {
        (0..self.len()).filter_map(move |j| self.get(j, guard).map(|op| (j, op)))
    }
}

impl<K, V> Drop for HelpSlots<K, V> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no thread is announcing or helping.
        unsafe {
            let guard = crossbeam_epoch::unprotected();
            for slot in self.ops.iter() {
                let op = slot.load(Ordering::Relaxed, guard);
                if !op.is_null() {
                    drop(op.into_owned());
                }
            }
        }
    }
}
