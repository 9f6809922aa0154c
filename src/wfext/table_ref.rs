use super::{
    bucket::{exec_on_bucket, Bucket, Entry, OpKind, OpResult, Status},
    directory::DState,
    help::HelpSlots,
};

use std::{borrow::Borrow, sync::atomic::Ordering};

use crossbeam_epoch::{Atomic, Guard, Owned};
use triomphe::Arc;

/// Number of times `resize_wf` tries to publish a candidate directory before
/// handing control back to the caller's retry loop.
const RESIZE_ATTEMPTS: usize = 2;

/// A borrowed view of a table's shared state: the published directory and the
/// announcement slots. All protocol steps are implemented here.
pub(crate) struct TableRef<'a, K, V> {
    pub(crate) directory: &'a Atomic<DState<K, V>>,
    pub(crate) help: &'a HelpSlots<K, V>,
}

impl<K: Eq, V> TableRef<'_, K, V> {
    /// Announces `kind` for `thread_id` and drives it until some published
    /// bucket state records it as applied.
    pub(crate) fn execute(&self, thread_id: usize, kind: OpKind<K, V>, hash: u64) -> bool {
        let guard = &crossbeam_epoch::pin();
        let seqnum = self.help.announce(thread_id, kind, hash, guard);

        loop {
            let bucket = self.current(guard).bucket_for(hash);
            self.apply_wf_op(thread_id, bucket, guard);

            if let Some(result) = self.outcome(thread_id, hash, seqnum, guard) {
                return result.status == Status::Success;
            }

            self.resize_wf(guard);

            if let Some(result) = self.outcome(thread_id, hash, seqnum, guard) {
                return result.status == Status::Success;
            }
        }
    }

    pub(crate) fn lookup_and<Q, F, T>(&self, key: &Q, hash: u64, with_entry: F) -> Option<T>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        F: FnOnce(&K, &V) -> T,
    {
        let guard = &crossbeam_epoch::pin();
        self.current(guard)
            .bucket_for(hash)
            .state_ref(guard)
            .find(key)
            .map(|entry| with_entry(&entry.key, &entry.value))
    }

    /// Returns the result recorded for `thread_id` in the bucket currently
    /// responsible for `hash`, if it covers operation `seqnum`.
    fn outcome(&self, thread_id: usize, hash: u64, seqnum: u64, guard: &Guard) -> Option<OpResult> {
        let result = self
            .current(guard)
            .bucket_for(hash)
            .state_ref(guard)
            .results[thread_id];

        (result.seqnum >= seqnum).then_some(result)
    }

    /// Makes the caller's operation pending on `bucket`, then twice publishes a
    /// state with every pending announcement applied.
    ///
    /// The second pass catches announcements that raced with the first one.
    /// Sealed buckets are left alone; their pending operations are carried by
    /// the resize that splits them.
    fn apply_wf_op(&self, thread_id: usize, bucket: &Bucket<K, V>, guard: &Guard) {
        let seen = bucket.state_ref(guard);
        if bucket.toggle_bit(thread_id) == seen.applied.test_bit(thread_id) {
            bucket.flip_toggle(thread_id);
        }

        for _ in 0..2 {
            let old_state = bucket.state(guard);
            // SAFETY: Bucket states are never null and the guard keeps
            // `old_state` alive.
            let old_ref = unsafe { old_state.deref() };

            if old_ref.is_sealed() || bucket.is_sealing() {
                return;
            }

            let toggle = bucket.toggle_snapshot();
            let mut new_state = old_ref.clone();

            for (j, op) in self.help.iter(guard) {
                if toggle.test_bit(j) == old_ref.applied.test_bit(j) || !bucket.holds(op.hash) {
                    continue;
                }

                if new_state.results[j].seqnum < op.seqnum {
                    let status = exec_on_bucket(&mut new_state, op);
                    new_state.results[j].status = status;
                    if status != Status::Fail {
                        new_state.results[j].seqnum = op.seqnum;
                    }
                }
            }

            new_state.applied = toggle;

            if bucket
                .compare_exchange_state(old_state, Owned::new(new_state), guard)
                .is_ok()
            {
                // SAFETY: `old_state` was just unlinked from the bucket.
                unsafe { guard.defer_destroy(old_state) };
            }
        }
    }

    /// Splits every bucket that blocks an announced operation in a private
    /// copy of the directory, applies those operations there, and tries to
    /// publish the copy.
    fn resize_wf(&self, guard: &Guard) {
        for _ in 0..RESIZE_ATTEMPTS {
            let current = self.directory.load(Ordering::SeqCst, guard);
            // SAFETY: The directory pointer is never null and the guard keeps
            // `current` alive.
            let current_ref = unsafe { current.deref() };
            let mut candidate = current_ref.clone();
            let mut split_any = false;

            for (j, op) in self.help.iter(guard) {
                let bucket = Arc::clone(candidate.bucket_for(op.hash));
                let state = bucket.state_ref(guard);
                let blocked = state.is_full() || state.is_sealed() || bucket.is_sealing();

                if blocked && state.results[j].seqnum < op.seqnum {
                    self.apply_pending_resize(&mut candidate, &bucket, guard);
                    split_any = true;
                }
            }

            if !split_any {
                return;
            }

            #[cfg(feature = "logging")]
            let new_depth = candidate.depth();

            match self.directory.compare_exchange(
                current,
                Owned::new(candidate),
                Ordering::SeqCst,
                Ordering::SeqCst,
                guard,
            ) {
                Ok(_) => {
                    #[cfg(feature = "logging")]
                    log::debug!(
                        "Published a directory of depth {new_depth} (was {})",
                        current_ref.depth()
                    );

                    // SAFETY: `current` was just unlinked from the table.
                    unsafe { guard.defer_destroy(current) };
                    return;
                }
                Err(_) => {
                    #[cfg(feature = "logging")]
                    log::trace!("Lost the race to publish a directory of depth {new_depth}");
                }
            }
        }
    }

    /// Splits `full` in `candidate` and applies every stale operation it was
    /// blocking, splitting the destination again whenever it has no room.
    ///
    /// Only buckets created here are mutated, and none of them is reachable
    /// from a published directory yet.
    fn apply_pending_resize(&self, candidate: &mut DState<K, V>, full: &Bucket<K, V>, guard: &Guard) {
        candidate.update(full.split(guard));
        let parent = full.state_ref(guard);

        for (j, op) in self.help.iter(guard) {
            if !full.holds(op.hash) || parent.results[j].seqnum >= op.seqnum {
                continue;
            }

            loop {
                let dest = Arc::clone(candidate.bucket_for(op.hash));
                // SAFETY: `full` has been replaced in `candidate` by buckets
                // split off during this call, so `dest` is one of those and
                // only this thread can reach it.
                let state = unsafe { dest.private_state_mut(guard) };

                if state.results[j].seqnum >= op.seqnum {
                    break;
                }

                match exec_on_bucket(state, op) {
                    Status::Fail => candidate.update(dest.split(guard)),
                    status => {
                        state.results[j] = OpResult {
                            status,
                            seqnum: op.seqnum,
                        };
                        break;
                    }
                }
            }
        }
    }
}

impl<K, V> TableRef<'_, K, V> {
    fn current<'g>(&self, guard: &'g Guard) -> &'g DState<K, V> {
        // SAFETY: The directory pointer is set at construction, only ever
        // swapped for another non-null directory, and retired through the
        // epoch.
        unsafe { self.directory.load(Ordering::SeqCst, guard).deref() }
    }

    pub(crate) fn depth(&self) -> u32 {
        let guard = &crossbeam_epoch::pin();
        self.current(guard).depth()
    }

    pub(crate) fn bucket_count(&self) -> usize {
        let guard = &crossbeam_epoch::pin();
        self.current(guard).buckets().count()
    }

    /// Counts entries bucket by bucket; concurrent updates may or may not be
    /// reflected.
    pub(crate) fn len(&self) -> usize {
        let guard = &crossbeam_epoch::pin();
        self.current(guard)
            .buckets()
            .map(|bucket| bucket.state_ref(guard).len())
            .sum()
    }

    /// Collects the entries of every bucket of the current directory.
    pub(crate) fn entries(&self) -> Vec<Arc<Entry<K, V>>> {
        let guard = &crossbeam_epoch::pin();
        self.current(guard)
            .buckets()
            .flat_map(|bucket| bucket.state_ref(guard).entries().cloned())
            .collect()
    }
}
