use std::{
    borrow::Borrow,
    hash::{BuildHasher, Hash, Hasher},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crossbeam_epoch::Owned;

/// A value that asserts it is dropped at most once and reports the drop to
/// its [`DropNotifier`].
#[derive(Debug)]
pub(crate) struct NoisyDropper<T: ?Sized> {
    parent: Arc<DropNotifier>,
    pub elem: T,
}

impl<T> NoisyDropper<T> {
    pub(crate) fn new(parent: Arc<DropNotifier>, elem: T) -> Self {
        Self { parent, elem }
    }
}

impl<T: ?Sized> Drop for NoisyDropper<T> {
    fn drop(&mut self) {
        assert!(!self.parent.dropped.swap(true, Ordering::Relaxed));
    }
}

impl<T: ?Sized + PartialEq> PartialEq for NoisyDropper<T> {
    fn eq(&self, other: &Self) -> bool {
        self.elem == other.elem
    }
}

impl<T: ?Sized + Eq> Eq for NoisyDropper<T> {}

impl<T: ?Sized + Hash> Hash for NoisyDropper<T> {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.elem.hash(hasher);
    }
}

impl<T: ?Sized> Borrow<T> for NoisyDropper<T> {
    fn borrow(&self) -> &T {
        &self.elem
    }
}

#[derive(Debug)]
pub(crate) struct DropNotifier {
    dropped: AtomicBool,
}

impl DropNotifier {
    pub(crate) fn new() -> Self {
        Self {
            dropped: AtomicBool::new(false),
        }
    }

    pub(crate) fn was_dropped(&self) -> bool {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Pushes enough garbage through the epoch collector that everything retired
/// earlier by this thread gets reclaimed.
pub(crate) fn run_deferred() {
    for _ in 0..65536 {
        let guard = crossbeam_epoch::pin();

        unsafe { guard.defer_destroy(Owned::new(0).into_shared(&guard)) };

        guard.flush();
    }
}

/// Hashes a `u64` key to itself, so a test picks the bucket of a key by
/// choosing its top bits.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct IdentityHashBuilder;

impl BuildHasher for IdentityHashBuilder {
    type Hasher = IdentityHasher;

    fn build_hasher(&self) -> Self::Hasher {
        IdentityHasher(0)
    }
}

pub(crate) struct IdentityHasher(u64);

impl Hasher for IdentityHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.0 = self.0.rotate_left(8) ^ u64::from(*b);
        }
    }

    fn write_u64(&mut self, n: u64) {
        self.0 = n;
    }
}

/// Generates the shared `HashMap` test suite for one bucket size.
///
/// `$max_value` is the number of keys each thread works on. Keep it small for
/// tiny buckets: every split copies the whole directory.
#[macro_export]
macro_rules! write_test_cases_for_me {
    ($bucket_size:expr, $max_value:expr) => {
        const NUM_THREADS: usize = 8;
        const MAX_VALUE: i32 = $max_value;

        fn new_map() -> $crate::HashMap<i32, i32> {
            $crate::HashMap::builder(NUM_THREADS)
                .bucket_size($bucket_size)
                .build()
        }

        #[test]
        fn insertion() {
            let map = new_map();

            for i in 0..MAX_VALUE {
                assert!(map.insert(i, i, 0));

                assert!(!map.is_empty());
                assert_eq!(map.len(), (i + 1) as usize);

                for j in 0..=i {
                    assert_eq!(map.lookup(&j), Some(j));
                    assert!(map.insert(j, j, 0));
                }

                for k in i + 1..MAX_VALUE {
                    assert_eq!(map.lookup(&k), None);
                }
            }

            $crate::wfext::test_util::run_deferred();
        }

        #[test]
        fn update() {
            let map = new_map();

            for i in 0..MAX_VALUE {
                assert!(map.insert(i, i, 0));
            }
            for i in 0..MAX_VALUE {
                assert!(map.insert(i, -i, 1));
            }

            assert_eq!(map.len(), MAX_VALUE as usize);
            for i in 0..MAX_VALUE {
                assert_eq!(map.lookup(&i), Some(-i));
            }

            $crate::wfext::test_util::run_deferred();
        }

        #[test]
        fn removal() {
            let map = new_map();

            for i in 0..MAX_VALUE {
                assert!(map.insert(i, i, 0));
            }

            for i in 0..MAX_VALUE {
                assert!(map.remove(i, 0));
                assert_eq!(map.lookup(&i), None);
                // Removing an absent key leaves the others alone.
                assert!(map.remove(i, 0));
            }

            assert!(map.is_empty());
            assert_eq!(map.len(), 0);

            for i in 0..MAX_VALUE {
                assert_eq!(map.lookup(&i), None);
            }

            $crate::wfext::test_util::run_deferred();
        }

        #[test]
        fn directory_never_shrinks() {
            let map = new_map();
            let mut depth = map.directory_depth();

            for i in 0..MAX_VALUE {
                assert!(map.insert(i, i, 0));
                assert!(map.directory_depth() >= depth);
                depth = map.directory_depth();
            }

            for i in 0..MAX_VALUE {
                assert!(map.remove(i, 0));
                assert_eq!(map.directory_depth(), depth);
            }

            $crate::wfext::test_util::run_deferred();
        }

        #[test]
        fn concurrent_insertion() {
            const MAX_INSERTED_VALUE: i32 = (NUM_THREADS as i32) * MAX_VALUE;

            let map = std::sync::Arc::new(new_map());
            let barrier = std::sync::Arc::new(std::sync::Barrier::new(NUM_THREADS));

            let threads: Vec<_> = (0..NUM_THREADS)
                .map(|i| {
                    let map = std::sync::Arc::clone(&map);
                    let barrier = std::sync::Arc::clone(&barrier);

                    std::thread::spawn(move || {
                        barrier.wait();

                        for j in (0..MAX_VALUE).map(|j| j + (i as i32 * MAX_VALUE)) {
                            assert!(map.insert(j, j, i));
                        }
                    })
                })
                .collect();

            for result in threads.into_iter().map(std::thread::JoinHandle::join) {
                assert!(result.is_ok());
            }

            assert!(!map.is_empty());
            assert_eq!(map.len(), MAX_INSERTED_VALUE as usize);

            for i in 0..MAX_INSERTED_VALUE {
                assert_eq!(map.lookup(&i), Some(i));
            }

            $crate::wfext::test_util::run_deferred();
        }

        #[test]
        fn concurrent_removal() {
            const MAX_INSERTED_VALUE: i32 = (NUM_THREADS as i32) * MAX_VALUE;

            let map = new_map();

            for i in 0..MAX_INSERTED_VALUE {
                assert!(map.insert(i, i, 0));
            }

            let map = std::sync::Arc::new(map);
            let barrier = std::sync::Arc::new(std::sync::Barrier::new(NUM_THREADS));

            let threads: Vec<_> = (0..NUM_THREADS)
                .map(|i| {
                    let map = std::sync::Arc::clone(&map);
                    let barrier = std::sync::Arc::clone(&barrier);

                    std::thread::spawn(move || {
                        barrier.wait();

                        for j in (0..MAX_VALUE).map(|j| j + (i as i32 * MAX_VALUE)) {
                            assert!(map.remove(j, i));
                        }
                    })
                })
                .collect();

            for result in threads.into_iter().map(|t| t.join()) {
                assert!(result.is_ok());
            }

            assert_eq!(map.len(), 0);

            for i in 0..MAX_INSERTED_VALUE {
                assert_eq!(map.lookup(&i), None);
            }

            $crate::wfext::test_util::run_deferred();
        }

        #[test]
        fn concurrent_insertion_and_removal() {
            const HALF: usize = NUM_THREADS / 2;
            const INSERTED_MIDPOINT: i32 = (HALF as i32) * MAX_VALUE;
            const MAX_INSERTED_VALUE: i32 = INSERTED_MIDPOINT * 2;

            let map = new_map();

            for i in INSERTED_MIDPOINT..MAX_INSERTED_VALUE {
                assert!(map.insert(i, i, 0));
            }

            let map = std::sync::Arc::new(map);
            let barrier = std::sync::Arc::new(std::sync::Barrier::new(NUM_THREADS));

            let insert_threads: Vec<_> = (0..HALF)
                .map(|i| {
                    let map = std::sync::Arc::clone(&map);
                    let barrier = std::sync::Arc::clone(&barrier);

                    std::thread::spawn(move || {
                        barrier.wait();

                        for j in (0..MAX_VALUE).map(|j| j + (i as i32 * MAX_VALUE)) {
                            assert!(map.insert(j, j, i));
                        }
                    })
                })
                .collect();

            let remove_threads: Vec<_> = (0..HALF)
                .map(|i| {
                    let map = std::sync::Arc::clone(&map);
                    let barrier = std::sync::Arc::clone(&barrier);

                    std::thread::spawn(move || {
                        barrier.wait();

                        for j in
                            (0..MAX_VALUE).map(|j| INSERTED_MIDPOINT + j + (i as i32 * MAX_VALUE))
                        {
                            assert!(map.remove(j, HALF + i));
                        }
                    })
                })
                .collect();

            for result in insert_threads
                .into_iter()
                .chain(remove_threads)
                .map(|t| t.join())
            {
                assert!(result.is_ok());
            }

            assert!(!map.is_empty());
            assert_eq!(map.len(), INSERTED_MIDPOINT as usize);

            for i in 0..INSERTED_MIDPOINT {
                assert_eq!(map.lookup(&i), Some(i));
            }

            for i in INSERTED_MIDPOINT..MAX_INSERTED_VALUE {
                assert_eq!(map.lookup(&i), None);
            }

            $crate::wfext::test_util::run_deferred();
        }

        #[test]
        fn concurrent_overlapped_insertion() {
            let map = std::sync::Arc::new(new_map());
            let barrier = std::sync::Arc::new(std::sync::Barrier::new(NUM_THREADS));

            let threads: Vec<_> = (0..NUM_THREADS)
                .map(|i| {
                    let map = std::sync::Arc::clone(&map);
                    let barrier = std::sync::Arc::clone(&barrier);

                    std::thread::spawn(move || {
                        barrier.wait();

                        for j in 0..MAX_VALUE {
                            assert!(map.insert(j, j, i));
                        }
                    })
                })
                .collect();

            for result in threads.into_iter().map(std::thread::JoinHandle::join) {
                assert!(result.is_ok());
            }

            assert_eq!(map.len(), MAX_VALUE as usize);

            for i in 0..MAX_VALUE {
                assert_eq!(map.lookup(&i), Some(i));
            }

            $crate::wfext::test_util::run_deferred();
        }

        #[test]
        fn concurrent_overlapped_update() {
            let map = std::sync::Arc::new(new_map());
            let barrier = std::sync::Arc::new(std::sync::Barrier::new(NUM_THREADS));

            let threads: Vec<_> = (0..NUM_THREADS)
                .map(|i| {
                    let map = std::sync::Arc::clone(&map);
                    let barrier = std::sync::Arc::clone(&barrier);

                    std::thread::spawn(move || {
                        barrier.wait();

                        for j in 0..MAX_VALUE {
                            assert!(map.insert(j, i as i32, i));
                        }
                    })
                })
                .collect();

            for result in threads.into_iter().map(std::thread::JoinHandle::join) {
                assert!(result.is_ok());
            }

            assert_eq!(map.len(), MAX_VALUE as usize);

            for i in 0..MAX_VALUE {
                let value = map.lookup(&i).expect("every key was inserted");
                assert!((0..NUM_THREADS as i32).contains(&value));
            }

            $crate::wfext::test_util::run_deferred();
        }

        #[test]
        fn concurrent_overlapped_removal() {
            let map = new_map();

            for i in 0..MAX_VALUE {
                assert!(map.insert(i, i, 0));
            }

            let map = std::sync::Arc::new(map);
            let barrier = std::sync::Arc::new(std::sync::Barrier::new(NUM_THREADS));

            let threads: Vec<_> = (0..NUM_THREADS)
                .map(|i| {
                    let map = std::sync::Arc::clone(&map);
                    let barrier = std::sync::Arc::clone(&barrier);

                    std::thread::spawn(move || {
                        barrier.wait();

                        for j in 0..MAX_VALUE {
                            assert!(map.remove(j, i));
                        }
                    })
                })
                .collect();

            for result in threads.into_iter().map(std::thread::JoinHandle::join) {
                assert!(result.is_ok());
            }

            assert!(map.is_empty());

            for i in 0..MAX_VALUE {
                assert_eq!(map.lookup(&i), None);
            }

            $crate::wfext::test_util::run_deferred();
        }

        #[test]
        fn lookups_during_growth() {
            const WRITERS: usize = NUM_THREADS - 2;

            let map = new_map();

            // These keys stay put while the writers split buckets around them.
            for i in 0..MAX_VALUE {
                assert!(map.insert(-1 - i, i, 0));
            }

            let map = std::sync::Arc::new(map);
            let barrier = std::sync::Arc::new(std::sync::Barrier::new(WRITERS + 2));
            let done = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));

            let writers: Vec<_> = (0..WRITERS)
                .map(|i| {
                    let map = std::sync::Arc::clone(&map);
                    let barrier = std::sync::Arc::clone(&barrier);
                    let done = std::sync::Arc::clone(&done);

                    std::thread::spawn(move || {
                        barrier.wait();

                        for j in (0..MAX_VALUE).map(|j| j + (i as i32 * MAX_VALUE)) {
                            assert!(map.insert(j, j, i));
                        }

                        done.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    })
                })
                .collect();

            let readers: Vec<_> = (0..2)
                .map(|_| {
                    let map = std::sync::Arc::clone(&map);
                    let barrier = std::sync::Arc::clone(&barrier);
                    let done = std::sync::Arc::clone(&done);

                    std::thread::spawn(move || {
                        barrier.wait();

                        while done.load(std::sync::atomic::Ordering::SeqCst) < WRITERS {
                            for i in 0..MAX_VALUE {
                                assert_eq!(map.lookup(&(-1 - i)), Some(i));
                            }
                        }
                    })
                })
                .collect();

            for result in writers
                .into_iter()
                .chain(readers)
                .map(std::thread::JoinHandle::join)
            {
                assert!(result.is_ok());
            }

            assert_eq!(map.len(), (MAX_VALUE as usize) * (WRITERS + 1));

            $crate::wfext::test_util::run_deferred();
        }

        #[test]
        fn drop_value() {
            let key_parent = std::sync::Arc::new($crate::wfext::test_util::DropNotifier::new());
            let value_parent = std::sync::Arc::new($crate::wfext::test_util::DropNotifier::new());

            {
                let map = $crate::HashMap::builder(NUM_THREADS)
                    .bucket_size($bucket_size)
                    .build();

                assert!(map.insert(
                    $crate::wfext::test_util::NoisyDropper::new(
                        std::sync::Arc::clone(&key_parent),
                        0
                    ),
                    $crate::wfext::test_util::NoisyDropper::new(
                        std::sync::Arc::clone(&value_parent),
                        0
                    ),
                    0
                ));

                assert!(!key_parent.was_dropped());
                assert!(!value_parent.was_dropped());

                assert_eq!(map.lookup_and(&0i32, |v| v.elem), Some(0));
            }

            $crate::wfext::test_util::run_deferred();

            assert!(key_parent.was_dropped());
            assert!(value_parent.was_dropped());
        }

        #[test]
        fn update_drops_previous_value() {
            let old_parent = std::sync::Arc::new($crate::wfext::test_util::DropNotifier::new());
            let new_parent = std::sync::Arc::new($crate::wfext::test_util::DropNotifier::new());

            let map = $crate::HashMap::builder(NUM_THREADS)
                .bucket_size($bucket_size)
                .build();

            assert!(map.insert(
                0,
                $crate::wfext::test_util::NoisyDropper::new(std::sync::Arc::clone(&old_parent), 1),
                0
            ));
            assert!(map.insert(
                0,
                $crate::wfext::test_util::NoisyDropper::new(std::sync::Arc::clone(&new_parent), 2),
                0
            ));

            $crate::wfext::test_util::run_deferred();

            assert!(old_parent.was_dropped());
            assert!(!new_parent.was_dropped());
            assert_eq!(map.lookup_and(&0i32, |v| v.elem), Some(2));

            drop(map);
            $crate::wfext::test_util::run_deferred();

            assert!(new_parent.was_dropped());
        }
    };
}
